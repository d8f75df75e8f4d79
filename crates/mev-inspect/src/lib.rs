//! mev-inspect: block analysis pipeline for MEV detection on commodity
//! JSON-RPC endpoints.
//!
//! One `analyze_block` call fetches a block and its receipts in O(1)
//! batched round trips, replays every transaction locally, fuses log and
//! call evidence into confidence-scored swaps, and runs the arbitrage and
//! sandwich detectors.

pub mod options;
pub mod pipeline;
pub mod report;

pub use options::InspectOptions;
pub use pipeline::Inspector;
pub use report::{to_json, ReportMode};
