//! mev-detect crate
//!
//! MEV pattern detection over per-block swap streams: hybrid log/call swap
//! fusion with confidence scoring, cyclic-arbitrage and sandwich detectors,
//! and the optional what-if simulation over the block's pool graph.

pub mod arbitrage;
pub mod sandwich;
pub mod swaps;
pub mod whatif;

pub use arbitrage::{find_arbitrages, DEFAULT_EPSILON};
pub use sandwich::find_sandwiches;
pub use swaps::{SwapDetector, SwapDetectorStats, DEFAULT_MIN_CONFIDENCE};
