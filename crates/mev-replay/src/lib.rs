//! mev-replay: local re-execution of mined transactions with REVM.
//!
//! Replaces trace-API introspection on commodity endpoints: each transaction
//! is replayed against pre-block state served through the shared cache, with
//! an inspector capturing internal calls and storage writes. DEX decoders
//! turn logs and calls into swap candidates for the detectors.

pub mod decoder;
pub mod evm;
pub mod tracer;

pub use evm::{Replayer, StateDb};
pub use tracer::{CallKind, InternalCall, ReplayResult, ReplayTracer, StateChange};
