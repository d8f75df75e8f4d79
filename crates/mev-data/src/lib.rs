//! mev-data crate
//!
//! Typed data model, JSON-RPC facade with array batching, bounded state
//! caches, and the persistent pool-token store shared by all block runs.

pub mod cache;
pub mod error;
pub mod pool_store;
pub mod rpc;
pub mod types;

pub use cache::{CacheSizes, StateCache};
pub use error::{InspectError, Result};
pub use pool_store::PoolTokenStore;
pub use rpc::{HttpTransport, RpcClient, RpcConfig, Transport};
pub use types::{
    AccountSnapshot, Arbitrage, BlockHeader, DetectionSource, InspectionResult, LogRecord,
    MultiHopSwap, Protocol, Receipt, Sandwich, Swap, Transaction, TransactionInfo,
    WhatIfOpportunity,
};
