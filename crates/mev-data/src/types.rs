//! Type definitions shared across the inspection pipeline.
//!
//! All hex is decoded once at the RPC boundary; everything downstream works
//! on fixed-size identifiers and big unsigned integers. Addresses compare
//! case-insensitively by construction.

use alloy::primitives::{Address, Bytes, B256, U256};
use serde::{Deserialize, Serialize};

/// Block metadata, immutable for the run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BlockHeader {
    /// Block number.
    pub number: u64,
    /// Block hash.
    pub hash: B256,
    /// Miner/coinbase address.
    pub miner: Address,
    /// Timestamp in unix seconds.
    pub timestamp: u64,
    /// Gas limit.
    pub gas_limit: u64,
    /// Base fee per gas in Wei (0 for pre-1559 blocks).
    pub base_fee_per_gas: u128,
    /// Post-merge prevrandao (mixHash).
    pub prevrandao: B256,
}

/// Transaction envelope as included in a block.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Transaction hash.
    pub hash: B256,
    /// Sender address.
    pub from: Address,
    /// Recipient (None for contract creation).
    pub to: Option<Address>,
    /// Value in Wei.
    pub value: U256,
    /// Calldata.
    pub input: Bytes,
    /// Gas limit.
    pub gas_limit: u64,
    /// Gas price in Wei as carried by the envelope.
    pub gas_price: u128,
    /// Position within the block.
    pub position: u32,
}

impl Transaction {
    /// 4-byte function selector, when the calldata carries one.
    pub fn selector(&self) -> Option<[u8; 4]> {
        (self.input.len() >= 4).then(|| self.input[..4].try_into().expect("length checked"))
    }
}

/// One event log from a receipt.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    /// Emitting contract.
    pub address: Address,
    /// Ordered topics; topic0 is the event selector hash.
    pub topics: Vec<B256>,
    /// Non-indexed payload.
    pub data: Bytes,
    /// Log index as reported by the node.
    pub index: u64,
}

impl LogRecord {
    pub fn topic0(&self) -> Option<B256> {
        self.topics.first().copied()
    }
}

/// Transaction receipt.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Receipt {
    /// Hash of the transaction this receipt belongs to.
    pub tx_hash: B256,
    /// Execution status (true = success).
    pub status: bool,
    /// Gas consumed.
    pub gas_used: u64,
    /// Effective gas price in Wei.
    pub effective_gas_price: u128,
    /// Logs in emission order.
    pub logs: Vec<LogRecord>,
}

impl Receipt {
    /// Total fee paid, in Wei.
    pub fn gas_cost_wei(&self) -> u128 {
        (self.gas_used as u128).saturating_mul(self.effective_gas_price)
    }
}

/// Cached account state: balance and contract code. Nonce is not tracked;
/// the replayer simulates with nonce checks disabled.
#[derive(Clone, Debug, PartialEq)]
pub struct AccountSnapshot {
    pub balance: U256,
    pub code: Bytes,
}

/// DEX protocol family a swap was decoded from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Protocol {
    UniswapV2,
    UniswapV3,
    Unknown,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::UniswapV2 => "uniswap_v2",
            Protocol::UniswapV3 => "uniswap_v3",
            Protocol::Unknown => "unknown",
        }
    }
}

/// How a swap record was established.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DetectionSource {
    /// Seen only in receipt logs.
    LogOnly,
    /// Seen only as a swap-selector internal call.
    CallOnly,
    /// Cross-referenced in both streams.
    Hybrid,
}

impl DetectionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectionSource::LogOnly => "log-only",
            DetectionSource::CallOnly => "call-only",
            DetectionSource::Hybrid => "hybrid",
        }
    }
}

/// A single decoded swap with detection metadata.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Swap {
    /// Transaction that performed the swap.
    pub tx_hash: B256,
    /// Block number.
    pub block_number: u64,
    /// Protocol family.
    pub protocol: Protocol,
    /// Pool contract.
    pub pool: Address,
    /// Token paid into the pool.
    pub token_in: Address,
    /// Token paid out by the pool.
    pub token_out: Address,
    /// Input amount in the token's smallest unit (0 for call-only records).
    pub amount_in: U256,
    /// Output amount (0 for call-only records).
    pub amount_out: U256,
    /// Transaction sender.
    pub sender: Address,
    /// Swap recipient where the decoder could establish one.
    pub recipient: Address,
    /// Gas attributed to the swap call (0 when unknown).
    pub gas_used: u64,
    /// Detection source.
    pub detection: DetectionSource,
    /// Confidence in [0, 1].
    pub confidence: f64,
    /// Depth of the originating internal call (0 = top level).
    pub call_depth: u32,
    /// Receipt log index, for log-derived records.
    pub log_index: Option<u64>,
    /// Index into the replay's internal-call list, for call-derived records.
    pub call_index: Option<usize>,
    /// Transaction position in the block.
    pub position: u32,
    /// Part of a multi-hop group.
    pub is_multi_hop: bool,
    /// Hops in the group this swap belongs to (1 for standalone swaps).
    pub hop_count: u32,
}

/// Consecutive swaps grouped into one routed trade.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MultiHopSwap {
    pub tx_hash: B256,
    /// Hops in execution order.
    pub hops: Vec<Swap>,
    /// Summed gas across hops.
    pub total_gas_used: u64,
}

impl MultiHopSwap {
    pub fn token_in(&self) -> Option<Address> {
        self.hops.first().map(|s| s.token_in)
    }

    pub fn token_out(&self) -> Option<Address> {
        self.hops.last().map(|s| s.token_out)
    }

    pub fn hop_count(&self) -> usize {
        self.hops.len()
    }

    pub fn pools(&self) -> Vec<Address> {
        self.hops.iter().map(|s| s.pool).collect()
    }
}

/// A cyclic arbitrage executed within a single transaction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Arbitrage {
    pub tx_hash: B256,
    pub block_number: u64,
    /// Ordered swaps forming the cycle on `profit_token`.
    pub path: Vec<Swap>,
    /// Token the cycle starts and ends with.
    pub profit_token: Address,
    /// `amount_out_last - amount_in_first`, in the profit token's units.
    pub gross_profit: U256,
    /// `amount_out_last / amount_in_first`.
    pub profit_ratio: f64,
    /// Transaction fee in Wei.
    pub gas_cost_wei: u128,
    /// Gross profit in Wei; 0 unless the profit token is wrapped ether.
    pub gross_profit_wei: u128,
    /// Gross minus gas, in Wei; 0 unless the profit token is wrapped ether.
    pub net_profit_wei: i128,
}

/// A front-run / victim / back-run triple on one pool.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Sandwich {
    pub front_tx: B256,
    /// Victims between front and back, in position order; the first entry is
    /// the reported victim.
    pub victim_txs: Vec<B256>,
    pub back_tx: B256,
    pub block_number: u64,
    /// Shared pool.
    pub pool: Address,
    /// Shared searcher (sender of front and back runs).
    pub searcher: Address,
    /// Token the searcher returns to; profit is denominated in it.
    pub profit_token: Address,
    /// `back.amount_out - front.amount_in`.
    pub gross_profit: U256,
    /// Front + back transaction fees in Wei.
    pub gas_cost_wei: u128,
    /// Gross minus gas, in Wei; 0 unless the profit token is wrapped ether.
    pub net_profit_wei: i128,
    pub front_swap: Swap,
    pub victim_swap: Swap,
    pub back_swap: Swap,
}

/// Flavor of a simulated (never-executed) opportunity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum WhatIfKind {
    Arbitrage,
    Sandwich,
}

impl WhatIfKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WhatIfKind::Arbitrage => "arbitrage",
            WhatIfKind::Sandwich => "sandwich",
        }
    }
}

/// One edge of a simulated path.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WhatIfHop {
    pub pool: Address,
    pub protocol: Protocol,
    pub token_in: Address,
    pub token_out: Address,
}

/// A missed opportunity surfaced by what-if simulation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WhatIfOpportunity {
    pub kind: WhatIfKind,
    pub block_number: u64,
    /// Block position the opportunity is anchored to.
    pub position: u32,
    pub profit_token: Address,
    /// Estimated profit in the profit token's units.
    pub profit_amount: U256,
    pub path: Vec<WhatIfHop>,
}

/// Per-transaction record kept for reporting.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransactionInfo {
    pub hash: B256,
    pub from: Address,
    pub to: Option<Address>,
    pub value: U256,
    pub gas_used: u64,
    pub gas_price: u128,
    /// true = success.
    pub status: bool,
    pub log_count: usize,
    /// Logs whose topic0 matched a known swap topic.
    pub swap_events_found: usize,
    /// Swap records that survived detection.
    pub parsed_swaps: usize,
    /// 4-byte selector of the calldata, rendered as lowercase hex.
    pub method_signature: Option<String>,
    /// topic0 of every log, in order.
    pub event_signatures: Vec<B256>,
    /// Per-transaction failure captured by the pipeline, if any.
    pub error: Option<String>,
}

/// Everything learned about one block.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InspectionResult {
    pub block_number: u64,
    pub transactions: Vec<TransactionInfo>,
    /// Block-wide swap list in (position, intra-transaction) order.
    pub swaps: Vec<Swap>,
    pub multi_hop_swaps: Vec<MultiHopSwap>,
    pub arbitrages: Vec<Arbitrage>,
    pub sandwiches: Vec<Sandwich>,
    pub whatif_opportunities: Vec<WhatIfOpportunity>,
}

impl InspectionResult {
    pub fn successful_transactions(&self) -> usize {
        self.transactions.iter().filter(|tx| tx.status).count()
    }

    pub fn total_logs(&self) -> usize {
        self.transactions.iter().map(|tx| tx.log_count).sum()
    }

    pub fn swap_events_detected(&self) -> usize {
        self.transactions.iter().map(|tx| tx.swap_events_found).sum()
    }
}
