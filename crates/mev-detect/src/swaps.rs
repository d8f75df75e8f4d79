//! Hybrid swap detection: fuse receipt-log candidates with swap-selector
//! invocations from the replay.
//!
//! A pool seen in both streams is validated by actual execution and scores
//! high; log-only and call-only records keep lower confidence. Records
//! below the configured floor are discarded and counted as filtered false
//! positives.

use std::collections::{HashMap, HashSet};

use alloy::primitives::{Address, U256};
use mev_data::cache::StateCache;
use mev_data::types::{
    DetectionSource, MultiHopSwap, Protocol, Receipt, Swap, Transaction,
};
use mev_data::{Result, RpcClient};
use mev_replay::decoder::{self, CallSwapCandidate};
use mev_replay::ReplayResult;

/// Cross-referenced in logs and calls.
pub const HYBRID_CONFIDENCE: f64 = 0.95;
/// Seen in logs only.
pub const LOG_ONLY_CONFIDENCE: f64 = 0.65;
/// Seen in calls only; amounts may be zero.
pub const CALL_ONLY_CONFIDENCE: f64 = 0.55;
/// Records below this confidence are discarded.
pub const DEFAULT_MIN_CONFIDENCE: f64 = 0.50;

/// Resettable detection counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SwapDetectorStats {
    pub transactions_analyzed: u64,
    pub swaps_log_only: u64,
    pub swaps_call_only: u64,
    pub swaps_hybrid: u64,
    pub multi_hop_groups: u64,
    pub false_positives_filtered: u64,
    pub token_resolution_failures: u64,
}

pub struct SwapDetector {
    min_confidence: f64,
    stats: SwapDetectorStats,
}

impl SwapDetector {
    pub fn new(min_confidence: f64) -> Self {
        Self {
            min_confidence,
            stats: SwapDetectorStats::default(),
        }
    }

    pub fn stats(&self) -> SwapDetectorStats {
        self.stats
    }

    pub fn reset_stats(&mut self) {
        self.stats = SwapDetectorStats::default();
    }

    /// Detect all swaps in one transaction. Failed transactions produce no
    /// records. Log-derived records preserve receipt-log order; call-only
    /// leftovers follow in call order.
    pub async fn detect(
        &mut self,
        cache: &StateCache,
        rpc: &RpcClient,
        tx: &Transaction,
        receipt: &Receipt,
        replay: &ReplayResult,
    ) -> Result<Vec<Swap>> {
        self.stats.transactions_analyzed += 1;
        if !receipt.status {
            return Ok(Vec::new());
        }

        // Stage 1: log candidates in receipt order.
        let log_candidates: Vec<_> = receipt
            .logs
            .iter()
            .filter_map(decoder::parse_swap_log)
            .collect();

        // Stage 2: successful allow-listed selector calls.
        let call_candidates = decoder::swap_calls(&replay.internal_calls);
        let mut call_by_pool: HashMap<Address, &CallSwapCandidate> = HashMap::new();
        for candidate in &call_candidates {
            call_by_pool.entry(candidate.pool).or_insert(candidate);
        }

        // Stage 3: fusion by pool address.
        let mut swaps = Vec::new();
        let mut matched: HashSet<Address> = HashSet::new();

        for candidate in &log_candidates {
            let Some((token0, token1)) =
                decoder::resolve_pool_tokens(cache, rpc, candidate.pool, candidate.protocol).await?
            else {
                self.stats.token_resolution_failures += 1;
                tracing::debug!(pool = %candidate.pool, "token resolution failed, dropping swap");
                continue;
            };
            let (token_in, token_out) = if candidate.token_in_is_token0 {
                (token0, token1)
            } else {
                (token1, token0)
            };

            let (detection, confidence, call_depth, call_index, gas_used) =
                match call_by_pool.get(&candidate.pool) {
                    Some(call) => {
                        matched.insert(candidate.pool);
                        (
                            DetectionSource::Hybrid,
                            HYBRID_CONFIDENCE,
                            call.depth,
                            Some(call.call_index),
                            call.gas_used,
                        )
                    }
                    None => (DetectionSource::LogOnly, LOG_ONLY_CONFIDENCE, 0, None, 0),
                };

            swaps.push(Swap {
                tx_hash: tx.hash,
                block_number: cache.block_number(),
                protocol: candidate.protocol,
                pool: candidate.pool,
                token_in,
                token_out,
                amount_in: candidate.amount_in,
                amount_out: candidate.amount_out,
                sender: tx.from,
                recipient: candidate.recipient.unwrap_or(tx.from),
                gas_used,
                detection,
                confidence,
                call_depth,
                log_index: Some(candidate.log_index),
                call_index,
                position: tx.position,
                is_multi_hop: false,
                hop_count: 1,
            });
        }

        // Call-only leftovers: useful for the arbitrage graph even with
        // zero amounts.
        let mut seen_call_pools: HashSet<Address> = HashSet::new();
        for candidate in &call_candidates {
            if matched.contains(&candidate.pool) || !seen_call_pools.insert(candidate.pool) {
                continue;
            }
            let protocol = if candidate.selector == decoder::selectors::V2_POOL_SWAP {
                Protocol::UniswapV2
            } else if candidate.selector == decoder::selectors::V3_POOL_SWAP {
                Protocol::UniswapV3
            } else {
                Protocol::Unknown
            };
            let Some((token0, token1)) =
                decoder::resolve_pool_tokens(cache, rpc, candidate.pool, protocol).await?
            else {
                self.stats.token_resolution_failures += 1;
                continue;
            };

            // The V2 pool form names the out-amounts; one being non-zero
            // fixes the direction.
            let (token_in, token_out, amount_out) =
                match (candidate.amount0_out, candidate.amount1_out) {
                    (Some(a0), Some(a1)) if a0 > U256::ZERO && a1.is_zero() => {
                        (token1, token0, a0)
                    }
                    (Some(a0), Some(a1)) if a1 > U256::ZERO && a0.is_zero() => {
                        (token0, token1, a1)
                    }
                    _ => (token0, token1, U256::ZERO),
                };

            swaps.push(Swap {
                tx_hash: tx.hash,
                block_number: cache.block_number(),
                protocol,
                pool: candidate.pool,
                token_in,
                token_out,
                amount_in: U256::ZERO,
                amount_out,
                sender: tx.from,
                recipient: candidate.recipient.unwrap_or(tx.from),
                gas_used: candidate.gas_used,
                detection: DetectionSource::CallOnly,
                confidence: CALL_ONLY_CONFIDENCE,
                call_depth: candidate.depth,
                log_index: None,
                call_index: Some(candidate.call_index),
                position: tx.position,
                is_multi_hop: false,
                hop_count: 1,
            });
        }

        let before = swaps.len();
        swaps.retain(|swap| swap.confidence >= self.min_confidence);
        self.stats.false_positives_filtered += (before - swaps.len()) as u64;

        for swap in &swaps {
            match swap.detection {
                DetectionSource::LogOnly => self.stats.swaps_log_only += 1,
                DetectionSource::CallOnly => self.stats.swaps_call_only += 1,
                DetectionSource::Hybrid => self.stats.swaps_hybrid += 1,
            }
        }

        Ok(swaps)
    }

    /// Stage 4: sort by (call depth, call/log index) and split into groups
    /// on any step back to a shallower depth. Groups of two or more hops
    /// become multi-hop records with totalled gas; their members get hop
    /// flags. Token-chain continuity is not required here.
    pub fn group_multi_hops(&mut self, swaps: &mut [Swap]) -> Vec<MultiHopSwap> {
        if swaps.len() < 2 {
            return Vec::new();
        }

        let mut order: Vec<usize> = (0..swaps.len()).collect();
        order.sort_by_key(|&i| {
            (
                swaps[i].call_depth,
                swaps[i]
                    .call_index
                    .map(|c| c as u64)
                    .or(swaps[i].log_index)
                    .unwrap_or(0),
            )
        });

        let mut groups: Vec<Vec<usize>> = Vec::new();
        let mut current: Vec<usize> = Vec::new();
        for &i in &order {
            match current.last() {
                Some(&last) if swaps[i].call_depth < swaps[last].call_depth => {
                    groups.push(std::mem::take(&mut current));
                    current.push(i);
                }
                _ => current.push(i),
            }
        }
        groups.push(current);

        let mut multi_hops = Vec::new();
        for group in groups.into_iter().filter(|g| g.len() >= 2) {
            for &i in &group {
                swaps[i].is_multi_hop = true;
                swaps[i].hop_count = group.len() as u32;
            }
            multi_hops.push(MultiHopSwap {
                tx_hash: swaps[group[0]].tx_hash,
                total_gas_used: group.iter().map(|&i| swaps[i].gas_used).sum(),
                hops: group.iter().map(|&i| swaps[i].clone()).collect(),
            });
            self.stats.multi_hop_groups += 1;
        }
        multi_hops
    }
}
