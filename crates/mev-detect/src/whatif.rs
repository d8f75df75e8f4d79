//! What-if simulation: opportunities the block left on the table.
//!
//! Builds a directed multigraph (token → token via pool) from the block's
//! observed swaps and walks it with a bounded DFS, pricing each path with
//! the protocol estimator. Paths with any zero-output edge are pruned, and
//! a pool is never reused within one path. Disabled by default; the
//! pipeline only calls in here when what-if is requested.

use std::collections::{HashMap, HashSet};

use alloy::primitives::{Address, U256};
use mev_data::cache::StateCache;
use mev_data::types::{Protocol, Swap, WhatIfHop, WhatIfKind, WhatIfOpportunity};
use mev_data::{Result, RpcClient};
use mev_replay::decoder;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;

/// Bounded DFS depth.
pub const DEFAULT_MAX_DEPTH: usize = 3;

/// Probe size: one whole token of 18 decimals.
fn probe_amount() -> U256 {
    U256::from(10).pow(U256::from(18))
}

#[derive(Clone, Debug)]
struct PoolEdge {
    pool: Address,
    protocol: Protocol,
}

/// Token graph for one block: nodes are tokens, parallel edges are pools.
pub struct PoolGraph {
    graph: DiGraph<Address, PoolEdge>,
    nodes: Vec<NodeIndex>,
}

impl PoolGraph {
    pub fn from_swaps(swaps: &[Swap]) -> Self {
        let mut graph = DiGraph::new();
        let mut node_ix: HashMap<Address, NodeIndex> = HashMap::new();
        let mut nodes = Vec::new();
        let mut seen_edges: HashSet<(Address, Address, Address)> = HashSet::new();

        for swap in swaps {
            let from = *node_ix.entry(swap.token_in).or_insert_with(|| {
                let ix = graph.add_node(swap.token_in);
                nodes.push(ix);
                ix
            });
            let to = *node_ix.entry(swap.token_out).or_insert_with(|| {
                let ix = graph.add_node(swap.token_out);
                nodes.push(ix);
                ix
            });
            if seen_edges.insert((swap.pool, swap.token_in, swap.token_out)) {
                graph.add_edge(
                    from,
                    to,
                    PoolEdge {
                        pool: swap.pool,
                        protocol: swap.protocol,
                    },
                );
            }
        }

        Self { graph, nodes }
    }

    pub fn token_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }
}

struct Frame {
    node: NodeIndex,
    amount: U256,
    path: Vec<WhatIfHop>,
    pools_used: Vec<Address>,
}

/// Simulate cyclic paths over the pool graph; report every cycle whose
/// round trip beats the probe amount.
pub async fn find_arbitrage_whatif(
    cache: &StateCache,
    rpc: &RpcClient,
    swaps: &[Swap],
    max_depth: usize,
    block_number: u64,
) -> Result<Vec<WhatIfOpportunity>> {
    let pool_graph = PoolGraph::from_swaps(swaps);
    let probe = probe_amount();
    let mut opportunities = Vec::new();

    for &start in &pool_graph.nodes {
        let start_token = pool_graph.graph[start];
        let mut stack = vec![Frame {
            node: start,
            amount: probe,
            path: Vec::new(),
            pools_used: Vec::new(),
        }];

        while let Some(frame) = stack.pop() {
            let token_in = pool_graph.graph[frame.node];
            for edge in pool_graph.graph.edges(frame.node) {
                let info = edge.weight();
                if frame.pools_used.contains(&info.pool) {
                    continue;
                }
                let token_out = pool_graph.graph[edge.target()];

                let out = decoder::calculate_output(
                    cache,
                    rpc,
                    info.protocol,
                    info.pool,
                    token_in,
                    frame.amount,
                )
                .await?;
                // Zero estimator output prunes the path.
                if out.is_zero() {
                    continue;
                }

                let mut path = frame.path.clone();
                path.push(WhatIfHop {
                    pool: info.pool,
                    protocol: info.protocol,
                    token_in,
                    token_out,
                });

                if token_out == start_token {
                    if out > probe {
                        opportunities.push(WhatIfOpportunity {
                            kind: WhatIfKind::Arbitrage,
                            block_number,
                            position: 0,
                            profit_token: start_token,
                            profit_amount: out - probe,
                            path,
                        });
                    }
                } else if path.len() < max_depth {
                    let mut pools_used = frame.pools_used.clone();
                    pools_used.push(info.pool);
                    stack.push(Frame {
                        node: edge.target(),
                        amount: out,
                        path,
                        pools_used,
                    });
                }
            }
        }
    }

    Ok(opportunities)
}

/// For each observed swap, simulate a hypothetical front/back pair around
/// it on the pool's pre-trade reserves. V2 pools only; the front run
/// probes at a tenth of the victim's size.
pub async fn find_sandwich_whatif(
    cache: &StateCache,
    rpc: &RpcClient,
    swaps: &[Swap],
    block_number: u64,
) -> Result<Vec<WhatIfOpportunity>> {
    let mut opportunities = Vec::new();

    for victim in swaps {
        if victim.protocol != Protocol::UniswapV2 || victim.amount_in.is_zero() {
            continue;
        }
        let Some((token0, token1)) =
            decoder::resolve_pool_tokens(cache, rpc, victim.pool, victim.protocol).await?
        else {
            continue;
        };
        let Some(reserves) = decoder::v2_reserves(cache, rpc, victim.pool).await? else {
            continue;
        };
        let (reserve_in, reserve_out) = if victim.token_in == token0 {
            (reserves.reserve0, reserves.reserve1)
        } else if victim.token_in == token1 {
            (reserves.reserve1, reserves.reserve0)
        } else {
            continue;
        };

        let front_in = victim.amount_in / U256::from(10);
        if front_in.is_zero() {
            continue;
        }

        // Front-run buys, moving the price.
        let front_out = decoder::v2_output(front_in, reserve_in, reserve_out);
        if front_out.is_zero() {
            continue;
        }
        let reserve_in = reserve_in + front_in;
        let reserve_out = reserve_out.saturating_sub(front_out);

        // Victim trades at the moved price.
        let victim_out = decoder::v2_output(victim.amount_in, reserve_in, reserve_out);
        let reserve_in = reserve_in + victim.amount_in;
        let reserve_out = reserve_out.saturating_sub(victim_out);

        // Back-run unwinds into the pushed pool.
        let back_out = decoder::v2_output(front_out, reserve_out, reserve_in);
        if back_out <= front_in {
            continue;
        }

        opportunities.push(WhatIfOpportunity {
            kind: WhatIfKind::Sandwich,
            block_number,
            position: victim.position,
            profit_token: victim.token_in,
            profit_amount: back_out - front_in,
            path: vec![WhatIfHop {
                pool: victim.pool,
                protocol: victim.protocol,
                token_in: victim.token_in,
                token_out: victim.token_out,
            }],
        });
    }

    Ok(opportunities)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{Bytes, B256};
    use futures::future::BoxFuture;
    use mev_data::cache::CacheSizes;
    use mev_data::pool_store::PoolTokenStore;
    use mev_data::rpc::{RpcClient, RpcConfig, Transport};
    use mev_data::types::DetectionSource;
    use mev_data::InspectError;
    use std::sync::Arc;

    struct FailTransport;

    impl Transport for FailTransport {
        fn send<'a>(
            &'a self,
            _payload: serde_json::Value,
            _timeout: std::time::Duration,
        ) -> BoxFuture<'a, Result<serde_json::Value>> {
            Box::pin(async { Err(InspectError::Transport("offline".into())) })
        }
    }

    fn addr(n: u8) -> Address {
        let mut bytes = [0u8; 20];
        bytes[19] = n;
        Address::from(bytes)
    }

    fn offline_cache() -> (Arc<StateCache>, Arc<RpcClient>) {
        let rpc = Arc::new(RpcClient::new(
            Box::new(FailTransport),
            RpcConfig {
                max_retries: 1,
                backoff_ms: 1,
                ..RpcConfig::default()
            },
        ));
        let store = Arc::new(PoolTokenStore::in_memory().expect("store"));
        (
            Arc::new(StateCache::new(rpc.clone(), store, 100, CacheSizes::default())),
            rpc,
        )
    }

    fn seed_v2_pool(
        cache: &StateCache,
        pool: Address,
        token0: Address,
        token1: Address,
        reserve0: u128,
        reserve1: u128,
    ) {
        cache
            .install_many_pool_tokens([(pool, (token0, token1))], 100)
            .unwrap();
        let packed = U256::from(reserve0) | (U256::from(reserve1) << 112);
        cache.install_storage(pool, U256::from(8), packed);
    }

    fn observed_swap(pool: Address, protocol: Protocol, token_in: Address, token_out: Address, amount_in: u64) -> Swap {
        Swap {
            tx_hash: B256::repeat_byte(0x11),
            block_number: 100,
            protocol,
            pool,
            token_in,
            token_out,
            amount_in: U256::from(amount_in),
            amount_out: U256::from(1),
            sender: addr(0x01),
            recipient: addr(0x01),
            gas_used: 0,
            detection: DetectionSource::LogOnly,
            confidence: 0.65,
            call_depth: 0,
            log_index: Some(0),
            call_index: None,
            position: 4,
            is_multi_hop: false,
            hop_count: 1,
        }
    }

    #[test]
    fn graph_dedupes_parallel_observations() {
        let swaps = vec![
            observed_swap(addr(0xb0), Protocol::UniswapV2, addr(0xaa), addr(0xbb), 5),
            observed_swap(addr(0xb0), Protocol::UniswapV2, addr(0xaa), addr(0xbb), 9),
            observed_swap(addr(0xb1), Protocol::UniswapV2, addr(0xaa), addr(0xbb), 9),
        ];
        let graph = PoolGraph::from_swaps(&swaps);
        assert_eq!(graph.token_count(), 2);
        // Same pool+direction collapses; a second pool stays parallel.
        assert_eq!(graph.edge_count(), 2);
    }

    #[tokio::test]
    async fn profitable_two_pool_cycle_is_reported() {
        let (cache, rpc) = offline_cache();
        let one = 1_000_000_000_000_000_000u128;
        // Pool b0 sells bb cheap; pool b1 buys bb dear.
        seed_v2_pool(&cache, addr(0xb0), addr(0xaa), addr(0xbb), 1_000 * one, 2_000 * one);
        seed_v2_pool(&cache, addr(0xb1), addr(0xaa), addr(0xbb), 2_200 * one, 1_000 * one);

        let swaps = vec![
            observed_swap(addr(0xb0), Protocol::UniswapV2, addr(0xaa), addr(0xbb), 5),
            observed_swap(addr(0xb1), Protocol::UniswapV2, addr(0xbb), addr(0xaa), 5),
        ];

        let opportunities =
            find_arbitrage_whatif(&cache, &rpc, &swaps, DEFAULT_MAX_DEPTH, 100)
                .await
                .unwrap();

        let cycle = opportunities
            .iter()
            .find(|o| o.profit_token == addr(0xaa))
            .expect("cycle starting at aa should be profitable");
        assert_eq!(cycle.kind, WhatIfKind::Arbitrage);
        assert_eq!(cycle.path.len(), 2);
        assert!(cycle.profit_amount > U256::ZERO);
        assert_eq!(rpc.round_trips(), 0);
    }

    #[tokio::test]
    async fn v3_edges_are_pruned() {
        let (cache, rpc) = offline_cache();
        cache
            .install_many_pool_tokens([(addr(0xb0), (addr(0xaa), addr(0xbb)))], 100)
            .unwrap();

        let swaps = vec![
            observed_swap(addr(0xb0), Protocol::UniswapV3, addr(0xaa), addr(0xbb), 5),
            observed_swap(addr(0xb0), Protocol::UniswapV3, addr(0xbb), addr(0xaa), 5),
        ];

        let opportunities =
            find_arbitrage_whatif(&cache, &rpc, &swaps, DEFAULT_MAX_DEPTH, 100)
                .await
                .unwrap();
        assert!(opportunities.is_empty());
    }

    #[tokio::test]
    async fn hypothetical_sandwich_on_large_victim() {
        let (cache, rpc) = offline_cache();
        seed_v2_pool(&cache, addr(0xb0), addr(0xaa), addr(0xbb), 1_000, 1_000);

        let swaps = vec![observed_swap(
            addr(0xb0),
            Protocol::UniswapV2,
            addr(0xaa),
            addr(0xbb),
            500,
        )];

        let opportunities = find_sandwich_whatif(&cache, &rpc, &swaps, 100).await.unwrap();
        assert_eq!(opportunities.len(), 1);
        let opp = &opportunities[0];
        assert_eq!(opp.kind, WhatIfKind::Sandwich);
        assert_eq!(opp.position, 4);
        assert_eq!(opp.profit_token, addr(0xaa));
        assert!(opp.profit_amount > U256::ZERO);
    }

    #[tokio::test]
    async fn small_victims_are_not_worth_sandwiching() {
        let (cache, rpc) = offline_cache();
        seed_v2_pool(&cache, addr(0xb0), addr(0xaa), addr(0xbb), 1_000_000, 1_000_000);

        let swaps = vec![observed_swap(
            addr(0xb0),
            Protocol::UniswapV2,
            addr(0xaa),
            addr(0xbb),
            100,
        )];

        let opportunities = find_sandwich_whatif(&cache, &rpc, &swaps, 100).await.unwrap();
        assert!(opportunities.is_empty());
    }
}
