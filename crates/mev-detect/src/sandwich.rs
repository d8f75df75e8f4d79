//! Sandwich detection across one block's swap list.
//!
//! For each pool, position-ordered swaps are scanned for (front, victim,
//! back) triples of distinct transactions where the same searcher sends
//! front and back, the front trades with the victim, and the back unwinds
//! against them. Only the first qualifying triple per front-run is
//! reported; victims between front and back are all recorded, with the
//! first as the reported victim.

use std::collections::{BTreeMap, HashMap, HashSet};

use alloy::primitives::{Address, B256};
use mev_data::types::{Sandwich, Swap};
use mev_replay::decoder::addresses::WETH;

/// Detect sandwiches over the block-wide swap list. `gas_costs_wei` maps a
/// transaction hash to its receipt-derived fee.
pub fn find_sandwiches(swaps: &[Swap], gas_costs_wei: &HashMap<B256, u128>) -> Vec<Sandwich> {
    // BTreeMap so pools are visited in a deterministic order.
    let mut by_pool: BTreeMap<Address, Vec<&Swap>> = BTreeMap::new();
    for swap in swaps {
        by_pool.entry(swap.pool).or_default().push(swap);
    }

    let mut sandwiches = Vec::new();
    for (pool, mut pool_swaps) in by_pool {
        if pool_swaps.len() < 3 {
            continue;
        }
        pool_swaps.sort_by_key(|s| (s.position, s.log_index.unwrap_or(0)));

        let mut used_fronts: HashSet<B256> = HashSet::new();
        for f in 0..pool_swaps.len() {
            let front = pool_swaps[f];
            if used_fronts.contains(&front.tx_hash) {
                continue;
            }
            if let Some(sandwich) = first_triple_for_front(pool, front, &pool_swaps[f + 1..], gas_costs_wei)
            {
                used_fronts.insert(front.tx_hash);
                sandwiches.push(sandwich);
            }
        }
    }

    sandwiches.sort_by_key(|s| (s.front_swap.position, s.back_swap.position));
    sandwiches
}

fn first_triple_for_front(
    pool: Address,
    front: &Swap,
    later: &[&Swap],
    gas_costs_wei: &HashMap<B256, u128>,
) -> Option<Sandwich> {
    for (v, victim) in later.iter().enumerate() {
        if victim.position <= front.position || victim.tx_hash == front.tx_hash {
            continue;
        }
        // The victim trades in the front-run's direction.
        if victim.token_in != front.token_in || victim.token_out != front.token_out {
            continue;
        }

        for back in &later[v + 1..] {
            if back.position <= victim.position
                || back.tx_hash == victim.tx_hash
                || back.tx_hash == front.tx_hash
            {
                continue;
            }
            // Same searcher fronts and backs.
            if back.sender != front.sender {
                continue;
            }
            // The back-run reverses the victim's direction.
            if back.token_in != victim.token_out || back.token_out != victim.token_in {
                continue;
            }
            // Gross profit in the front's input token; positive only.
            if back.amount_out <= front.amount_in {
                continue;
            }
            let gross_profit = back.amount_out - front.amount_in;

            let victim_txs = victims_between(front, back, later);
            let gas_cost_wei = gas_costs_wei.get(&front.tx_hash).copied().unwrap_or(0)
                + gas_costs_wei.get(&back.tx_hash).copied().unwrap_or(0);
            let net_profit_wei = if front.token_in == WETH {
                let gross: u128 = gross_profit.try_into().unwrap_or(u128::MAX);
                gross as i128 - gas_cost_wei as i128
            } else {
                0
            };

            return Some(Sandwich {
                front_tx: front.tx_hash,
                victim_txs,
                back_tx: back.tx_hash,
                block_number: front.block_number,
                pool,
                searcher: front.sender,
                profit_token: front.token_in,
                gross_profit,
                gas_cost_wei,
                net_profit_wei,
                front_swap: front.clone(),
                victim_swap: (*victim).clone(),
                back_swap: (*back).clone(),
            });
        }
    }
    None
}

/// Every distinct transaction between front and back trading in the
/// front-run's direction. The first entry is the reported victim.
fn victims_between(front: &Swap, back: &Swap, later: &[&Swap]) -> Vec<B256> {
    let mut seen = HashSet::new();
    let mut victims = Vec::new();
    for swap in later {
        if swap.position <= front.position || swap.position >= back.position {
            continue;
        }
        if swap.tx_hash == front.tx_hash || swap.tx_hash == back.tx_hash {
            continue;
        }
        if swap.token_in == front.token_in
            && swap.token_out == front.token_out
            && seen.insert(swap.tx_hash)
        {
            victims.push(swap.tx_hash);
        }
    }
    victims
}
