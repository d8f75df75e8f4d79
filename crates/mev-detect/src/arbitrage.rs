//! Cyclic arbitrage detection over one transaction's ordered swap list.
//!
//! A contiguous run of swaps whose tokens chain and whose last output token
//! equals the first input token is an arbitrage when the round trip gains
//! at least `1 + epsilon`. Accepted cycles never overlap: the scan resumes
//! after the last swap of each accepted cycle.

use alloy::primitives::U256;
use mev_data::types::{Arbitrage, Swap};
use mev_replay::decoder::addresses::WETH;

/// Minimum round-trip gain: 0.1%.
pub const DEFAULT_EPSILON: f64 = 0.001;

const RATIO_SCALE: u128 = 1_000_000;

/// Scan one transaction's swaps for non-overlapping profitable cycles,
/// reported left to right. `gas_cost_wei` is the transaction fee from the
/// receipt.
pub fn find_arbitrages(swaps: &[Swap], gas_cost_wei: u128, epsilon: f64) -> Vec<Arbitrage> {
    let mut results = Vec::new();
    let mut start = 0;

    while start < swaps.len() {
        let mut accepted_end = None;
        let mut end = start + 1;
        while end < swaps.len() && swaps[end].token_in == swaps[end - 1].token_out {
            end += 1;
            let path = &swaps[start..end];
            if path[0].token_in == path[path.len() - 1].token_out
                && meets_threshold(path[0].amount_in, path[path.len() - 1].amount_out, epsilon)
            {
                accepted_end = Some(end);
                break;
            }
        }

        match accepted_end {
            Some(end) => {
                results.push(build(&swaps[start..end], gas_cost_wei));
                start = end;
            }
            None => start += 1,
        }
    }
    results
}

/// `amount_out / amount_in >= 1 + epsilon`, in integer cross-multiplication
/// where possible.
fn meets_threshold(amount_in: U256, amount_out: U256, epsilon: f64) -> bool {
    if amount_in.is_zero() {
        return false;
    }
    let threshold = ((1.0 + epsilon) * RATIO_SCALE as f64).round() as u128;
    match (
        amount_out.checked_mul(U256::from(RATIO_SCALE)),
        amount_in.checked_mul(U256::from(threshold)),
    ) {
        (Some(lhs), Some(rhs)) => lhs >= rhs,
        // Amounts near the top of the range: fall back to the float ratio.
        _ => u256_to_f64(amount_out) / u256_to_f64(amount_in) >= 1.0 + epsilon,
    }
}

fn build(path: &[Swap], gas_cost_wei: u128) -> Arbitrage {
    let first = &path[0];
    let last = &path[path.len() - 1];
    let gross_profit = last.amount_out.saturating_sub(first.amount_in);
    let profit_ratio = if first.amount_in.is_zero() {
        0.0
    } else {
        u256_to_f64(last.amount_out) / u256_to_f64(first.amount_in)
    };

    // Wei figures only when the cycle is denominated in wrapped ether.
    let (gross_profit_wei, net_profit_wei) = if first.token_in == WETH {
        let gross: u128 = gross_profit.try_into().unwrap_or(u128::MAX);
        (gross, gross as i128 - gas_cost_wei as i128)
    } else {
        (0, 0)
    };

    Arbitrage {
        tx_hash: first.tx_hash,
        block_number: first.block_number,
        path: path.to_vec(),
        profit_token: first.token_in,
        gross_profit,
        profit_ratio,
        gas_cost_wei,
        gross_profit_wei,
        net_profit_wei,
    }
}

/// Lossy conversion for ratio reporting.
pub fn u256_to_f64(value: U256) -> f64 {
    value
        .into_limbs()
        .iter()
        .enumerate()
        .map(|(i, &limb)| limb as f64 * 2f64.powi(64 * i as i32))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{Address, Bytes, B256};
    use mev_data::types::{DetectionSource, Protocol};

    fn addr(n: u8) -> Address {
        let mut bytes = [0u8; 20];
        bytes[19] = n;
        Address::from(bytes)
    }

    fn swap(token_in: Address, token_out: Address, amount_in: u64, amount_out: u64) -> Swap {
        Swap {
            tx_hash: B256::repeat_byte(0x11),
            block_number: 100,
            protocol: Protocol::UniswapV2,
            pool: addr(0xb0),
            token_in,
            token_out,
            amount_in: U256::from(amount_in),
            amount_out: U256::from(amount_out),
            sender: addr(0x01),
            recipient: addr(0x01),
            gas_used: 50_000,
            detection: DetectionSource::LogOnly,
            confidence: 0.65,
            call_depth: 0,
            log_index: Some(0),
            call_index: None,
            position: 0,
            is_multi_hop: false,
            hop_count: 1,
        }
    }

    #[test]
    fn triangular_cycle_is_detected() {
        let swaps = vec![
            swap(addr(0xaa), addr(0xbb), 100, 200),
            swap(addr(0xbb), addr(0xcc), 200, 300),
            swap(addr(0xcc), addr(0xaa), 300, 101),
        ];
        let arbs = find_arbitrages(&swaps, 5, DEFAULT_EPSILON);
        assert_eq!(arbs.len(), 1);
        let arb = &arbs[0];
        assert_eq!(arb.path.len(), 3);
        assert_eq!(arb.profit_token, addr(0xaa));
        assert_eq!(arb.gross_profit, U256::from(1));
        assert!((arb.profit_ratio - 1.01).abs() < 1e-9);
        // Chain invariant holds across the reported path.
        for pair in arb.path.windows(2) {
            assert_eq!(pair[0].token_out, pair[1].token_in);
        }
        assert_eq!(arb.path[0].token_in, arb.path[2].token_out);
    }

    #[test]
    fn broken_chain_is_rejected() {
        let swaps = vec![
            swap(addr(0xaa), addr(0xbb), 100, 200),
            swap(addr(0xdd), addr(0xcc), 200, 300),
            swap(addr(0xcc), addr(0xaa), 300, 400),
        ];
        assert!(find_arbitrages(&swaps, 0, DEFAULT_EPSILON).is_empty());
    }

    #[test]
    fn below_epsilon_is_rejected() {
        // Round trip of exactly 1.0005 with the default 0.1% threshold.
        let swaps = vec![
            swap(addr(0xaa), addr(0xbb), 10_000, 20_000),
            swap(addr(0xbb), addr(0xaa), 20_000, 10_005),
        ];
        assert!(find_arbitrages(&swaps, 0, DEFAULT_EPSILON).is_empty());

        // The exact threshold is accepted.
        let swaps = vec![
            swap(addr(0xaa), addr(0xbb), 10_000, 20_000),
            swap(addr(0xbb), addr(0xaa), 20_000, 10_010),
        ];
        assert_eq!(find_arbitrages(&swaps, 0, DEFAULT_EPSILON).len(), 1);
    }

    #[test]
    fn accepted_cycles_do_not_overlap() {
        let swaps = vec![
            swap(addr(0xaa), addr(0xbb), 100, 200),
            swap(addr(0xbb), addr(0xaa), 200, 110),
            swap(addr(0xcc), addr(0xdd), 100, 200),
            swap(addr(0xdd), addr(0xcc), 200, 150),
        ];
        let arbs = find_arbitrages(&swaps, 0, DEFAULT_EPSILON);
        assert_eq!(arbs.len(), 2);
        assert_eq!(arbs[0].profit_token, addr(0xaa));
        assert_eq!(arbs[1].profit_token, addr(0xcc));
    }

    #[test]
    fn weth_cycles_report_wei_figures() {
        let one_eth = 1_000_000_000_000_000_000u64;
        let mut first = swap(WETH, addr(0xbb), 0, 0);
        first.amount_in = U256::from(one_eth);
        first.amount_out = U256::from(2) * U256::from(one_eth);
        let mut second = swap(addr(0xbb), WETH, 0, 0);
        second.amount_in = first.amount_out;
        second.amount_out = U256::from(one_eth) + U256::from(30_000_000u64);

        let arbs = find_arbitrages(&[first, second], 10_000_000, DEFAULT_EPSILON);
        assert_eq!(arbs.len(), 1);
        assert_eq!(arbs[0].gross_profit_wei, 30_000_000);
        assert_eq!(arbs[0].net_profit_wei, 20_000_000);
    }

    #[test]
    fn non_weth_cycles_leave_wei_figures_at_zero() {
        let swaps = vec![
            swap(addr(0xaa), addr(0xbb), 100, 200),
            swap(addr(0xbb), addr(0xaa), 200, 150),
        ];
        let arbs = find_arbitrages(&swaps, 42, DEFAULT_EPSILON);
        assert_eq!(arbs[0].gross_profit, U256::from(50));
        assert_eq!(arbs[0].gross_profit_wei, 0);
        assert_eq!(arbs[0].net_profit_wei, 0);
        assert_eq!(arbs[0].gas_cost_wei, 42);
    }

    #[test]
    fn zero_input_never_divides() {
        let swaps = vec![
            swap(addr(0xaa), addr(0xbb), 0, 200),
            swap(addr(0xbb), addr(0xaa), 200, 300),
        ];
        assert!(find_arbitrages(&swaps, 0, DEFAULT_EPSILON).is_empty());
    }

    #[test]
    fn u256_to_f64_round_numbers() {
        assert_eq!(u256_to_f64(U256::from(0)), 0.0);
        assert_eq!(u256_to_f64(U256::from(1_000_000)), 1_000_000.0);
        let big = U256::from(1u64) << 64;
        assert_eq!(u256_to_f64(big), 2f64.powi(64));
    }
}
