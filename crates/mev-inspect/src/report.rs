//! JSON report rendering.
//!
//! All hex identifiers are lowercase and 0x-prefixed. Token amounts are
//! JSON numbers while they fit the float-safe integer range (≤ 2⁵³−1) and
//! decimal strings beyond that, so reports stay loadable from any JSON
//! tooling without silent precision loss. Output is deterministic: maps
//! serialize with sorted keys.

use std::fmt;
use std::str::FromStr;

use alloy::primitives::U256;
use mev_data::types::{
    Arbitrage, InspectionResult, MultiHopSwap, Sandwich, Swap, TransactionInfo, WhatIfOpportunity,
};
use serde_json::{json, Value};

const MAX_SAFE_INTEGER: u128 = (1 << 53) - 1;

/// Report verbosity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReportMode {
    /// Findings and summary only.
    Basic,
    /// Everything, including per-transaction info and the raw swap array.
    Full,
}

impl FromStr for ReportMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "basic" => Ok(ReportMode::Basic),
            "full" => Ok(ReportMode::Full),
            other => Err(format!("unknown report mode `{other}` (expected basic|full)")),
        }
    }
}

impl fmt::Display for ReportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ReportMode::Basic => "basic",
            ReportMode::Full => "full",
        })
    }
}

/// Render an inspection result.
pub fn to_json(result: &InspectionResult, mode: ReportMode) -> Value {
    let mut report = json!({
        "block_number": result.block_number,
        "summary": summary(result),
        "arbitrages": result.arbitrages.iter().enumerate().map(|(i, a)| arbitrage(i, a)).collect::<Vec<_>>(),
        "sandwiches": result.sandwiches.iter().enumerate().map(|(i, s)| sandwich(i, s)).collect::<Vec<_>>(),
        "whatif_opportunities": result.whatif_opportunities.iter().map(whatif).collect::<Vec<_>>(),
    });

    if mode == ReportMode::Full {
        if let Value::Object(object) = &mut report {
            object.insert(
                "transactions".to_string(),
                result.transactions.iter().map(transaction).collect(),
            );
            object.insert("swaps".to_string(), result.swaps.iter().map(swap).collect());
            object.insert(
                "multi_hop_swaps".to_string(),
                result.multi_hop_swaps.iter().map(multi_hop).collect(),
            );
        }
    }
    report
}

fn summary(result: &InspectionResult) -> Value {
    let total = result.transactions.len();
    let successful = result.successful_transactions();
    json!({
        "total_transactions": total,
        "successful_transactions": successful,
        "failed_transactions": total - successful,
        "total_logs": result.total_logs(),
        "swap_events_detected": result.swap_events_detected(),
        "swaps_parsed": result.swaps.len(),
        "arbitrages_found": result.arbitrages.len(),
        "sandwiches_found": result.sandwiches.len(),
        "whatif_opportunities": result.whatif_opportunities.len(),
    })
}

fn transaction(tx: &TransactionInfo) -> Value {
    json!({
        "hash": hex(&tx.hash),
        "from": hex(&tx.from),
        "to": tx.to.as_ref().map(hex),
        "value": amount(tx.value),
        "gas_used": tx.gas_used,
        "gas_price": amount_u128(tx.gas_price),
        "status": if tx.status { "success" } else { "failed" },
        "log_count": tx.log_count,
        "swap_events_found": tx.swap_events_found,
        "parsed_swaps": tx.parsed_swaps,
        "method_signature": tx.method_signature,
        "event_signatures": tx.event_signatures.iter().map(hex).collect::<Vec<_>>(),
        "error": tx.error,
    })
}

fn swap(s: &Swap) -> Value {
    json!({
        "tx_hash": hex(&s.tx_hash),
        "block_number": s.block_number,
        "protocol": s.protocol.as_str(),
        "pool": hex(&s.pool),
        "token_in": hex(&s.token_in),
        "token_out": hex(&s.token_out),
        "amount_in": amount(s.amount_in),
        "amount_out": amount(s.amount_out),
        "sender": hex(&s.sender),
        "recipient": hex(&s.recipient),
        "gas_used": s.gas_used,
        "detection": s.detection.as_str(),
        "confidence": s.confidence,
        "call_depth": s.call_depth,
        "log_index": s.log_index,
        "call_index": s.call_index,
        "position": s.position,
        "is_multi_hop": s.is_multi_hop,
        "hop_count": s.hop_count,
    })
}

fn multi_hop(m: &MultiHopSwap) -> Value {
    json!({
        "tx_hash": hex(&m.tx_hash),
        "hop_count": m.hop_count(),
        "total_gas_used": m.total_gas_used,
        "pools": m.pools().iter().map(hex).collect::<Vec<_>>(),
        "token_in": m.token_in().as_ref().map(hex),
        "token_out": m.token_out().as_ref().map(hex),
        "hops": m.hops.iter().map(swap).collect::<Vec<_>>(),
    })
}

fn arbitrage(index: usize, a: &Arbitrage) -> Value {
    json!({
        "id": format!("arb_{}", index + 1),
        "tx_hash": hex(&a.tx_hash),
        "block_number": a.block_number,
        "profit_token": hex(&a.profit_token),
        "start_amount": a.path.first().map(|s| amount(s.amount_in)),
        "end_amount": a.path.last().map(|s| amount(s.amount_out)),
        "gross_profit": amount(a.gross_profit),
        "profit_ratio": a.profit_ratio,
        "gas_cost_wei": amount_u128(a.gas_cost_wei),
        "gross_profit_wei": amount_u128(a.gross_profit_wei),
        "net_profit_wei": amount_i128(a.net_profit_wei),
        "path": a.path.iter().map(swap).collect::<Vec<_>>(),
    })
}

fn sandwich(index: usize, s: &Sandwich) -> Value {
    json!({
        "id": format!("sand_{}", index + 1),
        "front_tx": hex(&s.front_tx),
        "victim_txs": s.victim_txs.iter().map(hex).collect::<Vec<_>>(),
        "back_tx": hex(&s.back_tx),
        "block_number": s.block_number,
        "pool": hex(&s.pool),
        "searcher": hex(&s.searcher),
        "profit_token": hex(&s.profit_token),
        "gross_profit": amount(s.gross_profit),
        "gas_cost_wei": amount_u128(s.gas_cost_wei),
        "net_profit_wei": amount_i128(s.net_profit_wei),
        "front_swap": swap(&s.front_swap),
        "victim_swap": swap(&s.victim_swap),
        "back_swap": swap(&s.back_swap),
    })
}

fn whatif(opp: &WhatIfOpportunity) -> Value {
    json!({
        "type": opp.kind.as_str(),
        "block_number": opp.block_number,
        "position": opp.position,
        "profit_token": hex(&opp.profit_token),
        "profit_amount": amount(opp.profit_amount),
        "path": opp.path.iter().map(|hop| json!({
            "pool": hex(&hop.pool),
            "protocol": hop.protocol.as_str(),
            "token_in": hex(&hop.token_in),
            "token_out": hex(&hop.token_out),
        })).collect::<Vec<_>>(),
    })
}

fn hex<T: fmt::LowerHex>(value: &T) -> String {
    format!("{value:#x}")
}

/// JSON number while float-safe, decimal string beyond.
fn amount(value: U256) -> Value {
    if value <= U256::from(MAX_SAFE_INTEGER) {
        Value::from(value.to::<u64>())
    } else {
        Value::String(value.to_string())
    }
}

fn amount_u128(value: u128) -> Value {
    if value <= MAX_SAFE_INTEGER {
        Value::from(value as u64)
    } else {
        Value::String(value.to_string())
    }
}

fn amount_i128(value: i128) -> Value {
    if value.unsigned_abs() <= MAX_SAFE_INTEGER {
        Value::from(value as i64)
    } else {
        Value::String(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{Address, B256};
    use mev_data::types::{DetectionSource, Protocol};

    fn addr(n: u8) -> Address {
        let mut bytes = [0u8; 20];
        bytes[19] = n;
        Address::from(bytes)
    }

    fn sample_swap() -> Swap {
        Swap {
            tx_hash: B256::repeat_byte(0x11),
            block_number: 100,
            protocol: Protocol::UniswapV2,
            pool: addr(0xbb),
            token_in: addr(0xaa),
            token_out: addr(0xcc),
            amount_in: U256::from(10).pow(U256::from(18)),
            amount_out: U256::from(1_000),
            sender: addr(0x01),
            recipient: addr(0x01),
            gas_used: 80_000,
            detection: DetectionSource::Hybrid,
            confidence: 0.95,
            call_depth: 1,
            log_index: Some(0),
            call_index: Some(2),
            position: 0,
            is_multi_hop: false,
            hop_count: 1,
        }
    }

    fn sample_result() -> InspectionResult {
        InspectionResult {
            block_number: 100,
            transactions: vec![TransactionInfo {
                hash: B256::repeat_byte(0x11),
                from: addr(0x01),
                to: Some(addr(0xbb)),
                value: U256::ZERO,
                gas_used: 80_000,
                gas_price: 1_000_000_000,
                status: true,
                log_count: 1,
                swap_events_found: 1,
                parsed_swaps: 1,
                method_signature: Some("0x022c0d9f".to_string()),
                event_signatures: vec![B256::repeat_byte(0xd7)],
                error: None,
            }],
            swaps: vec![sample_swap()],
            multi_hop_swaps: Vec::new(),
            arbitrages: Vec::new(),
            sandwiches: Vec::new(),
            whatif_opportunities: Vec::new(),
        }
    }

    #[test]
    fn small_amounts_are_numbers_large_are_strings() {
        assert_eq!(amount(U256::from(1_000)), json!(1_000));
        assert_eq!(amount(U256::from(MAX_SAFE_INTEGER)), json!(9007199254740991u64));
        assert_eq!(
            amount(U256::from(10).pow(U256::from(18))),
            json!("1000000000000000000")
        );
        assert_eq!(amount_i128(-42), json!(-42));
        assert_eq!(
            amount_i128(-10_000_000_000_000_000_000i128),
            json!("-10000000000000000000")
        );
    }

    #[test]
    fn hex_is_lowercase_prefixed() {
        let value = to_json(&sample_result(), ReportMode::Full);
        let tx_hash = value["transactions"][0]["hash"].as_str().unwrap();
        assert_eq!(
            tx_hash,
            "0x1111111111111111111111111111111111111111111111111111111111111111"
        );
        let pool = value["swaps"][0]["pool"].as_str().unwrap();
        assert!(pool.starts_with("0x"));
        assert_eq!(pool, pool.to_lowercase());
    }

    #[test]
    fn basic_mode_omits_transactions_and_swaps() {
        let full = to_json(&sample_result(), ReportMode::Full);
        let basic = to_json(&sample_result(), ReportMode::Basic);
        assert!(full.get("transactions").is_some());
        assert!(full.get("swaps").is_some());
        assert!(basic.get("transactions").is_none());
        assert!(basic.get("swaps").is_none());
        assert_eq!(basic["summary"], full["summary"]);
    }

    #[test]
    fn full_report_is_deterministic() {
        let a = serde_json::to_string(&to_json(&sample_result(), ReportMode::Full)).unwrap();
        let b = serde_json::to_string(&to_json(&sample_result(), ReportMode::Full)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn inspection_result_round_trips_through_serde() {
        let result = sample_result();
        let encoded = serde_json::to_value(&result).unwrap();
        let decoded: InspectionResult = serde_json::from_value(encoded).unwrap();
        assert_eq!(decoded, result);
    }

    #[test]
    fn report_mode_parses() {
        assert_eq!("basic".parse::<ReportMode>().unwrap(), ReportMode::Basic);
        assert_eq!("full".parse::<ReportMode>().unwrap(), ReportMode::Full);
        assert!("verbose".parse::<ReportMode>().is_err());
    }
}
