//! Shared fixtures: a scripted JSON-RPC transport with per-method call
//! counting, and builders for blocks, transactions, receipts and V2 swap
//! logs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use alloy::primitives::{Address, B256, U256};
use futures::future::BoxFuture;
use mev_data::rpc::{RpcClient, RpcConfig, Transport};
use mev_data::{PoolTokenStore, Result};
use mev_inspect::Inspector;
use serde_json::{json, Value};

/// Well-known V2 swap topic.
pub const V2_SWAP_TOPIC: &str =
    "0xd78ad95fa46c994b6551d0da85fc275fe613ce37657fb8d5e3d130840159d822";

pub fn addr(n: u8) -> Address {
    let mut bytes = [0u8; 20];
    bytes[19] = n;
    Address::from(bytes)
}

pub fn tx_hash(n: u8) -> B256 {
    B256::repeat_byte(n)
}

pub fn hex_addr(address: Address) -> String {
    format!("{address:#x}")
}

pub fn hex_hash(hash: B256) -> String {
    format!("{hash:#x}")
}

fn word_hex(value: U256) -> String {
    format!("0x{:064x}", value)
}

fn padded_address(address: Address) -> String {
    format!("0x{:0>64}", alloy::hex::encode(address.as_slice()))
}

/// One transaction plus its receipt, ready to serialize.
#[derive(Clone)]
pub struct TxFixture {
    pub hash: B256,
    pub from: Address,
    pub to: Address,
    pub input: String,
    pub status: bool,
    pub gas_used: u64,
    pub logs: Vec<Value>,
}

impl TxFixture {
    pub fn new(hash: B256, from: Address, to: Address) -> Self {
        Self {
            hash,
            from,
            to,
            input: "0x".to_string(),
            status: true,
            gas_used: 120_000,
            logs: Vec::new(),
        }
    }

    pub fn with_input(mut self, input: &str) -> Self {
        self.input = input.to_string();
        self
    }

    pub fn failed(mut self) -> Self {
        self.status = false;
        self
    }

    pub fn with_log(mut self, log: Value) -> Self {
        self.logs.push(log);
        self
    }
}

/// A V2 `Swap` log: four unsigned words, token0→token1 direction when
/// `amount0_in`/`amount1_out` are set.
pub fn v2_swap_log(
    pool: Address,
    sender: Address,
    recipient: Address,
    amount0_in: U256,
    amount1_in: U256,
    amount0_out: U256,
    amount1_out: U256,
    log_index: u64,
) -> Value {
    let mut data = String::from("0x");
    for amount in [amount0_in, amount1_in, amount0_out, amount1_out] {
        data.push_str(&word_hex(amount)[2..]);
    }
    json!({
        "address": hex_addr(pool),
        "topics": [V2_SWAP_TOPIC, padded_address(sender), padded_address(recipient)],
        "data": data,
        "logIndex": format!("0x{log_index:x}"),
    })
}

/// Scripted chain state served over the mock transport.
#[derive(Default)]
pub struct MockChain {
    pub number: u64,
    pub txs: Vec<TxFixture>,
    /// address → runtime code hex.
    pub codes: HashMap<String, String>,
    /// (address, slot-quantity-hex) → word hex.
    pub storage: HashMap<(String, String), String>,
    /// (to, calldata) → eth_call return hex.
    pub calls: HashMap<(String, String), String>,
}

impl MockChain {
    pub fn new(number: u64) -> Self {
        Self {
            number,
            ..Self::default()
        }
    }

    /// Answer `token0()`/`token1()` for a pool.
    pub fn with_pool_tokens(mut self, pool: Address, token0: Address, token1: Address) -> Self {
        self.calls.insert(
            (hex_addr(pool), "0x0dfe1681".to_string()),
            padded_address(token0),
        );
        self.calls.insert(
            (hex_addr(pool), "0xd21220a7".to_string()),
            padded_address(token1),
        );
        self
    }

    pub fn with_tx(mut self, tx: TxFixture) -> Self {
        self.txs.push(tx);
        self
    }

    fn block_value(&self) -> Value {
        let transactions: Vec<Value> = self
            .txs
            .iter()
            .enumerate()
            .map(|(i, tx)| {
                json!({
                    "hash": hex_hash(tx.hash),
                    "from": hex_addr(tx.from),
                    "to": hex_addr(tx.to),
                    "value": "0x0",
                    "input": tx.input,
                    "gas": "0xf4240",
                    "gasPrice": "0x0",
                    "transactionIndex": format!("0x{i:x}"),
                })
            })
            .collect();
        json!({
            "number": format!("0x{:x}", self.number),
            "hash": hex_hash(B256::repeat_byte(0xb1)),
            "miner": hex_addr(addr(0xfe)),
            "timestamp": "0x65000000",
            "gasLimit": "0x1c9c380",
            "baseFeePerGas": "0x0",
            "mixHash": hex_hash(B256::ZERO),
            "transactions": transactions,
        })
    }

    fn receipt_value(&self, tx: &TxFixture) -> Value {
        json!({
            "transactionHash": hex_hash(tx.hash),
            "status": if tx.status { "0x1" } else { "0x0" },
            "gasUsed": format!("0x{:x}", tx.gas_used),
            "effectiveGasPrice": "0x3b9aca00",
            "logs": tx.logs,
        })
    }
}

/// Transport that serves a `MockChain` and counts every exchange and
/// every JSON-RPC method invocation.
pub struct MockTransport {
    chain: MockChain,
    round_trips: AtomicU64,
    method_counts: Mutex<HashMap<String, u64>>,
}

/// Shared view on the transport's counters, usable after the transport is
/// boxed into the client.
#[derive(Clone)]
pub struct TransportProbe {
    inner: Arc<MockTransport>,
}

impl TransportProbe {
    pub fn round_trips(&self) -> u64 {
        self.inner.round_trips.load(Ordering::Relaxed)
    }

    pub fn method_count(&self, method: &str) -> u64 {
        *self
            .inner
            .method_counts
            .lock()
            .expect("counter lock")
            .get(method)
            .unwrap_or(&0)
    }
}

impl MockTransport {
    pub fn new(chain: MockChain) -> Arc<Self> {
        Arc::new(Self {
            chain,
            round_trips: AtomicU64::new(0),
            method_counts: Mutex::new(HashMap::new()),
        })
    }

    fn answer(&self, entry: &Value) -> Value {
        let method = entry["method"].as_str().unwrap_or_default().to_string();
        *self
            .method_counts
            .lock()
            .expect("counter lock")
            .entry(method.clone())
            .or_default() += 1;

        let params = entry["params"].as_array().cloned().unwrap_or_default();
        let result = match method.as_str() {
            "eth_getBlockByNumber" => self.chain.block_value(),
            "eth_getTransactionReceipt" => {
                let wanted = params.first().and_then(Value::as_str).unwrap_or_default();
                self.chain
                    .txs
                    .iter()
                    .find(|tx| hex_hash(tx.hash) == wanted)
                    .map(|tx| self.chain.receipt_value(tx))
                    .unwrap_or(Value::Null)
            }
            "eth_getCode" => {
                let address = params.first().and_then(Value::as_str).unwrap_or_default();
                Value::String(
                    self.chain
                        .codes
                        .get(address)
                        .cloned()
                        .unwrap_or_else(|| "0x".to_string()),
                )
            }
            "eth_getBalance" => Value::String("0x0".to_string()),
            "eth_getStorageAt" => {
                let address = params.first().and_then(Value::as_str).unwrap_or_default();
                let slot = params.get(1).and_then(Value::as_str).unwrap_or_default();
                Value::String(
                    self.chain
                        .storage
                        .get(&(address.to_string(), slot.to_string()))
                        .cloned()
                        .unwrap_or_else(|| word_hex(U256::ZERO)),
                )
            }
            "eth_call" => {
                let to = params
                    .first()
                    .and_then(|p| p.get("to"))
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                let data = params
                    .first()
                    .and_then(|p| p.get("data"))
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                Value::String(
                    self.chain
                        .calls
                        .get(&(to.to_string(), data.to_string()))
                        .cloned()
                        .unwrap_or_else(|| "0x".to_string()),
                )
            }
            _ => Value::Null,
        };
        json!({"jsonrpc": "2.0", "id": entry["id"], "result": result})
    }
}

/// Local newtype over `Arc<MockTransport>` so `Transport` can be implemented
/// for it despite neither `Transport` nor `Arc` being defined in this crate.
struct SharedTransport(Arc<MockTransport>);

impl Transport for SharedTransport {
    fn send<'a>(&'a self, payload: Value, _timeout: Duration) -> BoxFuture<'a, Result<Value>> {
        self.0.round_trips.fetch_add(1, Ordering::Relaxed);
        let body = match &payload {
            Value::Array(entries) => {
                Value::Array(entries.iter().map(|e| self.0.answer(e)).collect())
            }
            single => self.0.answer(single),
        };
        Box::pin(async move { Ok(body) })
    }
}

/// Inspector over a mock chain plus a probe into the transport counters.
pub fn inspector_for(chain: MockChain) -> (Inspector, TransportProbe) {
    let transport = MockTransport::new(chain);
    let probe = TransportProbe {
        inner: transport.clone(),
    };
    let rpc = Arc::new(RpcClient::new(
        Box::new(SharedTransport(transport)),
        RpcConfig::default(),
    ));
    let pool_store = Arc::new(PoolTokenStore::in_memory().expect("in-memory store"));
    (Inspector::new(rpc, pool_store), probe)
}
