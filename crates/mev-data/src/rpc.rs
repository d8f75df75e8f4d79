//! JSON-RPC 2.0 facade over HTTP with array batching.
//!
//! Hides transport, JSON encoding, and batch construction behind typed
//! methods. Hex is decoded here, once; callers only ever see `Address`,
//! `B256`, `U256`, and `Bytes`. Batch methods fall back to serial single
//! calls when the endpoint rejects array requests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use alloy::primitives::{Address, Bytes, B256, U256};
use futures::future::BoxFuture;
use serde_json::{json, Value};

use crate::error::{InspectError, Result};
use crate::types::{AccountSnapshot, BlockHeader, LogRecord, Receipt, Transaction};

/// `token0()` selector.
const TOKEN0_CALLDATA: &str = "0x0dfe1681";
/// `token1()` selector.
const TOKEN1_CALLDATA: &str = "0xd21220a7";

/// One HTTP exchange with the endpoint. The payload is either a single
/// JSON-RPC object or an array batch; the return value is the parsed body.
pub trait Transport: Send + Sync {
    fn send<'a>(&'a self, payload: Value, timeout: Duration) -> BoxFuture<'a, Result<Value>>;
}

/// Production transport backed by reqwest.
pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
}

impl HttpTransport {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| InspectError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

impl Transport for HttpTransport {
    fn send<'a>(&'a self, payload: Value, timeout: Duration) -> BoxFuture<'a, Result<Value>> {
        Box::pin(async move {
            let response = self
                .client
                .post(&self.url)
                .json(&payload)
                .timeout(timeout)
                .send()
                .await
                .map_err(|e| InspectError::Transport(e.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                return Err(InspectError::Transport(format!("http status {status}")));
            }

            response
                .json::<Value>()
                .await
                .map_err(|e| InspectError::Transport(format!("body parse: {e}")))
        })
    }
}

/// Retry and pacing knobs for the facade.
#[derive(Clone, Debug)]
pub struct RpcConfig {
    /// Total attempts per logical request.
    pub max_retries: u32,
    /// Base backoff; doubles per attempt.
    pub backoff_ms: u64,
    /// Optional fixed delay before every call, for rate-limited endpoints.
    pub call_delay_ms: u64,
    /// Timeout for single-object requests.
    pub single_call_timeout: Duration,
    /// Timeout for array batches.
    pub batch_timeout: Duration,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_ms: 500,
            call_delay_ms: 0,
            single_call_timeout: Duration::from_secs(30),
            batch_timeout: Duration::from_secs(60),
        }
    }
}

/// Blocking-style facade: every method suspends until the endpoint answers
/// or the retry budget is exhausted. The facade never invents data; RPC
/// errors surface to the caller.
pub struct RpcClient {
    transport: Box<dyn Transport>,
    config: RpcConfig,
    next_id: AtomicU64,
    round_trips: AtomicU64,
}

impl RpcClient {
    pub fn new(transport: Box<dyn Transport>, config: RpcConfig) -> Self {
        Self {
            transport,
            config,
            next_id: AtomicU64::new(1),
            round_trips: AtomicU64::new(0),
        }
    }

    /// Convenience constructor for an HTTP endpoint.
    pub fn http(url: impl Into<String>, config: RpcConfig) -> Result<Self> {
        Ok(Self::new(Box::new(HttpTransport::new(url)?), config))
    }

    /// HTTP exchanges performed so far (including retries).
    pub fn round_trips(&self) -> u64 {
        self.round_trips.load(Ordering::Relaxed)
    }

    async fn pace(&self) {
        if self.config.call_delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.config.call_delay_ms)).await;
        }
    }

    async fn send_raw(&self, payload: Value, timeout: Duration) -> Result<Value> {
        self.pace().await;
        self.round_trips.fetch_add(1, Ordering::Relaxed);
        self.transport.send(payload, timeout).await
    }

    /// One JSON-RPC call with bounded retry and exponential backoff on
    /// retryable failures (transport errors and "limit exceeded").
    pub async fn request(&self, method: &str, params: Value) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let payload = json!({"jsonrpc": "2.0", "method": method, "params": params, "id": id});
        let attempts = self.config.max_retries.max(1);

        let mut attempt = 0;
        loop {
            let outcome = match self
                .send_raw(payload.clone(), self.config.single_call_timeout)
                .await
            {
                Ok(body) => extract_result(&body),
                Err(err) => Err(err),
            };

            match outcome {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt + 1 < attempts => {
                    let backoff = self.config.backoff_ms * 2u64.pow(attempt);
                    tracing::debug!(method, attempt = attempt + 1, backoff_ms = backoff, %err, "retrying rpc call");
                    tokio::time::sleep(Duration::from_millis(backoff)).await;
                    attempt += 1;
                }
                Err(InspectError::Transport(message)) => {
                    return Err(InspectError::RpcUnavailable {
                        attempts: attempt + 1,
                        message,
                    })
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// One JSON-RPC array batch. Returns per-entry outcomes in request
    /// order. Falls back to serial single calls when the endpoint rejects
    /// the array form.
    pub async fn request_batch(&self, calls: &[(&str, Value)]) -> Result<Vec<Result<Value>>> {
        if calls.is_empty() {
            return Ok(Vec::new());
        }

        let entries: Vec<Value> = calls
            .iter()
            .enumerate()
            .map(|(i, (method, params))| {
                json!({"jsonrpc": "2.0", "method": method, "params": params, "id": i as u64})
            })
            .collect();

        match self
            .send_raw(Value::Array(entries), self.config.batch_timeout)
            .await
        {
            Ok(Value::Array(responses)) => {
                let mut by_id: HashMap<u64, Result<Value>> = HashMap::with_capacity(responses.len());
                for response in &responses {
                    let Some(id) = response.get("id").and_then(Value::as_u64) else {
                        continue;
                    };
                    by_id.insert(id, extract_result(response));
                }
                Ok((0..calls.len() as u64)
                    .map(|i| {
                        by_id.remove(&i).unwrap_or_else(|| {
                            Err(InspectError::decode("batch", format!("missing response id {i}")))
                        })
                    })
                    .collect())
            }
            other => {
                if let Err(err) = &other {
                    tracing::debug!(%err, "batch request failed, falling back to serial calls");
                } else {
                    tracing::debug!("endpoint rejected array batch, falling back to serial calls");
                }
                let mut results = Vec::with_capacity(calls.len());
                for (method, params) in calls {
                    results.push(self.request(method, params.clone()).await);
                }
                Ok(results)
            }
        }
    }

    /// Block metadata plus transaction envelopes (`full_txs = true`) or just
    /// the metadata.
    pub async fn get_block(
        &self,
        number: u64,
        full_txs: bool,
    ) -> Result<(BlockHeader, Vec<Transaction>)> {
        let result = self
            .request("eth_getBlockByNumber", json!([quantity(number), full_txs]))
            .await?;
        if result.is_null() {
            return Err(InspectError::StateUnavailable(format!(
                "block {number} not found"
            )));
        }

        let header = parse_header(&result)?;
        let mut txs = Vec::new();
        if full_txs {
            let list = field(&result, "transactions", "eth_getBlockByNumber")?
                .as_array()
                .ok_or_else(|| {
                    InspectError::decode("eth_getBlockByNumber", "transactions is not an array")
                })?;
            for (i, tx) in list.iter().enumerate() {
                txs.push(parse_transaction(tx, i as u32)?);
            }
        }
        Ok((header, txs))
    }

    pub async fn get_transaction(&self, hash: B256) -> Result<Transaction> {
        let result = self
            .request("eth_getTransactionByHash", json!([hex(&hash)]))
            .await?;
        if result.is_null() {
            return Err(InspectError::StateUnavailable(format!(
                "transaction {hash} not found"
            )));
        }
        parse_transaction(&result, 0)
    }

    pub async fn get_receipt(&self, hash: B256) -> Result<Receipt> {
        let result = self
            .request("eth_getTransactionReceipt", json!([hex(&hash)]))
            .await?;
        if result.is_null() {
            return Err(InspectError::StateUnavailable(format!(
                "receipt {hash} not found"
            )));
        }
        parse_receipt(&result)
    }

    pub async fn get_code(&self, address: Address, block: u64) -> Result<Bytes> {
        let result = self
            .request("eth_getCode", json!([hex(&address), quantity(block)]))
            .await?;
        parse_bytes(&result, "eth_getCode")
    }

    pub async fn get_balance(&self, address: Address, block: u64) -> Result<U256> {
        let result = self
            .request("eth_getBalance", json!([hex(&address), quantity(block)]))
            .await?;
        parse_u256(&result, "eth_getBalance")
    }

    pub async fn get_storage(&self, address: Address, slot: U256, block: u64) -> Result<U256> {
        let result = self
            .request(
                "eth_getStorageAt",
                json!([hex(&address), format!("0x{slot:x}"), quantity(block)]),
            )
            .await?;
        parse_u256(&result, "eth_getStorageAt")
    }

    /// Historical `eth_call`.
    pub async fn call(&self, to: Address, calldata: &Bytes, block: u64) -> Result<Bytes> {
        let result = self
            .request(
                "eth_call",
                json!([{"to": hex(&to), "data": calldata.to_string()}, quantity(block)]),
            )
            .await?;
        parse_bytes(&result, "eth_call")
    }

    /// All receipts for the given hashes in one array batch. Hashes with a
    /// null result are omitted from the map.
    pub async fn batch_receipts(&self, hashes: &[B256]) -> Result<HashMap<B256, Receipt>> {
        let params: Vec<Value> = hashes.iter().map(|h| json!([hex(h)])).collect();
        let calls: Vec<(&str, Value)> = params
            .into_iter()
            .map(|p| ("eth_getTransactionReceipt", p))
            .collect();

        let mut receipts = HashMap::with_capacity(hashes.len());
        for (hash, outcome) in hashes.iter().zip(self.request_batch(&calls).await?) {
            match outcome {
                Ok(Value::Null) => {
                    tracing::warn!(tx_hash = %hash, "receipt not found");
                }
                Ok(value) => {
                    receipts.insert(*hash, parse_receipt(&value)?);
                }
                Err(err) => {
                    tracing::warn!(tx_hash = %hash, %err, "receipt fetch failed in batch");
                }
            }
        }
        Ok(receipts)
    }

    /// Contract code for every address in one array batch.
    pub async fn batch_code(
        &self,
        addresses: &[Address],
        block: u64,
    ) -> Result<HashMap<Address, Bytes>> {
        let params: Vec<Value> = addresses
            .iter()
            .map(|a| json!([hex(a), quantity(block)]))
            .collect();
        let calls: Vec<(&str, Value)> = params.into_iter().map(|p| ("eth_getCode", p)).collect();

        let mut codes = HashMap::with_capacity(addresses.len());
        for (address, outcome) in addresses.iter().zip(self.request_batch(&calls).await?) {
            match outcome {
                Ok(value) => {
                    codes.insert(*address, parse_bytes(&value, "eth_getCode")?);
                }
                Err(err) => {
                    tracing::warn!(%address, %err, "code fetch failed in batch");
                }
            }
        }
        Ok(codes)
    }

    /// Code and balance for every address, folded into a single array batch
    /// so block seeding stays one round trip.
    pub async fn batch_accounts(
        &self,
        addresses: &[Address],
        block: u64,
    ) -> Result<HashMap<Address, AccountSnapshot>> {
        let mut calls: Vec<(&str, Value)> = Vec::with_capacity(addresses.len() * 2);
        for address in addresses {
            calls.push(("eth_getCode", json!([hex(address), quantity(block)])));
            calls.push(("eth_getBalance", json!([hex(address), quantity(block)])));
        }

        let outcomes = self.request_batch(&calls).await?;
        let mut accounts = HashMap::with_capacity(addresses.len());
        for (i, address) in addresses.iter().enumerate() {
            let code = outcomes[i * 2]
                .as_ref()
                .ok()
                .and_then(|v| parse_bytes(v, "eth_getCode").ok());
            let balance = outcomes[i * 2 + 1]
                .as_ref()
                .ok()
                .and_then(|v| parse_u256(v, "eth_getBalance").ok());
            match (code, balance) {
                (Some(code), Some(balance)) => {
                    accounts.insert(*address, AccountSnapshot { balance, code });
                }
                _ => tracing::warn!(%address, "account fetch failed in batch"),
            }
        }
        Ok(accounts)
    }

    /// `token0()`/`token1()` for every pool, emitted as one JSON-RPC array.
    /// Pools whose calls return empty data are omitted.
    pub async fn batch_pool_tokens(
        &self,
        pools: &[Address],
        block: u64,
    ) -> Result<HashMap<Address, (Address, Address)>> {
        let mut calls: Vec<(&str, Value)> = Vec::with_capacity(pools.len() * 2);
        for pool in pools {
            calls.push((
                "eth_call",
                json!([{"to": hex(pool), "data": TOKEN0_CALLDATA}, quantity(block)]),
            ));
            calls.push((
                "eth_call",
                json!([{"to": hex(pool), "data": TOKEN1_CALLDATA}, quantity(block)]),
            ));
        }

        let outcomes = self.request_batch(&calls).await?;
        let mut tokens = HashMap::with_capacity(pools.len());
        for (i, pool) in pools.iter().enumerate() {
            let token0 = outcomes[i * 2].as_ref().ok().and_then(address_from_return);
            let token1 = outcomes[i * 2 + 1].as_ref().ok().and_then(address_from_return);
            match (token0, token1) {
                (Some(token0), Some(token1)) => {
                    tokens.insert(*pool, (token0, token1));
                }
                _ => tracing::debug!(pool = %pool, "pool did not answer token0/token1"),
            }
        }
        Ok(tokens)
    }
}

fn quantity(n: u64) -> String {
    format!("0x{n:x}")
}

fn hex<T: std::fmt::LowerHex>(value: &T) -> String {
    format!("{value:#x}")
}

/// Pull `result` out of one response object, mapping JSON-RPC error objects
/// to the taxonomy.
fn extract_result(body: &Value) -> Result<Value> {
    if let Some(error) = body.get("error") {
        let code = error.get("code").and_then(Value::as_i64).unwrap_or(0);
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown rpc error")
            .to_string();
        return Err(InspectError::RpcError { code, message });
    }
    match body.get("result") {
        Some(result) => Ok(result.clone()),
        None => Err(InspectError::Transport("response without result".into())),
    }
}

fn field<'a>(value: &'a Value, name: &str, location: &'static str) -> Result<&'a Value> {
    value
        .get(name)
        .ok_or_else(|| InspectError::decode(location, format!("missing field `{name}`")))
}

fn parse_u64(value: &Value, location: &'static str) -> Result<u64> {
    let s = value
        .as_str()
        .ok_or_else(|| InspectError::decode(location, "quantity is not a string"))?;
    u64::from_str_radix(s.trim_start_matches("0x"), 16)
        .map_err(|e| InspectError::decode(location, format!("bad quantity {s:?}: {e}")))
}

fn parse_u128(value: &Value, location: &'static str) -> Result<u128> {
    let s = value
        .as_str()
        .ok_or_else(|| InspectError::decode(location, "quantity is not a string"))?;
    u128::from_str_radix(s.trim_start_matches("0x"), 16)
        .map_err(|e| InspectError::decode(location, format!("bad quantity {s:?}: {e}")))
}

fn parse_u256(value: &Value, location: &'static str) -> Result<U256> {
    let s = value
        .as_str()
        .ok_or_else(|| InspectError::decode(location, "word is not a string"))?;
    let digits = s.trim_start_matches("0x");
    if digits.is_empty() {
        return Ok(U256::ZERO);
    }
    U256::from_str_radix(digits, 16)
        .map_err(|e| InspectError::decode(location, format!("bad word {s:?}: {e}")))
}

fn parse_address(value: &Value, location: &'static str) -> Result<Address> {
    let s = value
        .as_str()
        .ok_or_else(|| InspectError::decode(location, "address is not a string"))?;
    s.parse::<Address>()
        .map_err(|e| InspectError::decode(location, format!("bad address {s:?}: {e}")))
}

fn parse_b256(value: &Value, location: &'static str) -> Result<B256> {
    let s = value
        .as_str()
        .ok_or_else(|| InspectError::decode(location, "hash is not a string"))?;
    s.parse::<B256>()
        .map_err(|e| InspectError::decode(location, format!("bad hash {s:?}: {e}")))
}

fn parse_bytes(value: &Value, location: &'static str) -> Result<Bytes> {
    let s = value
        .as_str()
        .ok_or_else(|| InspectError::decode(location, "data is not a string"))?;
    alloy::hex::decode(s)
        .map(Bytes::from)
        .map_err(|e| InspectError::decode(location, format!("bad hex data: {e}")))
}

/// Decode the 20-byte address padded into a 32-byte `eth_call` return.
fn address_from_return(value: &Value) -> Option<Address> {
    let raw = value.as_str()?;
    let bytes = alloy::hex::decode(raw).ok()?;
    if bytes.len() < 32 {
        return None;
    }
    Some(Address::from_slice(&bytes[12..32]))
}

fn parse_header(value: &Value) -> Result<BlockHeader> {
    const LOC: &str = "eth_getBlockByNumber";
    Ok(BlockHeader {
        number: parse_u64(field(value, "number", LOC)?, LOC)?,
        hash: parse_b256(field(value, "hash", LOC)?, LOC)?,
        miner: parse_address(field(value, "miner", LOC)?, LOC)?,
        timestamp: parse_u64(field(value, "timestamp", LOC)?, LOC)?,
        gas_limit: parse_u64(field(value, "gasLimit", LOC)?, LOC)?,
        base_fee_per_gas: match value.get("baseFeePerGas") {
            Some(v) if !v.is_null() => parse_u128(v, LOC)?,
            _ => 0,
        },
        prevrandao: match value.get("mixHash") {
            Some(v) if !v.is_null() => parse_b256(v, LOC)?,
            _ => B256::ZERO,
        },
    })
}

fn parse_transaction(value: &Value, fallback_position: u32) -> Result<Transaction> {
    const LOC: &str = "transaction";
    let to = match value.get("to") {
        Some(v) if !v.is_null() => Some(parse_address(v, LOC)?),
        _ => None,
    };
    let gas_price = match value.get("gasPrice") {
        Some(v) if !v.is_null() => parse_u128(v, LOC)?,
        _ => match value.get("maxFeePerGas") {
            Some(v) if !v.is_null() => parse_u128(v, LOC)?,
            _ => 0,
        },
    };
    let position = match value.get("transactionIndex") {
        Some(v) if !v.is_null() => parse_u64(v, LOC)? as u32,
        _ => fallback_position,
    };
    Ok(Transaction {
        hash: parse_b256(field(value, "hash", LOC)?, LOC)?,
        from: parse_address(field(value, "from", LOC)?, LOC)?,
        to,
        value: parse_u256(field(value, "value", LOC)?, LOC)?,
        input: parse_bytes(field(value, "input", LOC)?, LOC)?,
        gas_limit: parse_u64(field(value, "gas", LOC)?, LOC)?,
        gas_price,
        position,
    })
}

fn parse_receipt(value: &Value) -> Result<Receipt> {
    const LOC: &str = "receipt";
    let logs_value = field(value, "logs", LOC)?
        .as_array()
        .ok_or_else(|| InspectError::decode(LOC, "logs is not an array"))?;

    let mut logs = Vec::with_capacity(logs_value.len());
    for (i, log) in logs_value.iter().enumerate() {
        let topics_value = field(log, "topics", LOC)?
            .as_array()
            .ok_or_else(|| InspectError::decode(LOC, "topics is not an array"))?;
        let mut topics = Vec::with_capacity(topics_value.len());
        for topic in topics_value {
            topics.push(parse_b256(topic, LOC)?);
        }
        let index = match log.get("logIndex") {
            Some(v) if !v.is_null() => parse_u64(v, LOC)?,
            _ => i as u64,
        };
        logs.push(LogRecord {
            address: parse_address(field(log, "address", LOC)?, LOC)?,
            topics,
            data: parse_bytes(field(log, "data", LOC)?, LOC)?,
            index,
        });
    }

    let effective_gas_price = match value.get("effectiveGasPrice") {
        Some(v) if !v.is_null() => parse_u128(v, LOC)?,
        _ => 0,
    };

    Ok(Receipt {
        tx_hash: parse_b256(field(value, "transactionHash", LOC)?, LOC)?,
        status: parse_u64(field(value, "status", LOC)?, LOC)? == 1,
        gas_used: parse_u64(field(value, "gasUsed", LOC)?, LOC)?,
        effective_gas_price,
        logs,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Transport that replays a scripted sequence of outcomes.
    struct ScriptTransport {
        outcomes: Mutex<VecDeque<Result<Value>>>,
        calls: AtomicU64,
    }

    impl ScriptTransport {
        fn new(outcomes: Vec<Result<Value>>) -> Self {
            Self {
                outcomes: Mutex::new(outcomes.into()),
                calls: AtomicU64::new(0),
            }
        }
    }

    impl Transport for ScriptTransport {
        fn send<'a>(&'a self, _payload: Value, _timeout: Duration) -> BoxFuture<'a, Result<Value>> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            let next = self
                .outcomes
                .lock()
                .expect("script lock")
                .pop_front()
                .unwrap_or_else(|| Err(InspectError::Transport("script exhausted".into())));
            Box::pin(async move { next })
        }
    }

    fn fast_config() -> RpcConfig {
        RpcConfig {
            backoff_ms: 1,
            ..RpcConfig::default()
        }
    }

    fn ok_response(result: Value) -> Value {
        json!({"jsonrpc": "2.0", "id": 1, "result": result})
    }

    #[tokio::test]
    async fn retries_transport_errors_then_succeeds() {
        let transport = ScriptTransport::new(vec![
            Err(InspectError::Transport("connection reset".into())),
            Ok(ok_response(json!("0x1"))),
        ]);
        let client = RpcClient::new(Box::new(transport), fast_config());
        let result = client.request("eth_chainId", json!([])).await.unwrap();
        assert_eq!(result, json!("0x1"));
        assert_eq!(client.round_trips(), 2);
    }

    #[tokio::test]
    async fn exhausted_retries_surface_rpc_unavailable() {
        let transport = ScriptTransport::new(vec![
            Err(InspectError::Transport("down".into())),
            Err(InspectError::Transport("down".into())),
            Err(InspectError::Transport("down".into())),
        ]);
        let client = RpcClient::new(Box::new(transport), fast_config());
        let err = client.request("eth_chainId", json!([])).await.unwrap_err();
        match err {
            InspectError::RpcUnavailable { attempts, .. } => assert_eq!(attempts, 3),
            other => panic!("expected RpcUnavailable, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn rpc_errors_are_not_retried() {
        let transport = ScriptTransport::new(vec![Ok(
            json!({"jsonrpc": "2.0", "id": 1, "error": {"code": -32602, "message": "invalid params"}}),
        )]);
        let client = RpcClient::new(Box::new(transport), fast_config());
        let err = client.request("eth_call", json!([])).await.unwrap_err();
        match err {
            InspectError::RpcError { code, .. } => assert_eq!(code, -32602),
            other => panic!("expected RpcError, got {other:?}"),
        }
        assert_eq!(client.round_trips(), 1);
    }

    #[tokio::test]
    async fn limit_exceeded_is_retried() {
        let transport = ScriptTransport::new(vec![
            Ok(json!({"jsonrpc": "2.0", "id": 1, "error": {"code": -32005, "message": "limit exceeded"}})),
            Ok(ok_response(json!("0x2"))),
        ]);
        let client = RpcClient::new(Box::new(transport), fast_config());
        let result = client.request("eth_chainId", json!([])).await.unwrap();
        assert_eq!(result, json!("0x2"));
        assert_eq!(client.round_trips(), 2);
    }

    #[tokio::test]
    async fn batch_correlates_out_of_order_responses() {
        let transport = ScriptTransport::new(vec![Ok(json!([
            {"jsonrpc": "2.0", "id": 1, "result": "0xb"},
            {"jsonrpc": "2.0", "id": 0, "result": "0xa"},
        ]))]);
        let client = RpcClient::new(Box::new(transport), fast_config());
        let calls = vec![("eth_getCode", json!([])), ("eth_getCode", json!([]))];
        let outcomes = client.request_batch(&calls).await.unwrap();
        assert_eq!(outcomes[0].as_ref().unwrap(), &json!("0xa"));
        assert_eq!(outcomes[1].as_ref().unwrap(), &json!("0xb"));
        assert_eq!(client.round_trips(), 1);
    }

    #[tokio::test]
    async fn batch_rejection_falls_back_to_serial() {
        // A non-array body means the endpoint does not support batches.
        let transport = ScriptTransport::new(vec![
            Ok(json!({"jsonrpc": "2.0", "id": 0, "error": {"code": -32600, "message": "batch not supported"}})),
            Ok(ok_response(json!("0xa"))),
            Ok(ok_response(json!("0xb"))),
        ]);
        let client = RpcClient::new(Box::new(transport), fast_config());
        let calls = vec![("eth_getCode", json!([])), ("eth_getCode", json!([]))];
        let outcomes = client.request_batch(&calls).await.unwrap();
        assert_eq!(outcomes[0].as_ref().unwrap(), &json!("0xa"));
        assert_eq!(outcomes[1].as_ref().unwrap(), &json!("0xb"));
        assert_eq!(client.round_trips(), 3);
    }

    #[tokio::test]
    async fn pool_token_batch_decodes_padded_addresses() {
        let pool: Address = "0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb"
            .parse()
            .unwrap();
        let transport = ScriptTransport::new(vec![Ok(json!([
            {"jsonrpc": "2.0", "id": 0, "result": "0x000000000000000000000000aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"},
            {"jsonrpc": "2.0", "id": 1, "result": "0x000000000000000000000000cccccccccccccccccccccccccccccccccccccccc"},
        ]))]);
        let client = RpcClient::new(Box::new(transport), fast_config());
        let tokens = client.batch_pool_tokens(&[pool], 100).await.unwrap();
        let (token0, token1) = tokens[&pool];
        assert_eq!(
            token0,
            "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"
                .parse::<Address>()
                .unwrap()
        );
        assert_eq!(
            token1,
            "0xcccccccccccccccccccccccccccccccccccccccc"
                .parse::<Address>()
                .unwrap()
        );
    }

    #[tokio::test]
    async fn empty_pool_token_returns_are_skipped() {
        let pool: Address = "0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb"
            .parse()
            .unwrap();
        let transport = ScriptTransport::new(vec![Ok(json!([
            {"jsonrpc": "2.0", "id": 0, "result": "0x"},
            {"jsonrpc": "2.0", "id": 1, "result": "0x"},
        ]))]);
        let client = RpcClient::new(Box::new(transport), fast_config());
        let tokens = client.batch_pool_tokens(&[pool], 100).await.unwrap();
        assert!(tokens.is_empty());
    }

    #[test]
    fn receipt_parsing_reads_status_and_logs() {
        let value = json!({
            "transactionHash": "0x00000000000000000000000000000000000000000000000000000000000000aa",
            "status": "0x1",
            "gasUsed": "0x5208",
            "effectiveGasPrice": "0x3b9aca00",
            "logs": [{
                "address": "0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb",
                "topics": ["0xd78ad95fa46c994b6551d0da85fc275fe613ce37657fb8d5e3d130840159d822"],
                "data": "0x",
                "logIndex": "0x0"
            }]
        });
        let receipt = parse_receipt(&value).unwrap();
        assert!(receipt.status);
        assert_eq!(receipt.gas_used, 21_000);
        assert_eq!(receipt.effective_gas_price, 1_000_000_000);
        assert_eq!(receipt.logs.len(), 1);
        assert_eq!(receipt.gas_cost_wei(), 21_000 * 1_000_000_000);
    }

    #[test]
    fn malformed_hex_is_a_decode_error() {
        let err = parse_u64(&json!("0xzz"), "test").unwrap_err();
        assert!(matches!(err, InspectError::Decode { .. }));
    }
}
