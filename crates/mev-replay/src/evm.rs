//! Transaction replay against pre-block state with REVM.
//!
//! Every transaction executes independently against the block's prior
//! state: a fresh `CacheDB` buffers writes on top of [`StateDb`], which
//! serves reads through the shared state cache (one RPC per missing key,
//! transparent to the EVM). The [`ReplayTracer`] captures internal calls
//! and storage writes in-line.

use std::collections::BTreeSet;
use std::sync::Arc;

use alloy::primitives::{Address, Bytes, B256, U256};
use revm::db::{CacheDB, DatabaseRef};
use revm::primitives::{
    AccountInfo, BlobExcessGasAndPrice, BlockEnv, Bytecode, EVMError, ExecutionResult, TransactTo,
    TxEnv, KECCAK_EMPTY,
};
use revm::{inspector_handle_register, Evm};

use mev_data::cache::StateCache;
use mev_data::types::{BlockHeader, Receipt, Transaction};
use mev_data::{InspectError, Result};

use crate::decoder::{self, topics};
use crate::tracer::{CallKind, InternalCall, ReplayResult, ReplayTracer};

/// Read-only database over the shared state cache. Cache misses fetch on
/// demand; no retry beyond what the RPC facade performs.
pub struct StateDb {
    cache: Arc<StateCache>,
}

impl StateDb {
    pub fn new(cache: Arc<StateCache>) -> Self {
        Self { cache }
    }
}

impl DatabaseRef for StateDb {
    type Error = InspectError;

    fn basic_ref(&self, address: Address) -> Result<Option<AccountInfo>> {
        let account = self.cache.account_blocking(address)?;
        if account.code.is_empty() {
            return Ok(Some(AccountInfo {
                balance: account.balance,
                nonce: 0,
                code_hash: KECCAK_EMPTY,
                code: None,
            }));
        }
        let code = Bytecode::new_raw(account.code.clone());
        Ok(Some(AccountInfo {
            balance: account.balance,
            nonce: 0,
            code_hash: code.hash_slow(),
            code: Some(code),
        }))
    }

    fn code_by_hash_ref(&self, _code_hash: B256) -> Result<Bytecode> {
        // Code always rides on the account info above.
        Ok(Bytecode::new())
    }

    fn storage_ref(&self, address: Address, slot: U256) -> Result<U256> {
        self.cache.storage_blocking(address, slot)
    }

    fn block_hash_ref(&self, _number: u64) -> Result<B256> {
        Ok(B256::ZERO)
    }
}

/// Deterministic re-executor for one block's transactions.
pub struct Replayer {
    cache: Arc<StateCache>,
    block_env: BlockEnv,
}

impl Replayer {
    /// Builds the EVM block environment from the analyzed block's header.
    pub fn new(cache: Arc<StateCache>, header: &BlockHeader) -> Self {
        let block_env = BlockEnv {
            number: U256::from(header.number),
            timestamp: U256::from(header.timestamp),
            gas_limit: U256::from(header.gas_limit),
            basefee: U256::from(header.base_fee_per_gas),
            difficulty: U256::ZERO,
            prevrandao: Some(header.prevrandao),
            coinbase: header.miner,
            blob_excess_gas_and_price: Some(BlobExcessGasAndPrice::new(0, true)),
        };
        Self { cache, block_env }
    }

    pub fn block_env(&self) -> &BlockEnv {
        &self.block_env
    }

    /// Preload the candidate address set (participants, log emitters,
    /// address-shaped indexed topics) and the critical storage slots of any
    /// emitter whose code probes as a known pool type. Best effort: a
    /// failed preload falls through to on-demand reads.
    pub async fn prepare(&self, tx: &Transaction, receipt: &Receipt) -> Result<()> {
        let candidates: Vec<Address> = candidate_addresses(tx, receipt).into_iter().collect();
        self.cache.preload_addresses(&candidates).await?;

        for log in &receipt.logs {
            let Ok(code) = self.cache.get_code(log.address).await else {
                continue;
            };
            let Some(protocol) = decoder::probe_protocol(&code) else {
                continue;
            };
            for slot in decoder::critical_slots(protocol) {
                if let Err(err) = self.cache.get_storage(log.address, U256::from(*slot)).await {
                    tracing::debug!(pool = %log.address, slot, %err, "critical slot preload failed");
                }
            }
        }
        Ok(())
    }

    /// Replay one transaction. EVM reverts are not errors: they come back
    /// as `success = false` with whatever was captured up to the revert.
    /// When the EVM cannot run the transaction at all, a degraded
    /// log-derived result is returned instead; only internal invariant
    /// violations surface as errors.
    pub async fn replay(&self, tx: &Transaction, receipt: &Receipt) -> Result<ReplayResult> {
        self.prepare(tx, receipt).await?;

        match self.execute(Self::tx_env(tx)) {
            Ok((result, tracer)) => Ok(Self::build_result(result, tracer)),
            Err(err @ InspectError::Internal(_)) => Err(err),
            Err(err) => {
                tracing::warn!(tx_hash = %tx.hash, %err, "replay unavailable, using log-derived fallback");
                Ok(Self::replay_from_logs(tx, receipt))
            }
        }
    }

    fn execute(&self, tx_env: TxEnv) -> Result<(ExecutionResult, ReplayTracer)> {
        let cache_db = CacheDB::new(StateDb::new(self.cache.clone()));
        let mut tracer = ReplayTracer::new();

        let outcome = {
            let mut evm = Evm::builder()
                .with_db(cache_db)
                .with_external_context(&mut tracer)
                .append_handler_register(inspector_handle_register)
                .modify_block_env(|block| *block = self.block_env.clone())
                .modify_tx_env(|env| *env = tx_env)
                .build();
            evm.transact()
        };

        match outcome {
            Ok(result_and_state) => Ok((result_and_state.result, tracer)),
            Err(err) => Err(map_evm_error(err)),
        }
    }

    /// Mirrors the transaction envelope into REVM. Nonce checks are
    /// disabled; the core does not track nonces.
    fn tx_env(tx: &Transaction) -> TxEnv {
        TxEnv {
            caller: tx.from,
            transact_to: tx.to.map_or(TransactTo::Create, TransactTo::Call),
            value: tx.value,
            data: tx.input.clone(),
            gas_limit: tx.gas_limit,
            gas_price: U256::from(tx.gas_price),
            gas_priority_fee: None,
            nonce: None,
            access_list: Vec::new(),
            chain_id: None,
            blob_hashes: Vec::new(),
            max_fee_per_blob_gas: None,
            authorization_list: None,
        }
    }

    fn build_result(result: ExecutionResult, tracer: ReplayTracer) -> ReplayResult {
        let (internal_calls, state_changes) = tracer.into_parts();
        match result {
            ExecutionResult::Success {
                gas_used, output, ..
            } => ReplayResult {
                success: true,
                gas_used,
                output: output.into_data(),
                internal_calls,
                state_changes,
                error: None,
            },
            ExecutionResult::Revert { gas_used, output } => {
                let error = Some(revert_reason(&output));
                ReplayResult {
                    success: false,
                    gas_used,
                    output,
                    internal_calls,
                    state_changes,
                    error,
                }
            }
            ExecutionResult::Halt { reason, gas_used } => ReplayResult {
                success: false,
                gas_used,
                output: Bytes::new(),
                internal_calls,
                state_changes,
                error: Some(format!("halt: {reason:?}")),
            },
        }
    }

    /// Degraded fallback when the EVM cannot execute: one synthetic
    /// internal call per `Transfer` event at depth 1, no state changes.
    /// Detectors fall through to their log-only paths.
    pub fn replay_from_logs(tx: &Transaction, receipt: &Receipt) -> ReplayResult {
        let internal_calls: Vec<InternalCall> = receipt
            .logs
            .iter()
            .filter(|log| log.topic0() == Some(topics::ERC20_TRANSFER))
            .map(|log| InternalCall {
                kind: CallKind::Call,
                from: tx.from,
                to: log.address,
                input: Bytes::new(),
                output: Bytes::new(),
                value: U256::ZERO,
                gas_used: 0,
                success: true,
                depth: 1,
            })
            .collect();

        ReplayResult {
            success: receipt.status,
            gas_used: receipt.gas_used,
            output: Bytes::new(),
            internal_calls,
            state_changes: Vec::new(),
            error: (!receipt.status).then(|| "transaction reverted".to_string()),
        }
    }
}

fn candidate_addresses(tx: &Transaction, receipt: &Receipt) -> BTreeSet<Address> {
    let mut set = BTreeSet::new();
    set.insert(tx.from);
    if let Some(to) = tx.to {
        set.insert(to);
    }
    for log in &receipt.logs {
        set.insert(log.address);
        for topic in log.topics.iter().skip(1) {
            if let Some(address) = decoder::address_from_word(U256::from_be_bytes(topic.0)) {
                set.insert(address);
            }
        }
    }
    set
}

fn map_evm_error(err: EVMError<InspectError>) -> InspectError {
    match err {
        EVMError::Database(inner) => inner,
        EVMError::Transaction(e) => InspectError::StateUnavailable(format!("invalid transaction: {e}")),
        EVMError::Header(e) => InspectError::Internal(format!("invalid block env: {e}")),
        EVMError::Custom(message) => InspectError::Internal(message),
        EVMError::Precompile(message) => InspectError::Internal(message),
    }
}

/// Decode a Solidity `Error(string)` revert payload when present.
fn revert_reason(output: &Bytes) -> String {
    const ERROR_SELECTOR: [u8; 4] = [0x08, 0xc3, 0x79, 0xa0];
    if output.len() >= 68 && output[..4] == ERROR_SELECTOR {
        let length_word = U256::from_be_slice(&output[36..68]);
        if length_word <= U256::from(output.len() - 68) {
            let length = length_word.to::<usize>();
            return String::from_utf8_lossy(&output[68..68 + length]).into_owned();
        }
    }
    if output.is_empty() {
        "execution reverted".to_string()
    } else {
        format!("execution reverted: {output}")
    }
}
