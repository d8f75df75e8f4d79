//! Bounded state caches for one block run.
//!
//! Three LRUs (account, storage, code) front the RPC facade so that every
//! missing key costs exactly one RPC and every repeat read is free. All
//! reads are pinned to the block number the cache was built for. The
//! persistent pool-token store rides along so decoders can resolve tokens
//! without knowing where they come from.

use std::collections::BTreeSet;
use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use alloy::primitives::{Address, Bytes, U256};
use lru::LruCache;

use crate::error::{InspectError, Result};
use crate::pool_store::PoolTokenStore;
use crate::rpc::RpcClient;
use crate::types::AccountSnapshot;

/// Capacity knobs, spec defaults.
#[derive(Clone, Copy, Debug)]
pub struct CacheSizes {
    pub account: usize,
    pub storage: usize,
    pub code: usize,
}

impl Default for CacheSizes {
    fn default() -> Self {
        Self {
            account: 5_000,
            storage: 20_000,
            code: 1_000,
        }
    }
}

/// Hit/miss snapshot across all three caches.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub account_hits: u64,
    pub account_misses: u64,
    pub storage_hits: u64,
    pub storage_misses: u64,
    pub code_hits: u64,
    pub code_misses: u64,
}

#[derive(Default)]
struct Counters {
    account_hits: AtomicU64,
    account_misses: AtomicU64,
    storage_hits: AtomicU64,
    storage_misses: AtomicU64,
    code_hits: AtomicU64,
    code_misses: AtomicU64,
}

/// On-demand, bounded state cache shared by every replay of a block.
pub struct StateCache {
    rpc: Arc<RpcClient>,
    pool_store: Arc<PoolTokenStore>,
    block_number: u64,
    accounts: Mutex<LruCache<Address, AccountSnapshot>>,
    storage: Mutex<LruCache<(Address, U256), U256>>,
    code: Mutex<LruCache<Address, Bytes>>,
    counters: Counters,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn capacity(n: usize) -> NonZeroUsize {
    NonZeroUsize::new(n.max(1)).expect("max(1) is non-zero")
}

impl StateCache {
    pub fn new(
        rpc: Arc<RpcClient>,
        pool_store: Arc<PoolTokenStore>,
        block_number: u64,
        sizes: CacheSizes,
    ) -> Self {
        Self {
            rpc,
            pool_store,
            block_number,
            accounts: Mutex::new(LruCache::new(capacity(sizes.account))),
            storage: Mutex::new(LruCache::new(capacity(sizes.storage))),
            code: Mutex::new(LruCache::new(capacity(sizes.code))),
            counters: Counters::default(),
        }
    }

    /// Block number all reads are pinned to (the analyzed block; storage
    /// reads observe pre-block state by construction of the replay).
    pub fn block_number(&self) -> u64 {
        self.block_number
    }

    pub fn pool_store(&self) -> &Arc<PoolTokenStore> {
        &self.pool_store
    }

    /// Balance + code for an address. One balance RPC (and at most one code
    /// RPC) per address for the whole run.
    pub async fn get_account(&self, address: Address) -> Result<AccountSnapshot> {
        if let Some(account) = lock(&self.accounts).get(&address).cloned() {
            self.counters.account_hits.fetch_add(1, Ordering::Relaxed);
            return Ok(account);
        }
        self.counters.account_misses.fetch_add(1, Ordering::Relaxed);

        let balance = self.rpc.get_balance(address, self.block_number).await?;
        let code = self.get_code(address).await?;
        let account = AccountSnapshot { balance, code };
        lock(&self.accounts).put(address, account.clone());
        Ok(account)
    }

    pub async fn get_code(&self, address: Address) -> Result<Bytes> {
        if let Some(code) = lock(&self.code).get(&address).cloned() {
            self.counters.code_hits.fetch_add(1, Ordering::Relaxed);
            return Ok(code);
        }
        self.counters.code_misses.fetch_add(1, Ordering::Relaxed);

        let code = self.rpc.get_code(address, self.block_number).await?;
        lock(&self.code).put(address, code.clone());
        Ok(code)
    }

    /// One storage word at the configured block. A miss issues exactly one
    /// RPC; the caller never sees the difference.
    pub async fn get_storage(&self, address: Address, slot: U256) -> Result<U256> {
        if let Some(word) = lock(&self.storage).get(&(address, slot)).copied() {
            self.counters.storage_hits.fetch_add(1, Ordering::Relaxed);
            return Ok(word);
        }
        self.counters.storage_misses.fetch_add(1, Ordering::Relaxed);

        let word = self
            .rpc
            .get_storage(address, slot, self.block_number)
            .await?;
        lock(&self.storage).put((address, slot), word);
        Ok(word)
    }

    /// Seed account + code caches for a set of addresses in one batched
    /// round trip, skipping entries already cached. Returns how many
    /// accounts were installed.
    pub async fn preload_addresses(&self, addresses: &[Address]) -> Result<usize> {
        let missing: Vec<Address> = {
            let guard = lock(&self.accounts);
            // BTreeSet for a deterministic batch payload.
            addresses
                .iter()
                .filter(|a| !guard.contains(*a))
                .copied()
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect()
        };
        if missing.is_empty() {
            return Ok(0);
        }

        let fetched = self.rpc.batch_accounts(&missing, self.block_number).await?;
        let installed = fetched.len();
        for (address, account) in fetched {
            lock(&self.code).put(address, account.code.clone());
            lock(&self.accounts).put(address, account);
        }
        Ok(installed)
    }

    /// Install a pre-fetched account snapshot.
    pub fn install_account(&self, address: Address, account: AccountSnapshot) {
        lock(&self.code).put(address, account.code.clone());
        lock(&self.accounts).put(address, account);
    }

    /// Install pre-fetched code, e.g. from the pipeline's batch.
    pub fn install_many_codes<I>(&self, codes: I)
    where
        I: IntoIterator<Item = (Address, Bytes)>,
    {
        let mut guard = lock(&self.code);
        for (address, code) in codes {
            guard.put(address, code);
        }
    }

    pub fn install_storage(&self, address: Address, slot: U256, word: U256) {
        lock(&self.storage).put((address, slot), word);
    }

    /// Persist pool token pairs; existing entries are never overwritten.
    pub fn install_many_pool_tokens<I>(&self, pools: I, first_seen_block: u64) -> Result<usize>
    where
        I: IntoIterator<Item = (Address, (Address, Address))>,
    {
        self.pool_store.insert_many(pools, first_seen_block)
    }

    /// Cached pool token pair, if known.
    pub fn pool_tokens(&self, pool: Address) -> Option<(Address, Address)> {
        self.pool_store.get(&pool)
    }

    /// Drop all in-memory state and counters. The pool-token file is left
    /// untouched.
    pub fn clear_all(&self) {
        lock(&self.accounts).clear();
        lock(&self.storage).clear();
        lock(&self.code).clear();
        self.counters.account_hits.store(0, Ordering::Relaxed);
        self.counters.account_misses.store(0, Ordering::Relaxed);
        self.counters.storage_hits.store(0, Ordering::Relaxed);
        self.counters.storage_misses.store(0, Ordering::Relaxed);
        self.counters.code_hits.store(0, Ordering::Relaxed);
        self.counters.code_misses.store(0, Ordering::Relaxed);
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            account_hits: self.counters.account_hits.load(Ordering::Relaxed),
            account_misses: self.counters.account_misses.load(Ordering::Relaxed),
            storage_hits: self.counters.storage_hits.load(Ordering::Relaxed),
            storage_misses: self.counters.storage_misses.load(Ordering::Relaxed),
            code_hits: self.counters.code_hits.load(Ordering::Relaxed),
            code_misses: self.counters.code_misses.load(Ordering::Relaxed),
        }
    }

    /// Synchronous bridge for the EVM database hooks. Must run on a
    /// multi-thread runtime when an ambient runtime is present.
    pub fn account_blocking(&self, address: Address) -> Result<AccountSnapshot> {
        block_on(self.get_account(address))
    }

    pub fn storage_blocking(&self, address: Address, slot: U256) -> Result<U256> {
        block_on(self.get_storage(address, slot))
    }
}

fn block_on<T>(future: impl Future<Output = Result<T>>) -> Result<T> {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => tokio::task::block_in_place(|| handle.block_on(future)),
        Err(_) => tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| InspectError::Internal(format!("fallback runtime: {e}")))?
            .block_on(future),
    }
}
