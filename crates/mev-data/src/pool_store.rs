//! Persistent pool → token-pair store.
//!
//! Pool tokens are immutable: once a pool is created, `token0`/`token1`
//! never change, so entries are cached forever and shared across runs and
//! blocks. A single SQLite table in WAL mode holds the durable copy; a
//! DashMap mirror serves O(1) reads. Writes are INSERT OR IGNORE, so the
//! store is monotonic by construction.

use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use alloy::primitives::Address;
use dashmap::DashMap;
use rusqlite::Connection;

use crate::error::{InspectError, Result};

pub struct PoolTokenStore {
    conn: Mutex<Connection>,
    mirror: DashMap<Address, (Address, Address)>,
}

fn lock(conn: &Mutex<Connection>) -> MutexGuard<'_, Connection> {
    conn.lock().unwrap_or_else(PoisonError::into_inner)
}

fn addr_text(address: &Address) -> String {
    format!("{address:#x}")
}

fn parse_addr(text: &str) -> Result<Address> {
    text.parse::<Address>()
        .map_err(|e| InspectError::decode("pool_tokens", format!("bad address {text:?}: {e}")))
}

impl PoolTokenStore {
    /// Opens (or creates) the store and loads the mirror.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
            CREATE TABLE IF NOT EXISTS pool_tokens (
                pool_address TEXT PRIMARY KEY,
                token0 TEXT NOT NULL,
                token1 TEXT NOT NULL,
                first_seen_block INTEGER NOT NULL
            );",
        )?;

        let mirror = DashMap::new();
        {
            let mut stmt = conn.prepare("SELECT pool_address, token0, token1 FROM pool_tokens")?;
            let mut rows = stmt.query([])?;
            while let Some(row) = rows.next()? {
                let pool: String = row.get(0)?;
                let token0: String = row.get(1)?;
                let token1: String = row.get(2)?;
                mirror.insert(
                    parse_addr(&pool)?,
                    (parse_addr(&token0)?, parse_addr(&token1)?),
                );
            }
        }
        tracing::info!(pools = mirror.len(), "loaded pool token store");

        Ok(Self {
            conn: Mutex::new(conn),
            mirror,
        })
    }

    /// Volatile store for tests and cache-less runs.
    pub fn in_memory() -> Result<Self> {
        Self::open(":memory:")
    }

    pub fn get(&self, pool: &Address) -> Option<(Address, Address)> {
        self.mirror.get(pool).map(|entry| *entry.value())
    }

    pub fn contains(&self, pool: &Address) -> bool {
        self.mirror.contains_key(pool)
    }

    /// Idempotent insert; an existing entry is never overwritten.
    pub fn insert(
        &self,
        pool: Address,
        token0: Address,
        token1: Address,
        first_seen_block: u64,
    ) -> Result<()> {
        if self.mirror.contains_key(&pool) {
            return Ok(());
        }
        lock(&self.conn).execute(
            "INSERT OR IGNORE INTO pool_tokens (pool_address, token0, token1, first_seen_block)
             VALUES (?1, ?2, ?3, ?4)",
            (
                addr_text(&pool),
                addr_text(&token0),
                addr_text(&token1),
                first_seen_block as i64,
            ),
        )?;
        self.mirror.insert(pool, (token0, token1));
        Ok(())
    }

    /// Batch insert inside one write transaction. Returns how many entries
    /// were new.
    pub fn insert_many<I>(&self, pools: I, first_seen_block: u64) -> Result<usize>
    where
        I: IntoIterator<Item = (Address, (Address, Address))>,
    {
        let fresh: Vec<(Address, (Address, Address))> = pools
            .into_iter()
            .filter(|(pool, _)| !self.mirror.contains_key(pool))
            .collect();
        if fresh.is_empty() {
            return Ok(0);
        }

        let mut guard = lock(&self.conn);
        let tx = guard.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO pool_tokens (pool_address, token0, token1, first_seen_block)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            for (pool, (token0, token1)) in &fresh {
                stmt.execute((
                    addr_text(pool),
                    addr_text(token0),
                    addr_text(token1),
                    first_seen_block as i64,
                ))?;
            }
        }
        tx.commit()?;
        drop(guard);

        let inserted = fresh.len();
        for (pool, tokens) in fresh {
            self.mirror.insert(pool, tokens);
        }
        tracing::debug!(inserted, "saved new pools to store");
        Ok(inserted)
    }

    /// Pools known to the in-memory mirror.
    pub fn len(&self) -> usize {
        self.mirror.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mirror.is_empty()
    }
}
