// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Per-chain mutual exclusion via Postgres advisory locks.
//!
//! The lock name `gas-refund:{chainId}` hashes to a stable 64-bit advisory
//! key. Advisory locks are session-scoped, so the guard pins its pooled
//! connection for the lock's lifetime and must be released explicitly —
//! dropping the guard returns the connection to the pool with the lock
//! still held by that session.

use crate::types::RefundChainId;
use anyhow::Context;
use diesel::sql_types::BigInt;
use diesel_async::RunQueryDsl;
use ethers::utils::keccak256;
use gas_refund_pg_db::{Connection, Db};
use tracing::{info, warn};

/// Stable advisory key for a lock name.
pub fn lock_key(name: &str) -> i64 {
    let digest = keccak256(name.as_bytes());
    i64::from_be_bytes(digest[..8].try_into().expect("8-byte slice"))
}

pub struct ChainLock {
    db: Db,
}

pub struct ChainLockGuard<'a> {
    conn: Option<Connection<'a>>,
    key: i64,
    name: String,
}

impl ChainLock {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Acquire the lock for `chain_id`, blocking until the holding session
    /// releases it.
    pub async fn acquire(&self, chain_id: RefundChainId) -> anyhow::Result<ChainLockGuard<'_>> {
        let name = format!("gas-refund:{}", chain_id.as_u64());
        let key = lock_key(&name);

        let mut conn = self.db.connect().await?;
        diesel::sql_query("SELECT pg_advisory_lock($1)")
            .bind::<BigInt, _>(key)
            .execute(&mut conn)
            .await
            .with_context(|| format!("Failed to acquire advisory lock {name}"))?;

        info!("Acquired lock {name}");
        Ok(ChainLockGuard {
            conn: Some(conn),
            key,
            name,
        })
    }
}

impl ChainLockGuard<'_> {
    /// Release the lock. Must be called on both success and failure paths.
    pub async fn release(mut self) -> anyhow::Result<()> {
        let mut conn = self.conn.take().expect("guard released twice");
        diesel::sql_query("SELECT pg_advisory_unlock($1)")
            .bind::<BigInt, _>(self.key)
            .execute(&mut conn)
            .await
            .with_context(|| format!("Failed to release advisory lock {}", self.name))?;
        info!("Released lock {}", self.name);
        Ok(())
    }
}

impl Drop for ChainLockGuard<'_> {
    fn drop(&mut self) {
        if self.conn.is_some() {
            // The session keeps the lock until the pool recycles the
            // connection; surface it loudly.
            warn!(
                "Lock {} dropped without release; advisory lock stays with the session",
                self.name
            );
        }
    }
}
