//! Typed data-model accessors (C12).
//!
//! SQLite is this crate's concrete binding for the abstractly-specified
//! relational store (§10.3): `sqlx` with runtime-checked queries (no
//! `query!`/`query_as!` macros, since these are authored without a reachable
//! `DATABASE_URL`), mirroring `link_index::LinkIndex::open`'s embedded-schema
//! convention.

pub mod cache;
pub mod identifiers;
pub mod models;
pub mod publications;
pub mod queue;
pub mod runs;
pub mod scholars;
pub mod users;

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::Mutex;

const SCHEMA_SQL: &str = include_str!("schema.sql");

/// Per-user in-process mutex table standing in for
/// `pg_try_advisory_xact_lock(8217, user_id)`.
///
/// SQLite already serializes writers at the connection-pool level; this adds
/// the *user-scoped* serialization the advisory lock provided in the original
/// Postgres deployment, so two runs for the same user can never race even
/// when their critical sections interleave across `await` points.
#[derive(Default)]
pub struct AdvisoryLocks {
    locks: Mutex<HashMap<i64, Arc<Mutex<()>>>>,
}

impl AdvisoryLocks {
    fn new() -> Self {
        Self::default()
    }

    async fn lock_for(&self, user_id: i64) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        match locks.entry(user_id) {
            Entry::Occupied(entry) => entry.get().clone(),
            Entry::Vacant(entry) => entry.insert(Arc::new(Mutex::new(()))).clone(),
        }
    }

    /// Attempt to acquire the user's lock without waiting.
    ///
    /// Returns `None` immediately if another run for this user is in flight,
    /// matching `pg_try_advisory_xact_lock`'s non-blocking contract.
    pub async fn try_acquire(&self, user_id: i64) -> Option<tokio::sync::OwnedMutexGuard<()>> {
        let lock = self.lock_for(user_id).await;
        lock.try_lock_owned().ok()
    }
}

/// Shared handle to the database pool and in-process advisory locks.
#[derive(Clone)]
pub struct Db {
    pub pool: SqlitePool,
    pub advisory_locks: Arc<AdvisoryLocks>,
}

impl Db {
    /// Open (creating if missing) the SQLite database at `database_url` and
    /// apply the embedded schema. Idempotent: safe to call on every startup.
    pub async fn open(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .context("invalid database url")?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(options)
            .await
            .context("failed to open sqlite database")?;

        sqlx::query(SCHEMA_SQL)
            .execute(&pool)
            .await
            .context("failed to initialize database schema")?;

        Ok(Self {
            pool,
            advisory_locks: Arc::new(AdvisoryLocks::new()),
        })
    }

    #[cfg(test)]
    pub async fn open_in_memory() -> Result<Self> {
        Self::open("sqlite::memory:").await
    }
}
