//! Symbol locks shared by every process on one database file.
//!
//! A lock is a row in [`crate::schema::series_locks`] keyed by
//! `(source, symbol)`, owned by one [`SqliteLockTable`] and live until
//! `expires_at`. Acquisition runs in an immediate transaction: an expired row is
//! reclaimed first, then the insert either lands or the live row is reported as
//! [`Busy`]. Renewal and release only touch rows this owner still holds.
//!
//! Calls run synchronously on the caller's thread. Each is one short statement
//! on the shared connection, bounded by the connection's `busy_timeout`.

use std::{
    process,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use anyhow::anyhow;
use bar_ingestor::{
    ingest::locks::{Busy, Lease, LockError, LockHolder, LockTable, SymbolLockGuard, lock_key},
    models::tz::to_rfc3339_millis,
};
use chrono::{Duration, Utc};
use diesel::prelude::*;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::{
    bars::{RepoError, RepoResult},
    db::connection::connect_sqlite,
    models::NewSeriesLock,
    schema::series_locks,
};

static NEXT_TABLE: AtomicU64 = AtomicU64::new(0);

/// [`LockTable`] persisted in SQLite.
pub struct SqliteLockTable {
    conn: Arc<Mutex<SqliteConnection>>,
    owner: String,
    ttl: Duration,
}

impl SqliteLockTable {
    /// Lock table over a connection that may be shared with a bar store.
    ///
    /// Leases last `ttl` past their last acquisition or renewal.
    pub fn new(conn: Arc<Mutex<SqliteConnection>>, ttl: Duration) -> Self {
        let owner = format!(
            "pid{}-{}-{}",
            process::id(),
            Utc::now().timestamp_micros(),
            NEXT_TABLE.fetch_add(1, Ordering::Relaxed)
        );
        Self { conn, owner, ttl }
    }

    /// Opens its own connection to `database_url`.
    pub fn open(database_url: &str, ttl: Duration) -> anyhow::Result<Self> {
        Ok(Self::new(
            Arc::new(Mutex::new(connect_sqlite(database_url)?)),
            ttl,
        ))
    }

    /// Identifier written to every lease this table takes.
    pub fn owner(&self) -> &str {
        &self.owner
    }
}

impl LockTable for SqliteLockTable {
    fn try_acquire(
        &self,
        source: &str,
        symbol: &str,
        holder: LockHolder,
    ) -> Result<SymbolLockGuard, LockError> {
        let key = lock_key(source, symbol);
        let outcome = acquire(
            &mut self.conn.lock(),
            &self.owner,
            source,
            symbol,
            holder,
            self.ttl,
        )
        .map_err(backend)?;
        if let Some(held_by) = outcome {
            return Err(Busy { key, held_by }.into());
        }
        debug!(%key, %holder, owner = %self.owner, "persisted symbol lock acquired");
        let lease = SqliteLease {
            conn: Arc::clone(&self.conn),
            key: key.clone(),
            source: source.to_string(),
            symbol: symbol.to_string(),
            owner: self.owner.clone(),
            ttl: self.ttl,
        };
        Ok(SymbolLockGuard::new(key, Box::new(lease)))
    }
}

/// `None` when the lease was taken, otherwise who holds it.
fn acquire(
    conn: &mut SqliteConnection,
    owner: &str,
    source: &str,
    symbol: &str,
    holder: LockHolder,
    ttl: Duration,
) -> RepoResult<Option<LockHolder>> {
    use crate::schema::series_locks::dsl as l;

    conn.immediate_transaction(|conn| {
        let now = Utc::now();
        let now_text = to_rfc3339_millis(now);

        let reclaimed = diesel::delete(
            l::series_locks
                .filter(l::source.eq(source))
                .filter(l::symbol.eq(symbol))
                .filter(l::expires_at.le(&now_text)),
        )
        .execute(conn)?;
        if reclaimed > 0 {
            info!(source, symbol, "reclaimed expired symbol lock");
        }

        let inserted = diesel::insert_into(series_locks::table)
            .values(NewSeriesLock {
                source,
                symbol,
                holder: holder.as_str(),
                owner,
                acquired_at: now_text.clone(),
                expires_at: to_rfc3339_millis(now + ttl),
            })
            .on_conflict_do_nothing()
            .execute(conn)?;
        if inserted == 1 {
            return Ok(None);
        }

        let tag: String = l::series_locks
            .filter(l::source.eq(source))
            .filter(l::symbol.eq(symbol))
            .select(l::holder)
            .first(conn)?;
        match LockHolder::from_tag(&tag) {
            Some(held_by) => Ok(Some(held_by)),
            None => Err(anyhow!(RepoError::Corrupt {
                row: lock_key(source, symbol),
                column: "holder",
                value: tag,
            })),
        }
    })
}

fn backend(e: anyhow::Error) -> LockError {
    LockError::Backend {
        message: format!("{e:#}"),
    }
}

struct SqliteLease {
    conn: Arc<Mutex<SqliteConnection>>,
    key: String,
    source: String,
    symbol: String,
    owner: String,
    ttl: Duration,
}

impl Lease for SqliteLease {
    fn renew(&self) -> Result<(), LockError> {
        let expires_at = to_rfc3339_millis(Utc::now() + self.ttl);
        let updated = diesel::update(
            series_locks::table
                .filter(series_locks::source.eq(&self.source))
                .filter(series_locks::symbol.eq(&self.symbol))
                .filter(series_locks::owner.eq(&self.owner)),
        )
        .set(series_locks::expires_at.eq(expires_at))
        .execute(&mut *self.conn.lock())
        .map_err(|e| backend(e.into()))?;
        if updated == 0 {
            return Err(LockError::Lost {
                key: self.key.clone(),
            });
        }
        Ok(())
    }

    fn release(&self) {
        let mine = series_locks::table
            .filter(series_locks::source.eq(&self.source))
            .filter(series_locks::symbol.eq(&self.symbol))
            .filter(series_locks::owner.eq(&self.owner));
        match diesel::delete(mine).execute(&mut *self.conn.lock()) {
            Ok(0) => warn!(key = %self.key, "symbol lock was already gone at release"),
            Ok(_) => {}
            Err(e) => warn!(key = %self.key, error = %e, "failed to release symbol lock; it will expire"),
        }
    }
}
