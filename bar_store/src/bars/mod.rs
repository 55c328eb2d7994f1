//! SQLite-backed [`BarStore`].
//!
//! Diesel is synchronous, so every call runs on tokio's blocking pool against a
//! single connection behind a mutex. WAL mode lets other processes read the
//! file while an ingestion writes.

pub mod repo;

use std::sync::Arc;

use async_trait::async_trait;
use bar_ingestor::{
    io::sink::{BackendSnafu, BarStore, CorruptSnafu, JoinSnafu, StoreError},
    models::{
        bar::Bar,
        request_params::{BarCursor, SeriesKey, StoredBar, SymbolFilter},
    },
};
use chrono::{DateTime, Utc};
use diesel::SqliteConnection;
use parking_lot::Mutex;
use snafu::ResultExt;
use tracing::debug;

use crate::{coverage, db::connection::connect_sqlite, locks::SqliteLockTable};

#[derive(thiserror::Error, Debug)]
/// Errors raised by the bars repository itself, as opposed to the database.
pub enum RepoError {
    #[error("corrupt {column} in {row}: {value:?}")]
    /// A stored value could not be parsed back.
    Corrupt {
        /// Which row, as `source:symbol@timeframe ts`.
        row: String,
        /// Column name.
        column: &'static str,
        /// The raw stored text.
        value: String,
    },

    #[error("bucket id {0} is outside the coverage bitmap range")]
    /// Bucket ids must fit in `u32` for roaring; pre-1970 ranges do not.
    BucketOutOfRange(i64),
}

/// Result type used throughout the bars repository for fallible operations.
pub type RepoResult<T> = anyhow::Result<T>;

/// [`BarStore`] over one SQLite connection.
#[derive(Clone)]
pub struct SqliteBarStore {
    conn: Arc<Mutex<SqliteConnection>>,
}

impl SqliteBarStore {
    /// Wraps an open connection; migrations must already have run.
    pub fn new(conn: SqliteConnection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    /// Opens `database_url` with [`connect_sqlite`].
    pub fn open(database_url: &str) -> anyhow::Result<Self> {
        Ok(Self::new(connect_sqlite(database_url)?))
    }

    async fn with_conn<T, F>(&self, op: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut SqliteConnection) -> RepoResult<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || op(&mut conn.lock()))
            .await
            .context(JoinSnafu)?
            .map_err(into_store_error)
    }

    /// Lock table on this store's connection; leases last `ttl` between renewals.
    pub fn lock_table(&self, ttl: chrono::Duration) -> SqliteLockTable {
        SqliteLockTable::new(Arc::clone(&self.conn), ttl)
    }

    /// Bucket ranges of `key` in `[start, end)` with no stored bar.
    pub async fn missing_ranges(
        &self,
        key: &SeriesKey,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<(DateTime<Utc>, DateTime<Utc>)>, StoreError> {
        let key = key.clone();
        self.with_conn(move |conn| coverage::missing_ranges(conn, &key, start, end))
            .await
    }
}

fn into_store_error(e: anyhow::Error) -> StoreError {
    let message = format!("{e:#}");
    match e.downcast_ref::<RepoError>() {
        Some(RepoError::Corrupt { .. }) => CorruptSnafu { message }.build(),
        _ => BackendSnafu { message }.build(),
    }
}

#[async_trait]
impl BarStore for SqliteBarStore {
    async fn upsert_bars(&self, key: &SeriesKey, bars: &[Bar]) -> Result<usize, StoreError> {
        if bars.is_empty() {
            return Ok(0);
        }
        let key = key.clone();
        let bars = bars.to_vec();
        let written = self
            .with_conn(move |conn| repo::upsert_bars(conn, &key, &bars))
            .await?;
        debug!(written, "bars upserted");
        Ok(written)
    }

    async fn stream_bars(
        &self,
        filter: &SymbolFilter,
        after: Option<&BarCursor>,
        limit: usize,
    ) -> Result<Vec<StoredBar>, StoreError> {
        let filter = filter.clone();
        let after = after.cloned();
        self.with_conn(move |conn| repo::stream_bars(conn, &filter, after.as_ref(), limit))
            .await
    }

    async fn count_bars(&self, filter: &SymbolFilter) -> Result<u64, StoreError> {
        let filter = filter.clone();
        self.with_conn(move |conn| repo::count_bars(conn, &filter))
            .await
    }

    async fn timestamps(
        &self,
        key: &SeriesKey,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<DateTime<Utc>>, StoreError> {
        let key = key.clone();
        self.with_conn(move |conn| repo::timestamps(conn, &key, start, end))
            .await
    }
}
