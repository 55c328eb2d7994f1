//! Per-symbol advisory locks.
//!
//! Ingestion and post-hoc validation must not touch the same `(source, symbol)`
//! at once. Acquisition never waits: a held key is reported as [`Busy`] and the
//! caller decides what to do.
//!
//! [`LockTable`] is the seam. [`SymbolLocks`] covers runs inside one process;
//! a table shared through the database covers separate processes. Either way
//! the caller gets a [`SymbolLockGuard`] that releases on drop.

use std::{collections::HashMap, fmt, sync::Arc};

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockHolder {
    Ingestion,
    PostHocValidation,
}

impl LockHolder {
    /// Stable tag for persisted lock rows.
    pub fn as_str(&self) -> &'static str {
        match self {
            LockHolder::Ingestion => "ingestion",
            LockHolder::PostHocValidation => "post_hoc_validation",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "ingestion" => Some(LockHolder::Ingestion),
            "post_hoc_validation" => Some(LockHolder::PostHocValidation),
            _ => None,
        }
    }
}

impl fmt::Display for LockHolder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockHolder::Ingestion => f.write_str("ingestion"),
            LockHolder::PostHocValidation => f.write_str("post-hoc validation"),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{key} is busy: {held_by} in progress")]
pub struct Busy {
    pub key: String,
    pub held_by: LockHolder,
}

#[derive(Debug, Error)]
pub enum LockError {
    #[error(transparent)]
    Busy(#[from] Busy),

    /// The lease expired and another owner took the key.
    #[error("lock on {key} was lost to another owner")]
    Lost { key: String },

    #[error("lock table unavailable: {message}")]
    Backend { message: String },
}

/// Where acquisitions happen. Implementations must be atomic per key.
pub trait LockTable: Send + Sync {
    fn try_acquire(
        &self,
        source: &str,
        symbol: &str,
        holder: LockHolder,
    ) -> Result<SymbolLockGuard, LockError>;
}

/// One held key, owned by its [`SymbolLockGuard`].
pub trait Lease: Send {
    /// Pushes the expiry out. Long runs call this between batches.
    fn renew(&self) -> Result<(), LockError>;

    /// Gives the key back. Called once, from the guard's drop.
    fn release(&self);
}

pub fn lock_key(source: &str, symbol: &str) -> String {
    format!("{source}:{symbol}")
}

/// Releases its key on drop.
pub struct SymbolLockGuard {
    key: String,
    lease: Box<dyn Lease>,
}

impl SymbolLockGuard {
    pub fn new(key: String, lease: Box<dyn Lease>) -> Self {
        Self { key, lease }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn renew(&self) -> Result<(), LockError> {
        self.lease.renew().inspect_err(|e| {
            warn!(key = %self.key, error = %e, "symbol lock renewal failed");
        })
    }
}

impl fmt::Debug for SymbolLockGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SymbolLockGuard")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

impl Drop for SymbolLockGuard {
    fn drop(&mut self) {
        self.lease.release();
        debug!(key = %self.key, "symbol lock released");
    }
}

/// In-process lock table; clones refer to the same table.
#[derive(Debug, Clone, Default)]
pub struct SymbolLocks {
    held: Arc<Mutex<HashMap<String, LockHolder>>>,
}

impl SymbolLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn holder(&self, source: &str, symbol: &str) -> Option<LockHolder> {
        self.held.lock().get(&lock_key(source, symbol)).copied()
    }
}

impl LockTable for SymbolLocks {
    fn try_acquire(
        &self,
        source: &str,
        symbol: &str,
        holder: LockHolder,
    ) -> Result<SymbolLockGuard, LockError> {
        let key = lock_key(source, symbol);
        let mut held = self.held.lock();
        if let Some(&held_by) = held.get(&key) {
            return Err(Busy { key, held_by }.into());
        }
        held.insert(key.clone(), holder);
        debug!(%key, %holder, "symbol lock acquired");
        let lease = MemoryLease {
            key: key.clone(),
            held: Arc::clone(&self.held),
        };
        Ok(SymbolLockGuard::new(key, Box::new(lease)))
    }
}

struct MemoryLease {
    key: String,
    held: Arc<Mutex<HashMap<String, LockHolder>>>,
}

impl Lease for MemoryLease {
    fn renew(&self) -> Result<(), LockError> {
        Ok(())
    }

    fn release(&self) {
        self.held.lock().remove(&self.key);
    }
}
