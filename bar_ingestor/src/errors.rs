use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::{
    ingest::locks::{Busy, LockError},
    io::sink::StoreError,
    providers::ProviderError,
    quality::post_hoc::ValidateError,
};

/// Why an ingestion run stopped early.
///
/// Batches persisted before the failure are kept; the failure variants carry
/// how many bars were saved and where a follow-up run should start.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Busy(#[from] Busy),

    /// The lock table failed, or the run's lease was taken over mid-run.
    #[error(
        "symbol lock for {symbol} failed: {source}; \
         {bars_persisted} bars saved, resume from {resume_from}"
    )]
    Lock {
        symbol: String,
        bars_persisted: u64,
        resume_from: DateTime<Utc>,
        #[source]
        source: LockError,
    },

    #[error("invalid ingest request: {0}")]
    InvalidRequest(String),

    #[error("ingestion of {symbol} cancelled; {bars_persisted} bars saved, resume from {resume_from}")]
    Cancelled {
        symbol: String,
        bars_persisted: u64,
        resume_from: DateTime<Utc>,
    },

    #[error(
        "fetching batch {batch} of {symbol} failed after {attempts} attempt(s): {source}; \
         {bars_persisted} bars saved, resume from {resume_from}"
    )]
    Fetch {
        symbol: String,
        batch: u64,
        attempts: u32,
        bars_persisted: u64,
        resume_from: DateTime<Utc>,
        #[source]
        source: ProviderError,
    },

    #[error(
        "storing batch {batch} of {symbol} failed: {source}; \
         {bars_persisted} bars saved, resume from {resume_from}"
    )]
    Store {
        symbol: String,
        batch: u64,
        bars_persisted: u64,
        resume_from: DateTime<Utc>,
        #[source]
        source: StoreError,
    },

    /// Every batch was saved but the follow-up sweep failed.
    #[error("post-hoc validation of {symbol} failed after {bars_persisted} bars saved: {source}")]
    PostHoc {
        symbol: String,
        bars_persisted: u64,
        #[source]
        source: ValidateError,
    },
}

impl IngestError {
    pub fn bars_persisted(&self) -> u64 {
        match self {
            IngestError::Busy(_) | IngestError::InvalidRequest(_) => 0,
            IngestError::Cancelled { bars_persisted, .. }
            | IngestError::Lock { bars_persisted, .. }
            | IngestError::Fetch { bars_persisted, .. }
            | IngestError::Store { bars_persisted, .. }
            | IngestError::PostHoc { bars_persisted, .. } => *bars_persisted,
        }
    }

    /// Where a retry of the same request should start, if it stopped part-way.
    pub fn resume_from(&self) -> Option<DateTime<Utc>> {
        match self {
            IngestError::Cancelled { resume_from, .. }
            | IngestError::Lock { resume_from, .. }
            | IngestError::Fetch { resume_from, .. }
            | IngestError::Store { resume_from, .. } => Some(*resume_from),
            _ => None,
        }
    }
}
