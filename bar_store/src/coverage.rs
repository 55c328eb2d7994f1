//! Gap report: which buckets of a window have no stored bar.
//!
//! The window's bucket ids go into a roaring bitmap, the stored ones are
//! subtracted, and the remaining ids are coalesced into contiguous UTC ranges.
//! Every bucket is expected (always-on market), so the result is exactly what
//! a follow-up ingestion has to fetch.

use bar_ingestor::{
    io::sink::BarStore,
    models::{
        bucket::{bucket_end_exclusive, bucket_id, bucket_start, end_bucket_exclusive},
        request_params::SeriesKey,
        timeframe::TimeFrame,
    },
};
use chrono::{DateTime, Utc};
use diesel::SqliteConnection;
use roaring::RoaringBitmap;

use crate::bars::{RepoError, RepoResult, repo};

/// A half-open UTC range `[start, end)`.
pub type Range = (DateTime<Utc>, DateTime<Utc>);

/// Missing bucket ranges of `key` in `[start, end)`, read straight from SQLite.
pub fn missing_ranges(
    conn: &mut SqliteConnection,
    key: &SeriesKey,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> RepoResult<Vec<Range>> {
    let Some((lo, hi)) = bucket_window(key.timeframe, start, end) else {
        return Ok(Vec::new());
    };
    let present = repo::timestamps(conn, key, lo, hi)?;
    missing_buckets(key.timeframe, start, end, present)
}

/// Same report through any [`BarStore`].
pub async fn missing_ranges_in(
    store: &dyn BarStore,
    key: &SeriesKey,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> RepoResult<Vec<Range>> {
    let Some((lo, hi)) = bucket_window(key.timeframe, start, end) else {
        return Ok(Vec::new());
    };
    let present = store.timestamps(key, lo, hi).await?;
    missing_buckets(key.timeframe, start, end, present)
}

/// Buckets touched by `[start, end)` minus those holding a `present` timestamp.
///
/// Partial buckets at either edge count as whole buckets, matching how the
/// ingestion estimates expected bars.
pub fn missing_buckets(
    tf: TimeFrame,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    present: impl IntoIterator<Item = DateTime<Utc>>,
) -> RepoResult<Vec<Range>> {
    if end <= start {
        return Ok(Vec::new());
    }
    let first = to_u32(bucket_id(start, tf))?;
    let last = to_u32(end_bucket_exclusive(end, tf))?;

    let mut window = RoaringBitmap::new();
    window.insert_range(first..last);

    let mut stored = RoaringBitmap::new();
    for ts in present {
        if let Ok(id) = u32::try_from(bucket_id(ts, tf)) {
            stored.insert(id);
        }
    }

    let missing = &window - &stored;
    Ok(coalesce_runs(&missing, tf))
}

/// Aligned `[first bucket start, last bucket end)` for a non-empty window.
fn bucket_window(tf: TimeFrame, start: DateTime<Utc>, end: DateTime<Utc>) -> Option<Range> {
    (start < end).then(|| {
        (
            bucket_start(bucket_id(start, tf), tf),
            bucket_start(end_bucket_exclusive(end, tf), tf),
        )
    })
}

fn to_u32(id: i64) -> Result<u32, RepoError> {
    u32::try_from(id).map_err(|_| RepoError::BucketOutOfRange(id))
}

/// Contiguous runs of bucket ids as `[start of first, end of last)` ranges.
pub fn coalesce_runs(rb: &RoaringBitmap, tf: TimeFrame) -> Vec<Range> {
    let mut out = Vec::new();
    let mut it = rb.iter();
    if let Some(mut run_start) = it.next() {
        let mut prev = run_start;
        for x in it {
            if x == prev + 1 {
                prev = x;
                continue;
            }
            out.push(run_range(run_start, prev, tf));
            run_start = x;
            prev = x;
        }
        out.push(run_range(run_start, prev, tf));
    }
    out
}

fn run_range(first: u32, last: u32, tf: TimeFrame) -> Range {
    (
        bucket_start(i64::from(first), tf),
        bucket_end_exclusive(i64::from(last), tf),
    )
}
