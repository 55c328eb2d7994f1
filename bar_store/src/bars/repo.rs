//! Synchronous queries against the `bars` table.
//!
//! All reads order by the primary key `(source, symbol, timeframe, ts)`, which
//! is also the keyset used to page through the table.

use anyhow::Context;
use bar_ingestor::models::{
    bar::Bar,
    request_params::{BarCursor, SeriesKey, StoredBar, SymbolFilter},
    tz::{parse_ts_to_utc, to_rfc3339_millis},
};
use chrono::{DateTime, Utc};
use diesel::{prelude::*, sqlite::Sqlite, upsert::excluded};

use crate::{
    bars::{RepoError, RepoResult},
    models::{BarRow, NewBarRow},
    schema::bars as b,
};

/// Inserts or replaces each bar; every row is its own autocommit statement.
pub fn upsert_bars(
    conn: &mut SqliteConnection,
    key: &SeriesKey,
    input: &[Bar],
) -> RepoResult<usize> {
    let timeframe = key.timeframe.to_string();
    let now = to_rfc3339_millis(Utc::now());
    let mut written = 0;
    for bar in input {
        let row = NewBarRow::new(key, &timeframe, bar, &now);
        written += diesel::insert_into(b::table)
            .values(&row)
            .on_conflict((b::source, b::symbol, b::timeframe, b::ts))
            .do_update()
            .set((
                b::open.eq(excluded(b::open)),
                b::high.eq(excluded(b::high)),
                b::low.eq(excluded(b::low)),
                b::close.eq(excluded(b::close)),
                b::volume.eq(excluded(b::volume)),
                b::updated_at.eq(excluded(b::updated_at)),
            ))
            .execute(conn)
            .with_context(|| format!("upsert {key} at {}", row.ts))?;
    }
    Ok(written)
}

fn filtered<'a>(filter: &SymbolFilter) -> b::BoxedQuery<'a, Sqlite> {
    let mut q = b::table.into_boxed();
    if let Some(source) = &filter.source {
        q = q.filter(b::source.eq(source.clone()));
    }
    if let Some(symbol) = &filter.symbol {
        q = q.filter(b::symbol.eq(symbol.clone()));
    }
    if let Some(tf) = filter.timeframe {
        q = q.filter(b::timeframe.eq(tf.to_string()));
    }
    q
}

/// Up to `limit` rows matching `filter`, strictly after `after` in key order.
pub fn stream_bars(
    conn: &mut SqliteConnection,
    filter: &SymbolFilter,
    after: Option<&BarCursor>,
    limit: usize,
) -> RepoResult<Vec<StoredBar>> {
    let mut q = filtered(filter);
    if let Some(cursor) = after {
        let (source, symbol, timeframe, ts) = cursor.sort_key();
        let ts = to_rfc3339_millis(ts);
        q = q.filter(
            b::source
                .gt(source.clone())
                .or(b::source.eq(source.clone()).and(b::symbol.gt(symbol.clone())))
                .or(b::source
                    .eq(source.clone())
                    .and(b::symbol.eq(symbol.clone()))
                    .and(b::timeframe.gt(timeframe.clone())))
                .or(b::source
                    .eq(source)
                    .and(b::symbol.eq(symbol))
                    .and(b::timeframe.eq(timeframe))
                    .and(b::ts.gt(ts))),
        );
    }
    let rows: Vec<BarRow> = q
        .order((
            b::source.asc(),
            b::symbol.asc(),
            b::timeframe.asc(),
            b::ts.asc(),
        ))
        .limit(i64::try_from(limit).unwrap_or(i64::MAX))
        .select(BarRow::as_select())
        .load(conn)
        .context("stream bars")?;
    rows.into_iter()
        .map(|row| StoredBar::try_from(row).map_err(anyhow::Error::from))
        .collect()
}

/// Number of rows matching `filter`.
pub fn count_bars(conn: &mut SqliteConnection, filter: &SymbolFilter) -> RepoResult<u64> {
    let n: i64 = filtered(filter)
        .count()
        .get_result(conn)
        .context("count bars")?;
    Ok(u64::try_from(n).unwrap_or(0))
}

/// Stored timestamps of one series within `[start, end)`, ascending.
pub fn timestamps(
    conn: &mut SqliteConnection,
    key: &SeriesKey,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> RepoResult<Vec<DateTime<Utc>>> {
    if end <= start {
        return Ok(Vec::new());
    }
    let raw: Vec<String> = b::table
        .filter(b::source.eq(key.source.as_str()))
        .filter(b::symbol.eq(key.symbol.as_str()))
        .filter(b::timeframe.eq(key.timeframe.to_string()))
        .filter(b::ts.ge(to_rfc3339_millis(start)))
        .filter(b::ts.lt(to_rfc3339_millis(end)))
        .select(b::ts)
        .order(b::ts.asc())
        .load(conn)
        .with_context(|| format!("timestamps of {key}"))?;
    raw.into_iter()
        .map(|ts| {
            parse_ts_to_utc(&ts).map_err(|_| {
                anyhow::Error::from(RepoError::Corrupt {
                    row: key.to_string(),
                    column: "ts",
                    value: ts,
                })
            })
        })
        .collect()
}
