#![allow(dead_code)]

use bar_ingestor::models::{bar::Bar, request_params::SeriesKey, timeframe::TimeFrame};
use bar_store::db::{connection, migrate};
use chrono::{DateTime, Duration, TimeZone, Utc};
use diesel::QueryableByName;
use diesel::prelude::*;
use diesel::sql_types::{Integer, Text};
use rust_decimal::Decimal;
use std::path::PathBuf;
use tempfile::TempDir;

#[derive(QueryableByName)]
struct JournalMode {
    #[diesel(sql_type = Text)]
    journal_mode: String,
}
#[derive(QueryableByName)]
struct ForeignKeys {
    #[diesel(sql_type = Integer)]
    foreign_keys: i32,
}
#[derive(QueryableByName)]
struct BusyTimeout {
    #[diesel(sql_type = Integer, column_name = "timeout")]
    busy_timeout: i32,
}

pub struct TestDb {
    _dir: TempDir,    // keep alive for the life of the test
    pub path: String, // <tmpdir>/test.db
}

pub fn setup_db() -> (TestDb, SqliteConnection) {
    let dir = TempDir::new().expect("tempdir");
    let mut p = PathBuf::from(dir.path());
    p.push("test.db");
    let path = p.to_string_lossy().to_string();

    migrate::run_all(&path).expect("migrations");

    let conn = connection::connect_sqlite(&path).expect("connect");
    (TestDb { _dir: dir, path }, conn)
}

pub fn assert_sqlite_pragmas(conn: &mut SqliteConnection) {
    use diesel::sql_query;

    let jm: JournalMode = sql_query("PRAGMA journal_mode;").get_result(conn).unwrap();
    assert_eq!(jm.journal_mode.to_lowercase(), "wal"); // WAL is persistent per DB file

    let fk: ForeignKeys = sql_query("PRAGMA foreign_keys;").get_result(conn).unwrap();
    assert_eq!(fk.foreign_keys, 1);

    let bt: BusyTimeout = sql_query("PRAGMA busy_timeout;").get_result(conn).unwrap();
    assert_eq!(bt.busy_timeout, 5000);
}

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 11, 26, 0, 0, 0).unwrap()
}

pub fn minute(i: i64) -> DateTime<Utc> {
    t0() + Duration::minutes(i)
}

pub fn m1() -> TimeFrame {
    TimeFrame::minutes(1).unwrap()
}

pub fn key(symbol: &str) -> SeriesKey {
    SeriesKey::new("bitunix", symbol, m1())
}

/// Quiet bar around 100; `close` lets tests tell rewrites apart.
pub fn bar(i: i64, close: &str) -> Bar {
    let close: Decimal = close.parse().unwrap();
    Bar {
        timestamp: minute(i),
        open: Decimal::from(100),
        high: Decimal::from(101).max(close),
        low: Decimal::from(99).min(close),
        close,
        volume: Decimal::from(100),
        source: "bitunix".into(),
    }
}
