//! SQLite persistence for validated bars, gap reports, and the `bar-sync`
//! operator binary.
//!
//! The ingestion pipeline itself lives in `bar_ingestor`; this crate supplies
//! its [`bar_ingestor::io::sink::BarStore`] over SQLite ([`bars::SqliteBarStore`])
//! and a symbol lock table other processes on the same file respect
//! ([`locks::SqliteLockTable`]).

#![deny(missing_docs)]

pub mod bars;
pub mod coverage;
pub mod db;
pub mod locks;
pub mod models;
/// Diesel table definitions matching the embedded migrations.
#[allow(missing_docs)]
pub mod schema;
