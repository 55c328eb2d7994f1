//! Database utilities for connections and schema migrations.
//!
//! - [`connection::connect_sqlite`] opens a connection with WAL, foreign_keys=ON
//!   and a 5000ms busy_timeout.
//! - [`migrate::run_sqlite`] and [`migrate::run_all`] apply the embedded Diesel
//!   migrations.
//!
//! `DATABASE_URL` may be a bare file path or carry a `sqlite:` / `sqlite://` prefix.
//!
//! Example:
//! ```no_run
//! use bar_store::db::{connection, migrate};
//!
//! let db_path = std::env::temp_dir().join("bar_store_example.db");
//! migrate::run_all(db_path.to_str().unwrap()).expect("migrations");
//! let _conn = connection::connect_sqlite(db_path.to_str().unwrap()).expect("connect");
//! ```

pub mod connection;
pub mod migrate;

/// Strips an optional `sqlite:` / `sqlite://` scheme, leaving what SQLite expects.
pub fn sqlite_path(database_url: &str) -> &str {
    let url = database_url.trim();
    url.strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))
        .unwrap_or(url)
}
