mod common;
use common::{assert_sqlite_pragmas, setup_db};

use bar_store::db::connection::connect_sqlite;
use diesel::QueryableByName;
use diesel::prelude::*;
use diesel::sql_query;
use diesel::sql_types::{Integer, Text};

#[derive(QueryableByName)]
struct TblCnt {
    #[diesel(sql_type = Integer)]
    cnt: i32,
}
#[derive(QueryableByName)]
struct Close {
    #[diesel(sql_type = Text)]
    close: String,
}

#[test]
fn migrations_apply_and_pragmas_are_set() {
    let (db, mut conn) = setup_db();
    assert_sqlite_pragmas(&mut conn);

    // pragmas are per connection; a second one gets them too
    let mut second = connect_sqlite(&db.path).expect("connect second");
    assert_sqlite_pragmas(&mut second);

    let tbls: TblCnt = sql_query(
        "SELECT COUNT(*) AS cnt FROM sqlite_master WHERE type='table' AND name IN ('bars', 'series_locks');",
    )
    .get_result(&mut conn)
    .unwrap();
    assert_eq!(tbls.cnt, 2);
}

#[test]
fn primary_key_rejects_duplicate_rows() {
    let (_db, mut conn) = setup_db();
    let insert = "INSERT INTO bars (source, symbol, timeframe, ts, open, high, low, close, volume, updated_at)
                  VALUES ('bitunix', 'BTCUSDT', '1m', '2024-01-01T00:00:00.000Z', '1', '1', '1', '1', '0', '')";
    sql_query(insert).execute(&mut conn).unwrap();
    assert!(sql_query(insert).execute(&mut conn).is_err());
}

#[test]
fn reader_sees_committed_rows_while_writer_is_open() {
    let (db, mut writer) = setup_db();
    let mut reader = connect_sqlite(&db.path).unwrap();

    sql_query(
        "INSERT INTO bars (source, symbol, timeframe, ts, open, high, low, close, volume, updated_at)
         VALUES ('bitunix', 'ETHUSDT', '1m', '2024-01-01T00:00:00.000Z', '1', '2', '1', '1.5', '3', '')",
    )
    .execute(&mut writer)
    .unwrap();

    let row: Close = sql_query("SELECT close FROM bars WHERE symbol = 'ETHUSDT'")
        .get_result(&mut reader)
        .unwrap();
    assert_eq!(row.close, "1.5");
}
