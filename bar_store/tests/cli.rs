use std::{fs, process::Command, str};

use tempfile::TempDir;

fn bar_sync(db: &str, args: &[&str]) -> (bool, String, String) {
    let output = Command::new(env!("CARGO_BIN_EXE_bar-sync"))
        .args(["--database-url", db])
        .args(args)
        .env_remove("DATABASE_URL")
        .env("RUST_LOG", "warn")
        .output()
        .expect("run bar-sync");
    (
        output.status.success(),
        str::from_utf8(&output.stdout).unwrap().to_string(),
        str::from_utf8(&output.stderr).unwrap().to_string(),
    )
}

#[test]
fn import_then_report_gaps_and_validate() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("bars.db").to_string_lossy().to_string();
    let file = dir.path().join("bars.json");
    // minute 3 missing; minute 1 has its high below the open
    fs::write(
        &file,
        r#"[
          {"timestamp": "2024-11-26T00:00:00Z", "open": "100", "high": "101", "low": "99", "close": "100", "volume": "10"},
          {"timestamp": "2024-11-26T00:01:00Z", "open": "100.5", "high": "100.2", "low": "99", "close": "100", "volume": "10"},
          {"timestamp": "2024-11-26T00:02:00Z", "open": "100", "high": "101", "low": "99", "close": "100", "volume": "10"},
          {"timestamp": "2024-11-26T00:04:00Z", "open": "100", "high": "101", "low": "99", "close": "100", "volume": "10"}
        ]"#,
    )
    .unwrap();

    let (ok, _, stderr) = bar_sync(&db, &["migrate"]);
    assert!(ok, "migrate failed: {stderr}");

    let (ok, stdout, stderr) = bar_sync(
        &db,
        &[
            "import",
            "--file",
            file.to_str().unwrap(),
            "--symbol",
            "BTCUSDT",
        ],
    );
    assert!(ok, "import failed: {stderr}");
    assert!(stdout.contains("persisted 4 of 5 expected"), "{stdout}");
    assert!(stdout.contains("ohlc corrected 1"), "{stdout}");

    let (ok, stdout, stderr) = bar_sync(
        &db,
        &[
            "gaps",
            "--source",
            "manual",
            "--symbol",
            "BTCUSDT",
            "--start",
            "2024-11-26T00:00:00Z",
            "--end",
            "2024-11-26T00:05:00Z",
        ],
    );
    assert!(ok, "gaps failed: {stderr}");
    assert!(stdout.contains("1 of 5 bars missing in 1 gap(s)"), "{stdout}");

    let (ok, stdout, stderr) = bar_sync(&db, &["validate", "--symbol", "BTCUSDT"]);
    assert!(ok, "validate failed: {stderr}");
    assert!(stdout.contains("scanned 4 bars, corrected 0"), "{stdout}");
}

#[test]
fn bad_arguments_fail_without_touching_the_network() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("bars.db").to_string_lossy().to_string();

    // naive time without a zone
    let (ok, _, stderr) = bar_sync(
        &db,
        &["ingest", "--symbol", "BTCUSDT", "--start", "2024-11-26 09:00"],
    );
    assert!(!ok);
    assert!(stderr.contains("time zone"), "{stderr}");

    let (ok, _, _) = bar_sync(&db, &["ingest", "--symbol", "BTCUSDT", "--timeframe", "90m", "--days", "1"]);
    assert!(!ok);
}
