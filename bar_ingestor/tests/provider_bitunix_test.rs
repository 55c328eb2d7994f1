#![cfg(test)]
use bar_ingestor::{
    models::{bucket::align_down, request_params::PageRequest, timeframe::TimeFrame},
    providers::{DataProvider, bitunix::BitunixProvider},
    quality::ohlc::is_consistent,
};
use chrono::{Duration, Utc};
use serial_test::serial;

#[tokio::test]
#[serial]
#[ignore]
async fn test_bitunix_provider_fetch_bars() {
    // hits the public Bitunix API; run with --ignored when network is available
    let provider = BitunixProvider::new().expect("Failed to create BitunixProvider");

    let tf = TimeFrame::minutes(1).unwrap();
    let end = align_down(Utc::now() - Duration::hours(1), tf);
    let request = PageRequest {
        symbol: "btcusdt".to_string(),
        timeframe: tf,
        start: end - Duration::minutes(10),
        end,
        cursor: None,
        limit: 5,
    };

    let result = provider.fetch_bars(&request).await;
    assert!(result.is_ok(), "fetch_bars returned an error: {:?}", result.err());

    let page = result.unwrap();
    assert!(!page.bars.is_empty(), "Expected at least one BTCUSDT bar");
    assert!(page.bars.len() <= 5, "Expected at most 5 bars due to limit");
    assert!(page.next_cursor.is_some(), "10 minutes do not fit in a page of 5");

    for pair in page.bars.windows(2) {
        assert!(pair[0].timestamp < pair[1].timestamp);
    }
    for bar in &page.bars {
        assert!(bar.timestamp >= request.start && bar.timestamp < request.end);
        assert_eq!(bar.source, "bitunix");
        // exchanges do ship inconsistent rows now and then
        if !is_consistent(bar) {
            println!("inconsistent bar from exchange: {bar:?}");
        }
    }
}

#[tokio::test]
#[serial]
#[ignore]
async fn test_bitunix_unknown_symbol_is_an_error() {
    let provider = BitunixProvider::new().expect("Failed to create BitunixProvider");
    let tf = TimeFrame::hours(1).unwrap();
    let end = align_down(Utc::now(), tf);
    let request = PageRequest {
        symbol: "NOTAREALSYMBOLUSDT".to_string(),
        timeframe: tf,
        start: end - Duration::hours(3),
        end,
        cursor: None,
        limit: 10,
    };
    match provider.fetch_bars(&request).await {
        Err(e) => assert!(!e.is_transient(), "unexpected transient error: {e}"),
        Ok(page) => assert!(page.bars.is_empty()),
    }
}
