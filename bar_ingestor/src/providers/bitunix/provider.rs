use async_trait::async_trait;
use snafu::ResultExt;
use tracing::debug;

use crate::{
    models::{
        bar::Bar,
        request_params::{BarPage, PageRequest},
    },
    providers::{
        ApiSnafu, DataProvider, DecodeSnafu, HttpSnafu, ProviderError, ReqwestSnafu,
        bitunix::{
            BitunixProvider, SOURCE,
            params::{construct_params, millis_to_utc, next_cursor, page_start_ms},
            response::{BitunixResponse, is_busy_code},
        },
    },
};

#[async_trait]
impl DataProvider for BitunixProvider {
    fn source(&self) -> &str {
        SOURCE
    }

    async fn fetch_bars(&self, request: &PageRequest) -> Result<BarPage, ProviderError> {
        let start_ms = page_start_ms(request)?;
        let query = construct_params(request, start_ms)?;

        self.limiter.until_ready().await;
        let response = self
            .client
            .get(&self.url)
            .query(&query)
            .send()
            .await
            .context(ReqwestSnafu)?;

        let status = response.status();
        let body = response.text().await.context(ReqwestSnafu)?;
        if !status.is_success() {
            return HttpSnafu {
                status: status.as_u16(),
                body,
            }
            .fail();
        }

        let parsed: BitunixResponse = serde_json::from_str(&body).map_err(|e| {
            DecodeSnafu {
                message: e.to_string(),
            }
            .build()
        })?;
        if parsed.code != 0 {
            return ApiSnafu {
                code: parsed.code,
                message: parsed.msg,
                retryable: is_busy_code(parsed.code),
            }
            .fail();
        }

        let klines = parsed.data.unwrap_or_default();
        let page_len = klines.len();
        let mut bars = Vec::with_capacity(page_len);
        for k in klines {
            let timestamp = millis_to_utc(k.time).ok_or_else(|| {
                DecodeSnafu {
                    message: format!("kline time {} out of range", k.time),
                }
                .build()
            })?;
            bars.push(Bar {
                timestamp,
                open: k.open,
                high: k.high,
                low: k.low,
                close: k.close,
                volume: k.base_vol,
                source: SOURCE.to_string(),
            });
        }

        // the exchange may answer newest-first
        bars.sort_by_key(|b| b.timestamp);
        let latest = bars.last().map(|b| b.timestamp);
        let next = next_cursor(request, latest, page_len);
        debug!(
            symbol = %request.symbol,
            start_ms,
            bars = page_len,
            next_cursor = ?next,
            "bitunix page fetched"
        );

        Ok(BarPage {
            bars,
            next_cursor: next,
        })
    }
}
