//! Pipeline configuration: TOML parsing, defaults and range validation.
//!
//! Every option has a default, so an empty file is a valid configuration.
//! Unknown keys are rejected and every numeric option is range-checked at load,
//! so a typo or an absurd threshold fails before any data is fetched.
//!
//! ```toml
//! enable_bad_tick_filter = true
//! bad_tick_wick_threshold_pct = 10.0
//! bad_tick_volume_confirmation_margin = 2.0
//! bad_tick_rolling_window = 20
//! bad_tick_repair_mode = "interpolate"
//! enable_ohlc_validation_post_hoc = true
//! page_size = 200
//! lock_ttl_secs = 600
//!
//! [retry]
//! max_retries = 3
//! base_delay_ms = 1000
//! max_delay_ms = 30000
//!
//! [asset_class_overrides.crypto]
//! bad_tick_wick_threshold_pct = 25.0
//! ```

use std::{fs, path::Path, time::Duration};

use indexmap::IndexMap;
use rust_decimal::{Decimal, prelude::FromPrimitive};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    ingest::retry::RetryPolicy,
    models::asset::AssetClass,
    quality::bad_tick::{BadTickSettings, RepairMode},
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("{key} = {value} is out of range ({expected})")]
    OutOfRange {
        key: String,
        value: String,
        expected: &'static str,
    },
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub enable_bad_tick_filter: bool,
    /// Wick size, in percent of the body edge price, above which a side is extreme.
    pub bad_tick_wick_threshold_pct: f64,
    /// A bar whose volume reaches `rolling average × margin` is a confirmed move.
    pub bad_tick_volume_confirmation_margin: f64,
    pub bad_tick_rolling_window: usize,
    pub bad_tick_repair_mode: RepairMode,
    /// Sweep the ingested series with the post-hoc validator after each run.
    pub enable_ohlc_validation_post_hoc: bool,
    /// Bars requested per provider call.
    pub page_size: u32,
    /// Rows per page when the post-hoc validator streams the store.
    pub post_hoc_batch_size: usize,
    /// How long a persisted symbol lock survives without renewal; a crashed
    /// run's lock frees itself after this.
    pub lock_ttl_secs: u64,
    pub retry: RetryConfig,
    pub asset_class_overrides: IndexMap<AssetClass, AssetClassOverride>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            enable_bad_tick_filter: true,
            bad_tick_wick_threshold_pct: 10.0,
            bad_tick_volume_confirmation_margin: 2.0,
            bad_tick_rolling_window: 20,
            bad_tick_repair_mode: RepairMode::Interpolate,
            enable_ohlc_validation_post_hoc: true,
            page_size: 200,
            post_hoc_batch_size: 1000,
            lock_ttl_secs: 600,
            retry: RetryConfig::default(),
            asset_class_overrides: IndexMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
        }
    }
}

/// Per-asset-class tuning; unset fields fall back to the top-level values.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AssetClassOverride {
    pub bad_tick_wick_threshold_pct: Option<f64>,
    pub bad_tick_volume_confirmation_margin: Option<f64>,
}

impl PipelineConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let cfg: PipelineConfig = toml::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_pct("bad_tick_wick_threshold_pct", self.bad_tick_wick_threshold_pct)?;
        check_margin(
            "bad_tick_volume_confirmation_margin",
            self.bad_tick_volume_confirmation_margin,
        )?;
        check(
            "bad_tick_rolling_window",
            self.bad_tick_rolling_window,
            (1..=1000).contains(&self.bad_tick_rolling_window),
            "1..=1000",
        )?;
        check(
            "page_size",
            self.page_size,
            (1..=1000).contains(&self.page_size),
            "1..=1000",
        )?;
        check(
            "post_hoc_batch_size",
            self.post_hoc_batch_size,
            (1..=100_000).contains(&self.post_hoc_batch_size),
            "1..=100000",
        )?;
        check(
            "lock_ttl_secs",
            self.lock_ttl_secs,
            (30..=86_400).contains(&self.lock_ttl_secs),
            "30..=86400",
        )?;
        check(
            "retry.max_retries",
            self.retry.max_retries,
            self.retry.max_retries <= 10,
            "0..=10",
        )?;
        check(
            "retry.base_delay_ms",
            self.retry.base_delay_ms,
            (1..=600_000).contains(&self.retry.base_delay_ms),
            "1..=600000",
        )?;
        check(
            "retry.max_delay_ms",
            self.retry.max_delay_ms,
            self.retry.max_delay_ms >= self.retry.base_delay_ms
                && self.retry.max_delay_ms <= 3_600_000,
            "retry.base_delay_ms..=3600000",
        )?;
        for (class, o) in &self.asset_class_overrides {
            if let Some(v) = o.bad_tick_wick_threshold_pct {
                check_pct(
                    &format!("asset_class_overrides.{class}.bad_tick_wick_threshold_pct"),
                    v,
                )?;
            }
            if let Some(v) = o.bad_tick_volume_confirmation_margin {
                check_margin(
                    &format!("asset_class_overrides.{class}.bad_tick_volume_confirmation_margin"),
                    v,
                )?;
            }
        }
        Ok(())
    }

    /// Filter settings for one asset class, overrides applied.
    pub fn bad_tick_settings(&self, class: AssetClass) -> BadTickSettings {
        let o = self.asset_class_overrides.get(&class);
        let threshold = o
            .and_then(|o| o.bad_tick_wick_threshold_pct)
            .unwrap_or(self.bad_tick_wick_threshold_pct);
        let margin = o
            .and_then(|o| o.bad_tick_volume_confirmation_margin)
            .unwrap_or(self.bad_tick_volume_confirmation_margin);
        let defaults = BadTickSettings::default();
        BadTickSettings {
            // validated finite and in range, so the conversion cannot fail
            wick_threshold_pct: Decimal::from_f64(threshold).unwrap_or(defaults.wick_threshold_pct),
            volume_confirmation_margin: Decimal::from_f64(margin)
                .unwrap_or(defaults.volume_confirmation_margin),
            rolling_window: self.bad_tick_rolling_window,
            repair_mode: self.bad_tick_repair_mode,
        }
    }

    pub fn lock_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.lock_ttl_secs.min(86_400) as i64)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.retry.max_retries,
            base_delay: Duration::from_millis(self.retry.base_delay_ms),
            max_delay: Duration::from_millis(self.retry.max_delay_ms),
        }
    }
}

fn check(
    key: &str,
    value: impl ToString,
    ok: bool,
    expected: &'static str,
) -> Result<(), ConfigError> {
    if ok {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            key: key.to_string(),
            value: value.to_string(),
            expected,
        })
    }
}

fn check_pct(key: &str, v: f64) -> Result<(), ConfigError> {
    check(key, v, v.is_finite() && v > 0.0 && v <= 1000.0, "(0, 1000]")
}

fn check_margin(key: &str, v: f64) -> Result<(), ConfigError> {
    check(key, v, v.is_finite() && v > 0.0 && v <= 100.0, "(0, 100]")
}
