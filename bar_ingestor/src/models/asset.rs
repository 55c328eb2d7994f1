use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// Market segment a symbol trades in; selects per-class bad-tick tuning.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetClass {
    #[default]
    Crypto,
    UsEquity,
    Futures,
}

impl AssetClass {
    pub const fn as_str(&self) -> &'static str {
        match self {
            AssetClass::Crypto => "crypto",
            AssetClass::UsEquity => "us_equity",
            AssetClass::Futures => "futures",
        }
    }
}

impl fmt::Display for AssetClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssetClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "crypto" => Ok(AssetClass::Crypto),
            "us_equity" | "equity" | "stock" => Ok(AssetClass::UsEquity),
            "futures" | "future" => Ok(AssetClass::Futures),
            other => Err(format!("unknown asset class '{other}'")),
        }
    }
}
