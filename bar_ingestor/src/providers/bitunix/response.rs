use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer};

/// Envelope every Bitunix REST response is wrapped in.
#[derive(Deserialize, Debug)]
pub struct BitunixResponse {
    pub code: i64,
    #[serde(default)]
    pub msg: String,
    #[serde(default)]
    pub data: Option<Vec<BitunixKline>>,
}

/// Envelope codes that mean "try again later": network error, too many
/// requests, request too frequent.
const BUSY_CODES: [i64; 3] = [10001, 10005, 10006];

pub fn is_busy_code(code: i64) -> bool {
    BUSY_CODES.contains(&code)
}

#[derive(Deserialize, Debug)]
pub struct BitunixKline {
    #[serde(deserialize_with = "flexible_i64")]
    pub time: i64,
    #[serde(deserialize_with = "flexible_decimal")]
    pub open: Decimal,
    #[serde(deserialize_with = "flexible_decimal")]
    pub high: Decimal,
    #[serde(deserialize_with = "flexible_decimal")]
    pub low: Decimal,
    #[serde(deserialize_with = "flexible_decimal")]
    pub close: Decimal,
    #[serde(rename = "baseVol", deserialize_with = "flexible_decimal")]
    pub base_vol: Decimal,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StrOrNum {
    Str(String),
    Num(serde_json::Number),
}

impl StrOrNum {
    fn text(&self) -> String {
        match self {
            StrOrNum::Str(s) => s.trim().to_string(),
            StrOrNum::Num(n) => n.to_string(),
        }
    }
}

fn flexible_decimal<'de, D: Deserializer<'de>>(d: D) -> Result<Decimal, D::Error> {
    let text = StrOrNum::deserialize(d)?.text();
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .map_err(|e| serde::de::Error::custom(format!("bad decimal '{text}': {e}")))
}

fn flexible_i64<'de, D: Deserializer<'de>>(d: D) -> Result<i64, D::Error> {
    let text = StrOrNum::deserialize(d)?.text();
    text.parse::<i64>()
        .map_err(|e| serde::de::Error::custom(format!("bad integer '{text}': {e}")))
}
