//! Bar interval (`amount × unit`) shared by providers, the pipeline and storage.
//!
//! ```
//! use bar_ingestor::models::timeframe::{TimeFrame, TimeFrameUnit};
//!
//! let tf: TimeFrame = "5m".parse().unwrap();
//! assert_eq!(tf.amount(), 5);
//! assert_eq!(tf.unit(), TimeFrameUnit::Minute);
//! assert_eq!(tf.to_string(), "5m");
//! ```

use std::{fmt, num::NonZeroU32, str::FromStr};

use chrono::Duration;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TimeFrameError {
    #[error("Invalid amount for {:?}: {}", unit, message)]
    InvalidAmount {
        unit: TimeFrameUnit,
        message: String,
    },

    #[error("Invalid input: {}", message)]
    InvalidInput { message: String },
}

/// Timeframe granularity. Weeks are Monday-based and months are calendar months, both in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TimeFrameUnit {
    Minute,
    Hour,
    Day,
    Week,
    Month,
}

/// A validated bar interval, e.g. 1 minute, 4 hours, 1 day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeFrame {
    amount: NonZeroU32,
    unit: TimeFrameUnit,
}

impl TimeFrame {
    pub fn new(amount: u32, unit: TimeFrameUnit) -> Result<Self, TimeFrameError> {
        Self::validate(amount, unit)?;
        let amount = NonZeroU32::new(amount).ok_or(TimeFrameError::InvalidAmount {
            unit,
            message: "amount must be greater than zero".into(),
        })?;
        Ok(Self { amount, unit })
    }

    fn validate(amount: u32, unit: TimeFrameUnit) -> Result<(), TimeFrameError> {
        match unit {
            TimeFrameUnit::Minute if !(1..=59).contains(&amount) => {
                Err(TimeFrameError::InvalidAmount {
                    unit,
                    message: "Minute units can only be used with amounts between 1-59.".into(),
                })
            }
            TimeFrameUnit::Hour if !(1..=23).contains(&amount) => {
                Err(TimeFrameError::InvalidAmount {
                    unit,
                    message: "Hour units can only be used with amounts 1-23".into(),
                })
            }
            TimeFrameUnit::Day | TimeFrameUnit::Week if amount != 1 => {
                Err(TimeFrameError::InvalidAmount {
                    unit,
                    message: "Day and Week units can only be used with amount 1".into(),
                })
            }
            TimeFrameUnit::Month if ![1, 2, 3, 6, 12].contains(&amount) => {
                Err(TimeFrameError::InvalidAmount {
                    unit,
                    message: "Month units can only be used with amount 1, 2, 3, 6 and 12".into(),
                })
            }
            _ => Ok(()),
        }
    }

    pub fn minutes(amount: u32) -> Result<Self, TimeFrameError> {
        Self::new(amount, TimeFrameUnit::Minute)
    }

    pub fn hours(amount: u32) -> Result<Self, TimeFrameError> {
        Self::new(amount, TimeFrameUnit::Hour)
    }

    pub fn day() -> Self {
        Self {
            amount: NonZeroU32::MIN,
            unit: TimeFrameUnit::Day,
        }
    }

    pub fn week() -> Self {
        Self {
            amount: NonZeroU32::MIN,
            unit: TimeFrameUnit::Week,
        }
    }

    pub fn months(amount: u32) -> Result<Self, TimeFrameError> {
        Self::new(amount, TimeFrameUnit::Month)
    }

    pub const fn amount(&self) -> u32 {
        self.amount.get()
    }

    pub const fn unit(&self) -> TimeFrameUnit {
        self.unit
    }

    /// Width of one bar, or `None` for month-based frames whose width varies.
    pub fn fixed_duration(&self) -> Option<Duration> {
        let a = i64::from(self.amount.get());
        match self.unit {
            TimeFrameUnit::Minute => Some(Duration::minutes(a)),
            TimeFrameUnit::Hour => Some(Duration::hours(a)),
            TimeFrameUnit::Day => Some(Duration::days(a)),
            TimeFrameUnit::Week => Some(Duration::weeks(a)),
            TimeFrameUnit::Month => None,
        }
    }
}

/// Compact form used on the CLI, in config files and in the database: `5m`, `4h`, `1D`, `1W`, `3M`.
impl fmt::Display for TimeFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let u = match self.unit {
            TimeFrameUnit::Minute => "m",
            TimeFrameUnit::Hour => "h",
            TimeFrameUnit::Day => "D",
            TimeFrameUnit::Week => "W",
            TimeFrameUnit::Month => "M",
        };
        write!(f, "{}{u}", self.amount.get())
    }
}

impl FromStr for TimeFrame {
    type Err = TimeFrameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let split = s
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(|| TimeFrameError::InvalidInput {
                message: format!("missing unit in timeframe '{s}'"),
            })?;
        let (digits, unit) = s.split_at(split);
        let amount: u32 = if digits.is_empty() {
            1
        } else {
            digits.parse().map_err(|_| TimeFrameError::InvalidInput {
                message: format!("bad amount in timeframe '{s}'"),
            })?
        };
        // Case matters for the single-letter forms: `m` is minute, `M` is month.
        let unit = match unit {
            "m" | "min" | "minute" => TimeFrameUnit::Minute,
            "h" | "H" | "hr" | "hour" => TimeFrameUnit::Hour,
            "d" | "D" | "day" => TimeFrameUnit::Day,
            "w" | "W" | "wk" | "week" => TimeFrameUnit::Week,
            "M" | "mo" | "month" => TimeFrameUnit::Month,
            other => {
                return Err(TimeFrameError::InvalidInput {
                    message: format!("Invalid timeframe unit: {other}"),
                });
            }
        };
        Self::new(amount, unit)
    }
}

impl Serialize for TimeFrame {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TimeFrame {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
