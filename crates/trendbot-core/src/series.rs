//! Price series and signal types.

use crate::{CoreError, Price};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One daily sample: session date and close price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bar {
    pub date: NaiveDate,
    pub close: Price,
}

impl Bar {
    pub fn new(date: NaiveDate, close: Price) -> Self {
        Self { date, close }
    }
}

/// Target position for an instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Signal {
    /// Close above its moving average: hold the instrument.
    Long,
    /// Anything else: hold nothing.
    #[default]
    Flat,
}

impl Signal {
    pub fn is_long(&self) -> bool {
        matches!(self, Self::Long)
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Long => write!(f, "LONG"),
            Self::Flat => write!(f, "FLAT"),
        }
    }
}

/// Parse a bar date as delivered by the feed.
///
/// Accepts `YYYYMMDD` (optionally followed by a time part, which is ignored)
/// and ISO `YYYY-MM-DD`.
pub fn parse_bar_date(raw: &str) -> crate::Result<NaiveDate> {
    let raw = raw.trim();
    let head = raw.split_whitespace().next().unwrap_or_default();

    if head.len() == 8 && head.bytes().all(|b| b.is_ascii_digit()) {
        return NaiveDate::parse_from_str(head, "%Y%m%d")
            .map_err(|e| CoreError::InvalidDate(format!("{raw}: {e}")));
    }

    NaiveDate::parse_from_str(head, "%Y-%m-%d")
        .map_err(|e| CoreError::InvalidDate(format!("{raw}: {e}")))
}
