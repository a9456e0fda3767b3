//! The synchronisation watermark.
//!
//! Everything modified at or before the watermark has been reconciled. It is
//! serialised in the `YYYYMMDDHHMMSSZ` form the account page accepts in its
//! `modified/<timestamp>` filters.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{CoreError, CoreResult};

/// Format written to disk and sent to the account page.
pub const WATERMARK_FORMAT: &str = "%Y%m%d%H%M%SZ";

/// Older, minute-precision form still found in some timestamp files.
const WATERMARK_FORMAT_MINUTES: &str = "%Y%m%d%H%MZ";

/// Last successfully synchronised instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Watermark(DateTime<Utc>);

impl Watermark {
    /// Wrap an instant, truncated to whole seconds.
    #[must_use]
    pub fn new(instant: DateTime<Utc>) -> Self {
        let secs = instant.timestamp();
        Self(DateTime::from_timestamp(secs, 0).unwrap_or(instant))
    }

    /// The default used when no watermark could be read: 2009-01-01T00:00:00Z.
    #[must_use]
    pub fn far_past() -> Self {
        let instant = NaiveDate::from_ymd_opt(2009, 1, 1)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map_or(DateTime::<Utc>::MIN_UTC, |naive| naive.and_utc());
        Self(instant)
    }

    /// Parse the on-disk representation.
    pub fn parse(value: &str) -> CoreResult<Self> {
        let trimmed = value.trim();
        NaiveDateTime::parse_from_str(trimmed, WATERMARK_FORMAT)
            .or_else(|_| NaiveDateTime::parse_from_str(trimmed, WATERMARK_FORMAT_MINUTES))
            .map(|naive| Self(naive.and_utc()))
            .map_err(|_| CoreError::InvalidWatermark {
                value: value.to_string(),
            })
    }

    /// The underlying instant.
    #[must_use]
    pub fn instant(&self) -> DateTime<Utc> {
        self.0
    }

    /// The next watermark given a candidate: never moves backwards.
    #[must_use]
    pub fn advance_to(&self, candidate: Watermark) -> Watermark {
        (*self).max(candidate)
    }
}

impl fmt::Display for Watermark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(WATERMARK_FORMAT))
    }
}

impl FromStr for Watermark {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Watermark {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Watermark> for String {
    fn from(watermark: Watermark) -> Self {
        watermark.to_string()
    }
}
