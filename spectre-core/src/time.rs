//! Timestamp normalisation and hour bucketing.
//!
//! Every component stores time as Unix nanoseconds. Inputs arrive in four
//! accepted shapes (Unix seconds, milliseconds, nanoseconds, or RFC3339
//! strings) and are normalised here, once, at the edge.

use chrono::{DateTime, Datelike, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// A Unix timestamp in nanoseconds
///
/// Integer inputs are disambiguated by digit count: 10 digits are seconds,
/// 13 are milliseconds, 19 are nanoseconds. Anything else must be RFC3339.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[serde(transparent)]
pub struct Timestamp(pub i64);

const NANOS_PER_SEC: i64 = 1_000_000_000;
const NANOS_PER_MILLI: i64 = 1_000_000;

impl Timestamp {
    /// Construct from raw nanoseconds
    #[must_use]
    pub fn from_nanos(ns: i64) -> Self {
        Timestamp(ns)
    }

    /// Construct from Unix seconds
    #[must_use]
    pub fn from_secs(s: i64) -> Self {
        Timestamp(s * NANOS_PER_SEC)
    }

    /// The current instant
    #[must_use]
    pub fn now() -> Self {
        Timestamp(Utc::now().timestamp_nanos_opt().unwrap_or(i64::MAX))
    }

    /// Raw nanoseconds
    #[must_use]
    pub fn as_nanos(&self) -> i64 {
        self.0
    }

    /// Whole Unix seconds, truncated
    #[must_use]
    pub fn as_secs(&self) -> i64 {
        self.0 / NANOS_PER_SEC
    }

    /// Parse a numeric timestamp, disambiguating by digit count
    pub fn from_unix_digits(n: i64) -> Result<Self> {
        let digits = if n <= 0 {
            return Err(Error::Validation(format!("timestamp must be positive, got {n}")));
        } else {
            n.ilog10() + 1
        };
        match digits {
            10 => Ok(Timestamp(n * NANOS_PER_SEC)),
            13 => Ok(Timestamp(n * NANOS_PER_MILLI)),
            19 => Ok(Timestamp(n)),
            d => Err(Error::Validation(format!(
                "ambiguous {d}-digit timestamp {n}: expected 10 (s), 13 (ms) or 19 (ns) digits"
            ))),
        }
    }

    /// Parse a timestamp from either numeric digits or an RFC3339 string
    pub fn parse(input: &str) -> Result<Self> {
        if let Ok(n) = input.parse::<i64>() {
            return Self::from_unix_digits(n);
        }
        let dt = DateTime::parse_from_rfc3339(input)
            .map_err(|e| Error::Validation(format!("unparseable timestamp {input:?}: {e}")))?;
        dt.timestamp_nanos_opt()
            .map(Timestamp)
            .ok_or_else(|| Error::Validation(format!("timestamp {input:?} out of range")))
    }

    /// The hour bucket this timestamp falls into, as `YYYYMMDDHH` (UTC)
    #[must_use]
    pub fn hour_key(&self) -> String {
        let dt = Utc
            .timestamp_opt(self.as_secs(), 0)
            .single()
            .unwrap_or_else(|| Utc.timestamp_opt(0, 0).unwrap());
        format!(
            "{:04}{:02}{:02}{:02}",
            dt.year(),
            dt.month(),
            dt.day(),
            dt.hour()
        )
    }

    /// Start of the hour bucket containing this timestamp
    #[must_use]
    pub fn hour_start(&self) -> Timestamp {
        const NANOS_PER_HOUR: i64 = 3600 * NANOS_PER_SEC;
        Timestamp(self.0 - self.0.rem_euclid(NANOS_PER_HOUR))
    }

    /// Round down to a 30 second boundary, used by upstream handlers for
    /// cacheable request windows
    #[must_use]
    pub fn bucket_30s(&self) -> Timestamp {
        const NANOS_PER_BUCKET: i64 = 30 * NANOS_PER_SEC;
        Timestamp(self.0 - self.0.rem_euclid(NANOS_PER_BUCKET))
    }

    /// Render as RFC3339 with nanosecond precision
    #[must_use]
    pub fn to_rfc3339(&self) -> String {
        let secs = self.0.div_euclid(NANOS_PER_SEC);
        let nanos = self.0.rem_euclid(NANOS_PER_SEC) as u32;
        Utc.timestamp_opt(secs, nanos)
            .single()
            .map(|dt| dt.to_rfc3339_opts(chrono::SecondsFormat::Nanos, true))
            .unwrap_or_default()
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::ops::Add<std::time::Duration> for Timestamp {
    type Output = Timestamp;

    fn add(self, rhs: std::time::Duration) -> Timestamp {
        Timestamp(self.0.saturating_add(rhs.as_nanos() as i64))
    }
}

impl std::ops::Sub<std::time::Duration> for Timestamp {
    type Output = Timestamp;

    fn sub(self, rhs: std::time::Duration) -> Timestamp {
        Timestamp(self.0.saturating_sub(rhs.as_nanos() as i64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digit_count_disambiguates_units() {
        let secs = Timestamp::parse("1700000000").unwrap();
        let millis = Timestamp::parse("1700000000000").unwrap();
        let nanos = Timestamp::parse("1700000000000000000").unwrap();
        assert_eq!(secs, millis);
        assert_eq!(millis, nanos);
        assert_eq!(nanos.as_nanos(), 1_700_000_000_000_000_000);
    }

    #[test]
    fn rfc3339_roundtrips() {
        let ts = Timestamp::parse("2023-11-14T22:13:20Z").unwrap();
        assert_eq!(ts.as_nanos(), 1_700_000_000_000_000_000);
        assert_eq!(Timestamp::parse(&ts.to_rfc3339()).unwrap(), ts);
    }

    #[test]
    fn rejects_ambiguous_and_negative_inputs() {
        assert!(Timestamp::parse("12345").is_err());
        assert!(Timestamp::parse("-1700000000").is_err());
        assert!(Timestamp::parse("not-a-time").is_err());
    }

    #[test]
    fn hour_key_is_utc_hour() {
        let ts = Timestamp::parse("2023-11-14T22:13:20Z").unwrap();
        assert_eq!(ts.hour_key(), "2023111422");
        assert_eq!(ts.hour_start().as_secs() % 3600, 0);
        assert_eq!(ts.hour_start().hour_key(), ts.hour_key());
    }

    #[test]
    fn bucket_rounds_down() {
        let ts = Timestamp::from_secs(1_700_000_014);
        assert_eq!(ts.bucket_30s().as_secs(), 1_700_000_010);
    }
}
