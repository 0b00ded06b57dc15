//! Time handling utilities for ERA5 queries and coordinates.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Era5Error, Era5Result};

/// A user supplied datetime that may or may not carry an explicit offset.
///
/// Query bounds must be [`TimeInput::Zoned`]; keeping the naive case
/// representable lets callers hand raw input straight to validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeInput {
    Zoned(DateTime<FixedOffset>),
    Naive(NaiveDateTime),
}

impl TimeInput {
    /// The instant in UTC, or `None` when no offset was given.
    pub fn to_utc(&self) -> Option<DateTime<Utc>> {
        match self {
            TimeInput::Zoned(dt) => Some(dt.with_timezone(&Utc)),
            TimeInput::Naive(_) => None,
        }
    }

    /// The instant in UTC, reading a naive value as UTC wall time.
    pub fn assume_utc(&self) -> DateTime<Utc> {
        match self {
            TimeInput::Zoned(dt) => dt.with_timezone(&Utc),
            TimeInput::Naive(ndt) => Utc.from_utc_datetime(ndt),
        }
    }
}

impl<Tz: TimeZone> From<DateTime<Tz>> for TimeInput {
    fn from(dt: DateTime<Tz>) -> Self {
        TimeInput::Zoned(dt.fixed_offset())
    }
}

impl From<NaiveDateTime> for TimeInput {
    fn from(ndt: NaiveDateTime) -> Self {
        TimeInput::Naive(ndt)
    }
}

impl FromStr for TimeInput {
    type Err = Era5Error;

    /// Parse RFC 3339 (`2023-01-01T00:00:00Z`) or an offset-less ISO 8601
    /// datetime (`2023-01-01T00:00:00`, `2023-01-01 00:00`).
    fn from_str(s: &str) -> Era5Result<Self> {
        let s = s.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Ok(TimeInput::Zoned(dt));
        }

        for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"] {
            if let Ok(ndt) = NaiveDateTime::parse_from_str(s, fmt) {
                return Ok(TimeInput::Naive(ndt));
            }
        }

        Err(Era5Error::validation(
            "datetime",
            s,
            "an RFC 3339 datetime such as 2023-01-01T00:00:00Z",
        ))
    }
}

impl fmt::Display for TimeInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeInput::Zoned(dt) => write!(f, "{}", dt.to_rfc3339()),
            TimeInput::Naive(ndt) => write!(f, "{} (no timezone)", ndt),
        }
    }
}

/// Whether a UTC instant sits exactly on an hour boundary.
pub fn is_hour_aligned(dt: &DateTime<Utc>) -> bool {
    dt.minute() == 0 && dt.second() == 0 && dt.nanosecond() == 0
}

/// Midnight UTC at the start of the given date.
pub fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(chrono::NaiveTime::MIN))
}

/// Parse a `%Y-%m-%d` date attribute.
pub fn parse_date_attr(name: &str, value: &str) -> Era5Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|e| {
        Era5Error::format(format!("attribute {} = {:?} is not a %Y-%m-%d date: {}", name, value, e))
    })
}

/// CF time units of the form `hours since 1900-01-01[ 00:00:00[.0]]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HoursSinceUnits {
    pub epoch: DateTime<Utc>,
}

impl HoursSinceUnits {
    pub fn new(epoch: DateTime<Utc>) -> Self {
        Self { epoch }
    }

    /// Parse a CF `units` attribute. Only hourly units are accepted.
    pub fn parse(units: &str) -> Era5Result<Self> {
        let rest = units
            .trim()
            .strip_prefix("hours since ")
            .ok_or_else(|| Era5Error::format(format!("unsupported time units {:?}", units)))?;
        let rest = rest.trim();

        if let Ok(date) = NaiveDate::parse_from_str(rest, "%Y-%m-%d") {
            return Ok(Self::new(start_of_day(date)));
        }
        for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M"] {
            if let Ok(ndt) = NaiveDateTime::parse_from_str(rest, fmt) {
                return Ok(Self::new(Utc.from_utc_datetime(&ndt)));
            }
        }

        Err(Era5Error::format(format!("unsupported time units {:?}", units)))
    }

    pub fn to_datetime(&self, hours: i64) -> DateTime<Utc> {
        self.epoch + Duration::hours(hours)
    }

    pub fn to_hours(&self, dt: &DateTime<Utc>) -> i64 {
        (*dt - self.epoch).num_hours()
    }
}

impl fmt::Display for HoursSinceUnits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "hours since {}", self.epoch.format("%Y-%m-%d %H:%M:%S"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_zoned_and_naive() {
        let zoned: TimeInput = "2023-01-01T12:00:00+08:00".parse().unwrap();
        assert_eq!(
            zoned.to_utc().unwrap(),
            Utc.with_ymd_and_hms(2023, 1, 1, 4, 0, 0).unwrap()
        );

        let naive: TimeInput = "2023-01-01T12:00:00".parse().unwrap();
        assert!(matches!(naive, TimeInput::Naive(_)));
        assert!(naive.to_utc().is_none());
        assert_eq!(
            naive.assume_utc(),
            Utc.with_ymd_and_hms(2023, 1, 1, 12, 0, 0).unwrap()
        );

        assert!("yesterday".parse::<TimeInput>().is_err());
    }

    #[test]
    fn test_hour_alignment() {
        assert!(is_hour_aligned(&Utc.with_ymd_and_hms(2023, 1, 1, 12, 0, 0).unwrap()));
        assert!(!is_hour_aligned(&Utc.with_ymd_and_hms(2023, 1, 1, 12, 30, 0).unwrap()));
        let with_micros = Utc.with_ymd_and_hms(2023, 1, 1, 12, 0, 0).unwrap()
            + Duration::microseconds(1);
        assert!(!is_hour_aligned(&with_micros));
    }

    #[test]
    fn test_hours_since_units() {
        let units = HoursSinceUnits::parse("hours since 1900-01-01").unwrap();
        assert_eq!(units.epoch, Utc.with_ymd_and_hms(1900, 1, 1, 0, 0, 0).unwrap());
        assert_eq!(units.to_datetime(24), Utc.with_ymd_and_hms(1900, 1, 2, 0, 0, 0).unwrap());

        let units = HoursSinceUnits::parse("hours since 1970-01-01 00:00:00").unwrap();
        let dt = Utc.with_ymd_and_hms(1970, 1, 1, 5, 0, 0).unwrap();
        assert_eq!(units.to_hours(&dt), 5);

        assert!(HoursSinceUnits::parse("days since 1900-01-01").is_err());
    }
}
