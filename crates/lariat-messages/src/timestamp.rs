//! Envelope timestamps.
//!
//! Timestamps are held at millisecond precision in UTC, the same precision they
//! are written with, so a message rebuilt from its wire form compares equal to
//! the original. A value that does not parse is kept verbatim so validation can
//! report it.

use chrono::{DateTime, NaiveDateTime, SubsecRound, Utc};
use std::fmt;

/// Wire format: ISO-8601 with milliseconds and an explicit UTC offset.
const WIRE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f+00:00";

#[derive(Debug, Clone)]
pub enum Timestamp {
    Valid(DateTime<Utc>),
    /// Raw input that is not an ISO-8601 timestamp. Empty when the field was absent.
    Invalid(String),
}

impl Timestamp {
    pub fn now() -> Self {
        Self::from_datetime(Utc::now())
    }

    pub fn from_datetime(at: DateTime<Utc>) -> Self {
        Self::Valid(at.trunc_subsecs(3))
    }

    /// Parse a strict ISO-8601 timestamp: `YYYY-MM-DDTHH:MM:SS`, an optional
    /// fraction, then `Z`, `±HH:MM`, `±HHMM` or nothing. Inputs without an
    /// offset are taken as UTC.
    pub fn parse(raw: &str) -> Self {
        if !is_iso8601(raw) {
            return Self::Invalid(raw.to_string());
        }
        if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
            return Self::from_datetime(at.with_timezone(&Utc));
        }
        if let Ok(at) = DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f%z") {
            return Self::from_datetime(at.with_timezone(&Utc));
        }
        if let Ok(at) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
            return Self::from_datetime(at.and_utc());
        }
        Self::Invalid(raw.to_string())
    }

    pub fn as_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Valid(at) => Some(*at),
            Self::Invalid(_) => None,
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid(_))
    }

    /// Wire rendering. Invalid values are written back as they came in.
    pub fn render(&self) -> String {
        match self {
            Self::Valid(at) => at.format(WIRE_FORMAT).to_string(),
            Self::Invalid(raw) => raw.clone(),
        }
    }
}

fn is_iso8601(raw: &str) -> bool {
    let bytes = raw.as_bytes();
    let digits = |range: std::ops::Range<usize>| {
        bytes.get(range).is_some_and(|b| b.iter().all(u8::is_ascii_digit))
    };
    let date_time = digits(0..4)
        && bytes.get(4) == Some(&b'-')
        && digits(5..7)
        && bytes.get(7) == Some(&b'-')
        && digits(8..10)
        && bytes.get(10) == Some(&b'T')
        && digits(11..13)
        && bytes.get(13) == Some(&b':')
        && digits(14..16)
        && bytes.get(16) == Some(&b':')
        && digits(17..19);
    if !date_time {
        return false;
    }

    let mut rest = &bytes[19..];
    if let Some(fraction) = rest.strip_prefix(b".") {
        let len = fraction.iter().take_while(|b| b.is_ascii_digit()).count();
        if len == 0 {
            return false;
        }
        rest = &fraction[len..];
    }
    match rest {
        [] | [b'Z'] => true,
        [sign, h1, h2, b':', m1, m2] | [sign, h1, h2, m1, m2] => {
            matches!(*sign, b'+' | b'-') && [h1, h2, m1, m2].iter().all(|b| b.is_ascii_digit())
        }
        _ => false,
    }
}

impl PartialEq for Timestamp {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Valid(a), Self::Valid(b)) => a == b,
            (Self::Invalid(a), Self::Invalid(b)) => a == b,
            _ => false,
        }
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(at: DateTime<Utc>) -> Self {
        Self::from_datetime(at)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}
