//! Field normalization
//!
//! Documents store dates and amounts in whatever shape the writer happened to
//! use. This module turns them into canonical values:
//! - Timestamps become UTC instants, or `None` when they cannot be trusted
//! - Amounts become `f64`, defaulting to zero
//! - Visit counters become integers when they parse

use crate::types::{RawNumber, RawTimestamp};
use chrono::{DateTime, Duration, LocalResult, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;

/// Largest epoch value (ms) chrono can represent comfortably
const MAX_EPOCH_MILLIS: f64 = 8.64e15;

const OFFSET_FORMATS: [&str; 6] = [
    "%Y-%m-%dT%H:%M:%S%.f%#z",
    "%Y-%m-%d %H:%M:%S%.f%#z",
    "%Y-%m-%dT%H:%M%#z",
    "%Y-%m-%d %H:%M%#z",
    "%Y-%m-%dT%H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M:%S%.f%:z",
];

const LOCAL_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Normalizer for loosely-typed document fields
pub struct Normalizer;

impl Normalizer {
    /// Normalize a stored date into a UTC instant.
    ///
    /// Strings without an explicit offset are read as wall-clock time in
    /// `assumed_tz`, not UTC.
    pub fn timestamp(raw: &RawTimestamp, assumed_tz: Tz) -> Option<DateTime<Utc>> {
        match raw {
            RawTimestamp::Native(dt) => Some(*dt),
            RawTimestamp::EpochMillis(ms) => from_epoch_millis(*ms),
            RawTimestamp::Text(s) => parse_text(s, assumed_tz),
            RawTimestamp::Missing | RawTimestamp::Unsupported(_) => None,
        }
    }

    /// Coerce an amount field. Anything unusable counts as zero.
    pub fn amount(raw: &RawNumber) -> f64 {
        let value = match raw {
            RawNumber::Int(n) => *n as f64,
            RawNumber::Double(v) => *v,
            RawNumber::Decimal(s) | RawNumber::Text(s) => s.trim().parse::<f64>().unwrap_or(0.0),
            RawNumber::Missing | RawNumber::Unsupported(_) => 0.0,
        };
        if value.is_finite() {
            value
        } else {
            0.0
        }
    }

    /// Coerce a counter field (e.g. `totalVisits`) to an integer.
    pub fn count(raw: &RawNumber) -> Option<i64> {
        match raw {
            RawNumber::Int(n) => Some(*n),
            RawNumber::Double(v) if v.is_finite() => Some(v.trunc() as i64),
            RawNumber::Double(_) => None,
            RawNumber::Text(s) => s.trim().parse::<i64>().ok(),
            RawNumber::Decimal(s) => s
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .map(|v| v.trunc() as i64),
            RawNumber::Missing | RawNumber::Unsupported(_) => None,
        }
    }
}

/// Shorthand for [`Normalizer::timestamp`]
pub fn normalize(raw: &RawTimestamp, assumed_tz: Tz) -> Option<DateTime<Utc>> {
    Normalizer::timestamp(raw, assumed_tz)
}

/// Shorthand for [`Normalizer::amount`]
pub fn coerce_amount(raw: &RawNumber) -> f64 {
    Normalizer::amount(raw)
}

/// Shorthand for [`Normalizer::count`]
pub fn coerce_count(raw: &RawNumber) -> Option<i64> {
    Normalizer::count(raw)
}

/// Resolve a local wall-clock time in `tz` to a UTC instant.
///
/// Folded times take the earlier instant; times inside a DST gap are moved
/// forward by one hour.
pub fn local_to_utc(naive: NaiveDateTime, tz: Tz) -> Option<DateTime<Utc>> {
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => Some(dt.with_timezone(&Utc)),
        LocalResult::Ambiguous(earliest, _) => Some(earliest.with_timezone(&Utc)),
        LocalResult::None => tz
            .from_local_datetime(&(naive + Duration::hours(1)))
            .earliest()
            .map(|dt| dt.with_timezone(&Utc)),
    }
}

fn from_epoch_millis(ms: f64) -> Option<DateTime<Utc>> {
    if !ms.is_finite() || ms.abs() > MAX_EPOCH_MILLIS {
        return None;
    }
    DateTime::from_timestamp_millis(ms.trunc() as i64)
}

fn parse_text(raw: &str, assumed_tz: Tz) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    if has_explicit_offset(s) {
        return parse_absolute(s);
    }

    for fmt in LOCAL_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return local_to_utc(naive, assumed_tz);
        }
    }

    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .and_then(|naive| local_to_utc(naive, assumed_tz))
}

/// `Z`/`z` suffix or a numeric offset after the date part
fn has_explicit_offset(s: &str) -> bool {
    if s.ends_with('Z') || s.ends_with('z') {
        return true;
    }
    match s.get(10..) {
        Some(time_part) => time_part.contains('+') || time_part.contains('-'),
        None => false,
    }
}

fn parse_absolute(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    let normalized = if s.ends_with('Z') || s.ends_with('z') {
        format!("{}+00:00", &s[..s.len() - 1])
    } else {
        s.to_string()
    };

    OFFSET_FORMATS
        .iter()
        .find_map(|fmt| DateTime::parse_from_str(&normalized, fmt).ok())
        .map(|dt| dt.with_timezone(&Utc))
}
