//! Report windows and bucketing
//!
//! A report window is the half-open interval `[start, end)` a report covers,
//! plus the timezone used to interpret offset-less dates and to truncate
//! timestamps into week or month buckets.

use crate::error::ReportError;
use crate::normalizer::{local_to_utc, normalize};
use crate::types::{Bucket, Granularity, RawTimestamp, WindowEcho};
use chrono::{DateTime, Datelike, Duration, NaiveDate, SecondsFormat, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// Length of the default rolling window
pub const DEFAULT_LOOKBACK_WEEKS: i64 = 12;

/// Timezone of the default fixed window
pub const FIXED_WINDOW_TZ: &str = "Asia/Singapore";

/// How the window of a request is chosen
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum WindowMode {
    /// Same window for every request; request parameters are ignored
    Fixed {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        timezone: String,
    },
    /// Window derived from `from`/`to`/`year` request parameters
    Parameterized { timezone: String },
}

/// 2025-06-16T00:00:00+08:00
const FIXED_WINDOW_START_SECS: i64 = 1_750_003_200;
/// 2025-08-11T00:00:00+08:00
const FIXED_WINDOW_END_SECS: i64 = 1_754_841_600;

impl Default for WindowMode {
    /// Eight Mon-Sun weeks: 16 Jun 2025 up to (not including) 11 Aug 2025, SGT
    fn default() -> Self {
        let (start, end) = Self::default_fixed_range();
        WindowMode::Fixed {
            start,
            end,
            timezone: FIXED_WINDOW_TZ.to_string(),
        }
    }
}

impl WindowMode {
    /// Bounds of the default fixed window
    pub fn default_fixed_range() -> (DateTime<Utc>, DateTime<Utc>) {
        (
            DateTime::from_timestamp(FIXED_WINDOW_START_SECS, 0).unwrap_or_default(),
            DateTime::from_timestamp(FIXED_WINDOW_END_SECS, 0).unwrap_or_default(),
        )
    }

    pub fn timezone(&self) -> &str {
        match self {
            WindowMode::Fixed { timezone, .. } | WindowMode::Parameterized { timezone } => timezone,
        }
    }
}

/// Window-related request parameters
#[derive(Debug, Clone, Copy, Default)]
pub struct WindowParams<'a> {
    pub from: Option<&'a str>,
    pub to: Option<&'a str>,
    pub year: Option<&'a str>,
}

/// Resolved window for one request
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReportWindow {
    pub start: DateTime<Utc>,
    /// Exclusive
    pub end: DateTime<Utc>,
    pub timezone: Tz,
}

impl ReportWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>, timezone: Tz) -> Result<Self, ReportError> {
        if start >= end {
            return Err(ReportError::InvalidParameter(format!(
                "window start {} must be before end {}",
                start.to_rfc3339_opts(SecondsFormat::Secs, true),
                end.to_rfc3339_opts(SecondsFormat::Secs, true)
            )));
        }
        Ok(Self {
            start,
            end,
            timezone,
        })
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.start && at < self.end
    }

    /// Bucket `at` using this window's timezone
    pub fn bucket(&self, at: DateTime<Utc>, granularity: Granularity) -> Option<Bucket> {
        bucket_of(at, granularity, self.timezone)
    }

    pub fn echo(&self) -> WindowEcho {
        WindowEcho {
            start: self.start.to_rfc3339_opts(SecondsFormat::Secs, true),
            end: self.end.to_rfc3339_opts(SecondsFormat::Secs, true),
            timezone: self.timezone.name().to_string(),
        }
    }
}

/// Parse an IANA timezone name
pub fn parse_timezone(name: &str) -> Result<Tz, ReportError> {
    name.trim()
        .parse::<Tz>()
        .map_err(|_| ReportError::InvalidTimezone(name.to_string()))
}

/// Resolve the window for a request.
pub fn resolve(
    params: &WindowParams<'_>,
    mode: &WindowMode,
    now: DateTime<Utc>,
) -> Result<ReportWindow, ReportError> {
    match mode {
        WindowMode::Fixed {
            start,
            end,
            timezone,
        } => ReportWindow::new(*start, *end, parse_timezone(timezone)?),
        WindowMode::Parameterized { timezone } => {
            let tz = parse_timezone(timezone)?;
            let from = params.from.map(str::trim).filter(|s| !s.is_empty());
            let to = params.to.map(str::trim).filter(|s| !s.is_empty());
            let year = params.year.map(str::trim).filter(|s| !s.is_empty());

            if from.is_some() || to.is_some() {
                let end = match to {
                    Some(s) => parse_bound("to", s, tz)?,
                    None => now,
                };
                let start = match from {
                    Some(s) => parse_bound("from", s, tz)?,
                    None => end - Duration::weeks(DEFAULT_LOOKBACK_WEEKS),
                };
                ReportWindow::new(start, end, tz)
            } else if let Some(y) = year {
                let (start, end) = calendar_year(y)?;
                ReportWindow::new(start, end, chrono_tz::UTC)
            } else {
                ReportWindow::new(now - Duration::weeks(DEFAULT_LOOKBACK_WEEKS), now, tz)
            }
        }
    }
}

fn parse_bound(name: &str, value: &str, tz: Tz) -> Result<DateTime<Utc>, ReportError> {
    normalize(&RawTimestamp::Text(value.to_string()), tz).ok_or_else(|| {
        ReportError::InvalidParameter(format!("'{name}' is not a valid ISO date: {value}"))
    })
}

fn calendar_year(raw: &str) -> Result<(DateTime<Utc>, DateTime<Utc>), ReportError> {
    let invalid = || ReportError::InvalidParameter(format!("'year' must be a four-digit year: {raw}"));
    let year: i32 = raw.parse().map_err(|_| invalid())?;
    if !(1..=9998).contains(&year) {
        return Err(invalid());
    }
    let start = Utc.with_ymd_and_hms(year, 1, 1, 0, 0, 0).single().ok_or_else(invalid)?;
    let end = Utc
        .with_ymd_and_hms(year + 1, 1, 1, 0, 0, 0)
        .single()
        .ok_or_else(invalid)?;
    Ok((start, end))
}

/// Truncate `at` to its bucket in `tz`. Weeks start on Monday.
pub fn bucket_of(at: DateTime<Utc>, granularity: Granularity, tz: Tz) -> Option<Bucket> {
    let local_date = at.with_timezone(&tz).date_naive();
    match granularity {
        Granularity::Week => Some(Bucket::Week {
            start: local_midnight(monday_of(local_date), tz)?,
        }),
        Granularity::IsoWeek => {
            let iso = local_date.iso_week();
            Some(Bucket::IsoWeek {
                year: iso.year(),
                week: iso.week(),
                start: local_midnight(monday_of(local_date), tz)?,
            })
        }
        Granularity::Month => Some(Bucket::Month {
            start: local_midnight(local_date.with_day(1)?, tz)?,
        }),
    }
}

fn monday_of(date: NaiveDate) -> NaiveDate {
    date - Duration::days(date.weekday().num_days_from_monday() as i64)
}

fn local_midnight(date: NaiveDate, tz: Tz) -> Option<DateTime<Utc>> {
    local_to_utc(date.and_hms_opt(0, 0, 0)?, tz)
}

impl Bucket {
    /// Chart label, formatted from the bucket start in `tz`
    pub fn label(&self, tz: Tz) -> String {
        let local = self.start().with_timezone(&tz);
        match self {
            Bucket::IsoWeek { year, week, .. } => format!("Week {week}, {year}"),
            Bucket::Week { .. } => local.format("Week of %d %b %Y").to_string(),
            Bucket::Month { .. } => local.format("%b %Y").to_string(),
        }
    }
}
