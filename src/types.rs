//! Core types for the Vendor Pulse pipeline
//!
//! This module defines the data structures that flow through each stage of the
//! pipeline: decoded documents with their loosely-typed fields, buckets, report
//! kinds and the chart-ready payload handed back to callers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// 12-byte document identifier, rendered as 24 lowercase hex characters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId([u8; 12]);

impl ObjectId {
    /// Parse exactly 24 hex characters (either case)
    pub fn parse_str(s: &str) -> Option<Self> {
        let raw = s.as_bytes();
        if raw.len() != 24 {
            return None;
        }
        let mut bytes = [0u8; 12];
        for (i, pair) in raw.chunks(2).enumerate() {
            let hi = (pair[0] as char).to_digit(16)?;
            let lo = (pair[1] as char).to_digit(16)?;
            bytes[i] = (hi * 16 + lo) as u8;
        }
        Some(Self(bytes))
    }

    pub fn from_bytes(bytes: [u8; 12]) -> Self {
        Self(bytes)
    }

    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for ObjectId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ObjectId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        ObjectId::parse_str(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid ObjectId hex: {s}")))
    }
}

/// A reference to another document, stored either as a canonical ObjectId or
/// as its string form. Collections are inconsistent about which one they use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocRef {
    Oid(ObjectId),
    Str(String),
}

impl DocRef {
    /// Whether this reference points at `id`, whichever representation it uses
    pub fn refers_to(&self, id: &ObjectId) -> bool {
        match self {
            DocRef::Oid(oid) => oid == id,
            DocRef::Str(s) => s.trim().eq_ignore_ascii_case(&id.to_hex()),
        }
    }

    /// Stable string key used for ordering and lookups
    pub fn key(&self) -> String {
        match self {
            DocRef::Oid(oid) => oid.to_hex(),
            DocRef::Str(s) => s.trim().to_ascii_lowercase(),
        }
    }
}

impl fmt::Display for DocRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocRef::Oid(oid) => write!(f, "{oid}"),
            DocRef::Str(s) => f.write_str(s),
        }
    }
}

/// A date field as it appears in a stored document
#[derive(Debug, Clone, PartialEq)]
pub enum RawTimestamp {
    /// Native BSON date
    Native(DateTime<Utc>),
    /// ISO-8601-ish string, with or without an offset
    Text(String),
    /// Epoch milliseconds stored as a number
    EpochMillis(f64),
    Missing,
    /// Any other JSON type (bool, array, object)
    Unsupported(&'static str),
}

/// A numeric field as it appears in a stored document
#[derive(Debug, Clone, PartialEq)]
pub enum RawNumber {
    Int(i64),
    Double(f64),
    /// `$numberDecimal` string payload
    Decimal(String),
    Text(String),
    Missing,
    Unsupported(&'static str),
}

/// Loyalty-tier membership embedded in a member document
#[derive(Debug, Clone)]
pub struct Membership {
    /// Vendor reference in its string representation
    pub vendor_id: String,
    pub joined_at: RawTimestamp,
    pub total_visits: RawNumber,
}

impl Membership {
    /// Memberships carry the vendor as a plain string
    pub fn belongs_to(&self, vendor: &ObjectId) -> bool {
        self.vendor_id == vendor.to_hex()
    }
}

/// Booking embedded in a member document
#[derive(Debug, Clone)]
pub struct Booking {
    pub facility_id: Option<DocRef>,
    /// Vendor (service) the booking was made with
    pub service_id: Option<DocRef>,
    pub start_time: RawTimestamp,
    pub is_active: Option<bool>,
}

impl Booking {
    pub fn is_cancelled(&self) -> bool {
        self.is_active == Some(false)
    }
}

/// Member document (`users` collection)
#[derive(Debug, Clone)]
pub struct Member {
    pub id: ObjectId,
    pub memberships: Vec<Membership>,
    pub bookings: Vec<Booking>,
}

/// Visit event (`member_visits` collection)
#[derive(Debug, Clone)]
pub struct VisitEvent {
    pub id: DocRef,
    pub member_id: Option<DocRef>,
    pub vendor_id: Option<DocRef>,
    pub visited_at: RawTimestamp,
    pub amount_spent: RawNumber,
    pub amount_saved: RawNumber,
    pub tier_display_name: Option<String>,
}

/// Facility document (`facilities` collection)
#[derive(Debug, Clone)]
pub struct Facility {
    pub id: ObjectId,
    pub vendor_id: Option<DocRef>,
    pub name: Option<String>,
}

/// Bucketing convention for time-series reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Granularity {
    /// ISO-8601 week-year and week number
    IsoWeek,
    /// Calendar week starting Monday
    Week,
    /// Calendar month
    Month,
}

impl Granularity {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "iso-week" | "isoweek" => Some(Granularity::IsoWeek),
            "week" => Some(Granularity::Week),
            "month" => Some(Granularity::Month),
            _ => None,
        }
    }
}

/// Time bucket. `start` is the UTC instant of local midnight at the start of
/// the bucket in the window timezone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
    IsoWeek {
        year: i32,
        week: u32,
        start: DateTime<Utc>,
    },
    Week {
        start: DateTime<Utc>,
    },
    Month {
        start: DateTime<Utc>,
    },
}

impl Bucket {
    pub fn start(&self) -> DateTime<Utc> {
        match self {
            Bucket::IsoWeek { start, .. } | Bucket::Week { start } | Bucket::Month { start } => {
                *start
            }
        }
    }
}

impl PartialOrd for Bucket {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Bucket {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.start().cmp(&other.start())
    }
}

/// Report kinds served by the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReportKind {
    WeeklyBookings,
    WeeklySales,
    WeeklyCancellations,
    SignupsMonthly,
    RevenueByTier,
    BookingsByFacility,
    NewVsReturning,
    AovByVisit,
}

impl ReportKind {
    pub const ALL: [ReportKind; 8] = [
        ReportKind::WeeklyBookings,
        ReportKind::WeeklySales,
        ReportKind::WeeklyCancellations,
        ReportKind::SignupsMonthly,
        ReportKind::RevenueByTier,
        ReportKind::BookingsByFacility,
        ReportKind::NewVsReturning,
        ReportKind::AovByVisit,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReportKind::WeeklyBookings => "weekly-bookings",
            ReportKind::WeeklySales => "weekly-sales",
            ReportKind::WeeklyCancellations => "weekly-cancellations",
            ReportKind::SignupsMonthly => "signups-monthly",
            ReportKind::RevenueByTier => "revenue-by-tier",
            ReportKind::BookingsByFacility => "bookings-by-facility",
            ReportKind::NewVsReturning => "new-vs-returning",
            ReportKind::AovByVisit => "aov-by-visit",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == s.trim())
    }

    /// Generic message returned to callers when the report fails server-side
    pub fn failure_message(&self) -> &'static str {
        match self {
            ReportKind::WeeklyBookings => "Failed to fetch weekly bookings",
            ReportKind::WeeklySales => "Failed to fetch weekly sales",
            ReportKind::WeeklyCancellations => "Failed to fetch weekly cancellations",
            ReportKind::SignupsMonthly => "Failed to fetch signups",
            ReportKind::RevenueByTier => "Failed to fetch revenue by tier",
            ReportKind::BookingsByFacility => "Failed to fetch bookings by facility",
            ReportKind::NewVsReturning => "Failed to fetch new vs returning visits",
            ReportKind::AovByVisit => "Failed to fetch AOV by visit",
        }
    }

    /// `step` discriminator a caller must pass, if any
    pub fn required_step(&self) -> Option<&'static str> {
        match self {
            ReportKind::NewVsReturning => Some("fr-weekly"),
            ReportKind::AovByVisit => Some("by-actual"),
            _ => None,
        }
    }

    /// Bucketing used when the request does not override it
    pub fn default_granularity(&self) -> Option<Granularity> {
        match self {
            ReportKind::WeeklyBookings
            | ReportKind::WeeklySales
            | ReportKind::WeeklyCancellations
            | ReportKind::NewVsReturning => Some(Granularity::Week),
            ReportKind::SignupsMonthly => Some(Granularity::Month),
            ReportKind::RevenueByTier
            | ReportKind::BookingsByFacility
            | ReportKind::AovByVisit => None,
        }
    }
}

impl fmt::Display for ReportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One chart value
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Datum {
    Count(u64),
    Amount(f64),
}

impl Datum {
    pub fn as_f64(&self) -> f64 {
        match self {
            Datum::Count(n) => *n as f64,
            Datum::Amount(v) => *v,
        }
    }
}

/// Named numeric series aligned with the payload categories.
/// `None` entries mean "no data" and serialize as `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    pub name: String,
    pub data: Vec<Option<Datum>>,
}

impl Series {
    /// Sum of the non-null values
    pub fn total(&self) -> f64 {
        self.data.iter().flatten().map(Datum::as_f64).sum()
    }
}

/// Resolved window as echoed back to callers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowEcho {
    pub start: String,
    pub end: String,
    pub timezone: String,
}

/// Producer metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Producer {
    pub name: String,
    pub version: String,
}

/// Complete report payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportPayload {
    pub report: ReportKind,
    pub report_id: String,
    pub vendor_id: String,
    pub window: WindowEcho,
    pub categories: Vec<String>,
    pub series: Vec<Series>,
    pub table: Vec<serde_json::Value>,
    pub producer: Producer,
    pub computed_at_utc: String,
}
