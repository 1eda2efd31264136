//! Metric extraction
//!
//! Turns visit documents into flat facts (net value, gross spend, savings,
//! timestamp, tier) and holds the vendor matching rules used by every report.

use crate::normalizer::{coerce_amount, normalize};
use crate::types::{Booking, DocRef, ObjectId, VisitEvent};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;

/// Tier label used when a visit has no usable tier name
pub const UNKNOWN_TIER: &str = "Unknown";

/// Normalized view of one visit
#[derive(Debug, Clone, PartialEq)]
pub struct VisitFact {
    /// Visit id key, used as a tie-breaker
    pub id: String,
    /// Member id key
    pub member: Option<String>,
    /// `None` when the stored date could not be normalized
    pub at: Option<DateTime<Utc>>,
    pub spend: f64,
    pub savings: f64,
    /// `spend - savings`
    pub net: f64,
    pub tier: String,
}

/// Extractor for per-visit metrics
pub struct MetricExtractor;

impl MetricExtractor {
    /// Extract metrics from a single visit
    pub fn extract(visit: &VisitEvent, tz: Tz) -> VisitFact {
        let spend = coerce_amount(&visit.amount_spent);
        let savings = coerce_amount(&visit.amount_saved);

        VisitFact {
            id: visit.id.key(),
            member: visit.member_id.as_ref().map(DocRef::key),
            at: normalize(&visit.visited_at, tz),
            spend,
            savings,
            net: spend - savings,
            tier: tier_label(visit.tier_display_name.as_deref()),
        }
    }

    /// Extract every visit, logging how many lack a usable timestamp
    pub fn extract_all<'a>(
        visits: impl IntoIterator<Item = &'a VisitEvent>,
        tz: Tz,
    ) -> Vec<VisitFact> {
        let facts: Vec<VisitFact> = visits.into_iter().map(|v| Self::extract(v, tz)).collect();
        let undated = facts.iter().filter(|f| f.at.is_none()).count();
        if undated > 0 {
            tracing::debug!(
                undated,
                total = facts.len(),
                "excluding visits without a usable timestamp"
            );
        }
        facts
    }
}

/// Trimmed tier display name, or [`UNKNOWN_TIER`]
pub fn tier_label(raw: Option<&str>) -> String {
    match raw.map(str::trim) {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => UNKNOWN_TIER.to_string(),
    }
}

/// Whether a visit was made with `vendor`
pub fn visit_matches_vendor(visit: &VisitEvent, vendor: &ObjectId) -> bool {
    matches_vendor(visit.vendor_id.as_ref(), vendor)
}

/// Whether a booking was made with `vendor` (through its service reference)
pub fn booking_matches_vendor(booking: &Booking, vendor: &ObjectId) -> bool {
    matches_vendor(booking.service_id.as_ref(), vendor)
}

fn matches_vendor(reference: Option<&DocRef>, vendor: &ObjectId) -> bool {
    reference.is_some_and(|r| r.refers_to(vendor))
}
