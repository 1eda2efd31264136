//! First-time vs returning visits per week

use super::{Report, ReportContext};
use crate::aggregate::group_by;
use crate::assembler::{assemble, money, Assembled, SeriesSpec};
use crate::classifier::{classify, ClassifiedVisit};
use crate::error::ReportError;
use crate::metrics::MetricExtractor;
use crate::normalizer::{coerce_count, normalize};
use crate::store::VendorMember;
use crate::types::{Datum, Membership, ObjectId, ReportKind};
use chrono_tz::Tz;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct VisitMixRow {
    label: String,
    first_count: u64,
    returning_count: u64,
    first_total: f64,
    returning_total: f64,
}

#[derive(Debug, Default)]
struct VisitMix {
    first_count: u64,
    returning_count: u64,
    first_total: f64,
    returning_total: f64,
}

impl VisitMix {
    fn add(&mut self, visit: &ClassifiedVisit) {
        if visit.is_first {
            self.first_count += 1;
            self.first_total += visit.fact.net;
        } else {
            self.returning_count += 1;
            self.returning_total += visit.fact.net;
        }
    }
}

/// In-window visits of active members, split by whether each was the
/// member's first visit ever.
pub struct NewVsReturning;

impl Report for NewVsReturning {
    fn kind(&self) -> ReportKind {
        ReportKind::NewVsReturning
    }

    fn compute(&self, ctx: &ReportContext<'_>) -> Result<Assembled, ReportError> {
        let granularity = ctx.granularity_for(self.kind());
        let tz = ctx.window.timezone;

        let members = ctx.store.members_of_vendor(&ctx.vendor)?;
        let active = active_members(&members, tz);
        tracing::debug!(
            members = members.len(),
            active = active.len(),
            "selected members with recorded visits"
        );

        let visits = if active.is_empty() {
            Vec::new()
        } else {
            ctx.store.visits_for_members(&ctx.vendor, &active)?
        };
        ctx.checkpoint("query")?;

        // Classify over full history, then narrow to the window
        let classified = classify(MetricExtractor::extract_all(&visits, tz));
        ctx.checkpoint("classify")?;

        let in_window = classified.into_iter().filter(|v| ctx.window.contains(v.at));
        let rows: Vec<VisitMixRow> = group_by(
            in_window,
            |v| ctx.window.bucket(v.at, granularity),
            |mix: &mut VisitMix, v| mix.add(&v),
        )
        .into_iter()
        .map(|(bucket, mix)| VisitMixRow {
            label: ctx.bucket_label(&bucket),
            first_count: mix.first_count,
            returning_count: mix.returning_count,
            first_total: money(mix.first_total),
            returning_total: money(mix.returning_total),
        })
        .collect();
        ctx.checkpoint("aggregate")?;

        assemble(
            &rows,
            |r| r.label.clone(),
            &[
                SeriesSpec::new("First-time", |r: &VisitMixRow| {
                    Some(Datum::Count(r.first_count))
                }),
                SeriesSpec::new("Returning", |r: &VisitMixRow| {
                    Some(Datum::Count(r.returning_count))
                }),
            ],
        )
    }
}

/// Members whose latest membership of the vendor records at least one visit
fn active_members(members: &[VendorMember], tz: Tz) -> Vec<ObjectId> {
    members
        .iter()
        .filter(|m| {
            latest_membership(&m.memberships, tz)
                .and_then(|ms| coerce_count(&ms.total_visits))
                .is_some_and(|visits| visits >= 1)
        })
        .map(|m| m.member)
        .collect()
}

/// Membership with the latest join date. Undated memberships rank below dated
/// ones; among equals the later one in document order wins.
fn latest_membership(memberships: &[Membership], tz: Tz) -> Option<&Membership> {
    memberships
        .iter()
        .enumerate()
        .max_by_key(|(i, ms)| (normalize(&ms.joined_at, tz), *i))
        .map(|(_, ms)| ms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reports::fixtures::{context, store, OTHER_VENDOR, VENDOR};
    use crate::types::{RawNumber, RawTimestamp};
    use chrono_tz::Asia::Singapore;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn membership(joined: Option<&str>, visits: i64) -> Membership {
        Membership {
            vendor_id: VENDOR.into(),
            joined_at: joined
                .map(|s| RawTimestamp::Text(s.into()))
                .unwrap_or(RawTimestamp::Missing),
            total_visits: RawNumber::Int(visits),
        }
    }

    #[test]
    fn test_latest_membership_selection() {
        let list = vec![
            membership(Some("2025-03-01"), 1),
            membership(Some("2025-05-01"), 0),
            membership(None, 5),
        ];
        assert_eq!(
            latest_membership(&list, Singapore).map(|m| m.total_visits.clone()),
            Some(RawNumber::Int(0))
        );

        let tied = vec![membership(Some("2025-05-01"), 0), membership(Some("2025-05-01"), 2)];
        assert_eq!(
            latest_membership(&tied, Singapore).map(|m| m.total_visits.clone()),
            Some(RawNumber::Int(2))
        );
        assert!(latest_membership(&[], Singapore).is_none());
    }

    #[test]
    fn test_first_visit_before_window_makes_later_visits_returning() {
        let store = store(json!({
            "users": [
                {
                    "_id": {"$oid": "64b000000000000000000001"},
                    "userLoyaltyTier": [{"vendorId": VENDOR, "memberDateJoined": "2025-01-01", "totalVisits": "2"}]
                },
                {
                    "_id": {"$oid": "64b000000000000000000002"},
                    "userLoyaltyTier": [{"vendorId": VENDOR, "memberDateJoined": "2025-01-01", "totalVisits": 1}]
                },
                {
                    "_id": {"$oid": "64b000000000000000000003"},
                    "userLoyaltyTier": [{"vendorId": VENDOR, "totalVisits": 0}]
                }
            ],
            "member_visits": [
                {"_id": "a1", "memberId": {"$oid": "64b000000000000000000001"}, "vendorId": VENDOR,
                 "visitDate": "2025-06-01T10:00:00", "amountSpent": 100},
                {"_id": "a2", "memberId": "64b000000000000000000001", "vendorId": VENDOR,
                 "visitDate": "2025-06-20T10:00:00", "amountSpent": 50, "amountSaved": 4.5},
                {"_id": "b1", "memberId": {"$oid": "64b000000000000000000002"}, "vendorId": VENDOR,
                 "visitDate": "2025-06-18T10:00:00", "amountSpent": 30},
                {"_id": "b2", "memberId": {"$oid": "64b000000000000000000002"}, "vendorId": OTHER_VENDOR,
                 "visitDate": "2025-06-17T10:00:00", "amountSpent": 30},
                {"_id": "c1", "memberId": {"$oid": "64b000000000000000000003"}, "vendorId": VENDOR,
                 "visitDate": "2025-06-18T10:00:00", "amountSpent": 30}
            ]
        }));
        let ctx = context(&store, None);
        let assembled = NewVsReturning.compute(&ctx).unwrap();

        assert_eq!(assembled.categories, vec!["Week of 16 Jun 2025"]);
        assert_eq!(assembled.series[0].name, "First-time");
        assert_eq!(assembled.series[0].data, vec![Some(Datum::Count(1))]);
        assert_eq!(assembled.series[1].name, "Returning");
        assert_eq!(assembled.series[1].data, vec![Some(Datum::Count(1))]);
        assert_eq!(
            assembled.table[0],
            json!({
                "label": "Week of 16 Jun 2025",
                "firstCount": 1,
                "returningCount": 1,
                "firstTotal": 30.0,
                "returningTotal": 45.5
            })
        );
    }

    #[test]
    fn test_no_active_members_gives_empty_series() {
        let store = store(json!({"users": [], "member_visits": []}));
        let ctx = context(&store, None);
        let assembled = NewVsReturning.compute(&ctx).unwrap();
        assert!(assembled.categories.is_empty());
        assert_eq!(assembled.series.len(), 2);
        assert!(assembled.series[1].data.is_empty());
    }
}
