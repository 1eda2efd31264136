//! Average order value by visit count

use super::{Report, ReportContext};
use crate::aggregate::{group_by, mean, ratio};
use crate::assembler::{assemble, money, money_opt, Assembled, SeriesSpec};
use crate::error::ReportError;
use crate::metrics::MetricExtractor;
use crate::types::{Datum, ObjectId, ReportKind};
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct AovRow {
    actual_visits: u64,
    users: u64,
    #[serde(rename = "meanAOV")]
    mean_aov: Option<f64>,
    #[serde(rename = "weightedAOV")]
    weighted_aov: Option<f64>,
    sum_net: f64,
    sum_visits: u64,
}

/// One member's in-window spending
#[derive(Debug, Default, Clone, Copy)]
struct MemberSpend {
    visits: u64,
    net: f64,
}

#[derive(Debug, Default)]
struct VisitCountGroup {
    users: u64,
    aovs: Vec<Option<f64>>,
    sum_net: f64,
    sum_visits: u64,
}

/// Members of the vendor grouped by how many visits they made in the window.
///
/// For each group both the mean of per-member AOVs and the visit-weighted AOV
/// (total net over total visits) are reported. Members without in-window
/// visits form the zero group, whose AOVs are null.
pub struct AovByVisit;

impl Report for AovByVisit {
    fn kind(&self) -> ReportKind {
        ReportKind::AovByVisit
    }

    fn compute(&self, ctx: &ReportContext<'_>) -> Result<Assembled, ReportError> {
        let members = ctx.store.members_of_vendor(&ctx.vendor)?;
        let ids: Vec<ObjectId> = members.iter().map(|m| m.member).collect();
        let visits = if ids.is_empty() {
            Vec::new()
        } else {
            ctx.store.visits_for_members(&ctx.vendor, &ids)?
        };
        ctx.checkpoint("query")?;

        let mut spend: HashMap<String, MemberSpend> = HashMap::new();
        for fact in MetricExtractor::extract_all(&visits, ctx.window.timezone) {
            let (Some(member), Some(at)) = (fact.member, fact.at) else {
                continue;
            };
            if ctx.window.contains(at) {
                let entry = spend.entry(member).or_default();
                entry.visits += 1;
                entry.net += fact.net;
            }
        }

        let per_member = ids
            .iter()
            .map(|id| spend.get(&id.to_hex()).copied().unwrap_or_default());
        let rows: Vec<AovRow> = group_by(
            per_member,
            |m| Some(m.visits),
            |group: &mut VisitCountGroup, m| {
                group.users += 1;
                group.aovs.push(ratio(m.net, m.visits as f64));
                group.sum_net += m.net;
                group.sum_visits += m.visits;
            },
        )
        .into_iter()
        .map(|(actual_visits, group)| AovRow {
            actual_visits,
            users: group.users,
            mean_aov: money_opt(mean(group.aovs)),
            weighted_aov: money_opt(ratio(group.sum_net, group.sum_visits as f64)),
            sum_net: money(group.sum_net),
            sum_visits: group.sum_visits,
        })
        .collect();
        ctx.checkpoint("aggregate")?;

        assemble(
            &rows,
            |r| r.actual_visits.to_string(),
            &[
                SeriesSpec::new("Mean AOV", |r: &AovRow| r.mean_aov.map(Datum::Amount)),
                SeriesSpec::new("Weighted AOV", |r: &AovRow| {
                    r.weighted_aov.map(Datum::Amount)
                }),
            ],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::round_to;
    use crate::reports::fixtures::{context, store, OTHER_VENDOR, VENDOR};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn visit(id: &str, member: &str, date: &str, spent: f64) -> serde_json::Value {
        json!({
            "_id": id,
            "memberId": {"$oid": member},
            "vendorId": {"$oid": VENDOR},
            "visitDate": date,
            "amountSpent": spent
        })
    }

    #[test]
    fn test_members_grouped_by_in_window_visits() {
        const M1: &str = "64b000000000000000000001";
        const M2: &str = "64b000000000000000000002";
        const M3: &str = "64b000000000000000000003";
        const M4: &str = "64b000000000000000000004";
        let store = store(json!({
            "users": [
                // two memberships of the vendor; still counted once
                {"_id": {"$oid": M1}, "userLoyaltyTier": [{"vendorId": VENDOR}, {"vendorId": VENDOR}]},
                {"_id": {"$oid": M2}, "userLoyaltyTier": [{"vendorId": VENDOR}]},
                {"_id": {"$oid": M3}, "userLoyaltyTier": [{"vendorId": VENDOR}]},
                {"_id": {"$oid": M4}, "userLoyaltyTier": [{"vendorId": OTHER_VENDOR}]}
            ],
            "member_visits": [
                visit("1", M1, "2025-06-20T10:00:00", 30.0),
                visit("2", M1, "2025-06-27T10:00:00", 10.0),
                visit("3", M2, "2025-07-01T10:00:00", 100.0),
                visit("4", M2, "2025-07-02T10:00:00", 0.0),
                visit("5", M2, "2025-05-02T10:00:00", 500.0),
                visit("6", M4, "2025-07-02T10:00:00", 70.0)
            ]
        }));
        let ctx = context(&store, None);
        let assembled = AovByVisit.compute(&ctx).unwrap();

        assert_eq!(assembled.categories, vec!["0", "2"]);
        assert_eq!(assembled.series[0].name, "Mean AOV");
        assert_eq!(assembled.series[1].name, "Weighted AOV");
        // M3 has no visits in the window
        assert_eq!(assembled.series[0].data[0], None);
        assert_eq!(assembled.series[1].data[0], None);
        assert_eq!(
            assembled.table[1],
            json!({
                "actualVisits": 2,
                "users": 2,
                "meanAOV": 35.0,
                "weightedAOV": 35.0,
                "sumNet": 140.0,
                "sumVisits": 4
            })
        );
    }

    #[test]
    fn test_uneven_visit_groups() {
        const M1: &str = "64b000000000000000000001";
        const M2: &str = "64b000000000000000000002";
        let store = store(json!({
            "users": [
                {"_id": {"$oid": M1}, "userLoyaltyTier": [{"vendorId": VENDOR}]},
                {"_id": {"$oid": M2}, "userLoyaltyTier": [{"vendorId": VENDOR}]}
            ],
            "member_visits": [
                visit("1", M1, "2025-06-20T10:00:00", 100.0),
                visit("2", M2, "2025-06-20T10:00:00", 10.0),
                visit("3", M2, "2025-06-21T10:00:00", 10.0),
                visit("4", M2, "2025-06-22T10:00:00", 10.0)
            ]
        }));
        let ctx = context(&store, None);
        let assembled = AovByVisit.compute(&ctx).unwrap();
        assert_eq!(assembled.categories, vec!["1", "3"]);
        assert_eq!(
            assembled.series[1].data,
            vec![Some(Datum::Amount(100.0)), Some(Datum::Amount(10.0))]
        );
    }

    #[test]
    fn test_mean_and_weighted_aov_across_groups() {
        const M1: &str = "64b000000000000000000001";
        const M2: &str = "64b000000000000000000002";
        const M3: &str = "64b000000000000000000003";
        let store = store(json!({
            "users": [
                {"_id": {"$oid": M1}, "userLoyaltyTier": [{"vendorId": VENDOR}]},
                {"_id": {"$oid": M2}, "userLoyaltyTier": [{"vendorId": VENDOR}]},
                {"_id": {"$oid": M3}, "userLoyaltyTier": [{"vendorId": VENDOR}]}
            ],
            "member_visits": [
                visit("1", M1, "2025-06-20T10:00:00", 100.0),
                visit("2", M2, "2025-06-20T10:00:00", 10.0),
                visit("3", M2, "2025-06-21T10:00:00", 10.0),
                visit("4", M2, "2025-06-22T10:00:00", 10.0),
                visit("5", M3, "2025-06-20T10:00:00", 40.0),
                visit("6", M3, "2025-06-21T10:00:00", 20.0),
                visit("7", M3, "2025-06-22T10:00:00", 0.0)
            ]
        }));
        let ctx = context(&store, None);
        let assembled = AovByVisit.compute(&ctx).unwrap();

        assert_eq!(assembled.categories, vec!["1", "3"]);
        // Members of one group share a visit count, so both figures agree
        assert_eq!(
            assembled.table[1],
            json!({
                "actualVisits": 3,
                "users": 2,
                "meanAOV": 15.0,
                "weightedAOV": 15.0,
                "sumNet": 90.0,
                "sumVisits": 6
            })
        );

        // Across groups the mean of per-member AOVs (100, 10, 20) and the
        // ratio of sums (190 / 7) diverge
        let (mut aov_total, mut users, mut net, mut visits) = (0.0, 0.0, 0.0, 0.0);
        for row in &assembled.table {
            let n = row["users"].as_f64().unwrap();
            aov_total += row["meanAOV"].as_f64().unwrap() * n;
            users += n;
            net += row["sumNet"].as_f64().unwrap();
            visits += row["sumVisits"].as_f64().unwrap();
        }
        assert_eq!(round_to(aov_total / users, 2), 43.33);
        assert_eq!(round_to(net / visits, 2), 27.14);
    }
}
