//! Bookings per week

use super::{count_bookings, BucketCount, Report, ReportContext};
use crate::assembler::{assemble, Assembled, SeriesSpec};
use crate::error::ReportError;
use crate::types::{Datum, ReportKind};

/// Vendor bookings starting inside the window, per bucket
pub struct WeeklyBookings;

impl Report for WeeklyBookings {
    fn kind(&self) -> ReportKind {
        ReportKind::WeeklyBookings
    }

    fn compute(&self, ctx: &ReportContext<'_>) -> Result<Assembled, ReportError> {
        let granularity = ctx.granularity_for(self.kind());
        let bookings = ctx.store.bookings()?;
        ctx.checkpoint("query")?;

        let rows = count_bookings(&bookings, ctx, granularity, |_| true);
        ctx.checkpoint("aggregate")?;

        assemble(
            &rows,
            |r| r.label.clone(),
            &[SeriesSpec::new("Total Bookings", |r: &BucketCount| {
                Some(Datum::Count(r.count))
            })],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reports::fixtures::{context, store, OTHER_VENDOR, VENDOR};
    use crate::types::Granularity;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn bookings_store() -> crate::store::SnapshotStore {
        store(json!({
            "users": [
                {
                    "_id": {"$oid": "64b000000000000000000001"},
                    "bookings": [
                        {"serviceId": {"$oid": VENDOR}, "startTime": "2025-06-16T00:30:00"},
                        {"serviceId": VENDOR, "startTime": {"$date": "2025-06-18T02:00:00Z"}},
                        {"serviceId": VENDOR, "startTime": "2025-06-23T09:00:00+08:00", "isActive": false},
                        {"serviceId": VENDOR, "startTime": "2025-08-11T00:00:00+08:00"},
                        {"serviceId": VENDOR, "startTime": "soon"},
                        {"serviceId": OTHER_VENDOR, "startTime": "2025-06-20T10:00:00"}
                    ]
                }
            ]
        }))
    }

    #[test]
    fn test_counts_per_week() {
        let store = bookings_store();
        let ctx = context(&store, None);
        let assembled = WeeklyBookings.compute(&ctx).unwrap();

        assert_eq!(
            assembled.categories,
            vec!["Week of 16 Jun 2025", "Week of 23 Jun 2025"]
        );
        assert_eq!(assembled.series[0].name, "Total Bookings");
        assert_eq!(
            assembled.series[0].data,
            vec![Some(Datum::Count(2)), Some(Datum::Count(1))]
        );
        assert_eq!(assembled.table[0], json!({"label": "Week of 16 Jun 2025", "count": 2}));
    }

    #[test]
    fn test_iso_week_override() {
        let store = bookings_store();
        let ctx = context(&store, Some(Granularity::IsoWeek));
        let assembled = WeeklyBookings.compute(&ctx).unwrap();
        assert_eq!(assembled.categories, vec!["Week 25, 2025", "Week 26, 2025"]);
    }
}
