//! Cancelled bookings per week

use super::{count_bookings, BucketCount, Report, ReportContext};
use crate::assembler::{assemble, Assembled, SeriesSpec};
use crate::error::ReportError;
use crate::types::{Booking, Datum, ReportKind};

/// Inactive vendor bookings starting inside the window, per bucket
pub struct WeeklyCancellations;

impl Report for WeeklyCancellations {
    fn kind(&self) -> ReportKind {
        ReportKind::WeeklyCancellations
    }

    fn compute(&self, ctx: &ReportContext<'_>) -> Result<Assembled, ReportError> {
        let granularity = ctx.granularity_for(self.kind());
        let bookings = ctx.store.bookings()?;
        ctx.checkpoint("query")?;

        let rows = count_bookings(&bookings, ctx, granularity, Booking::is_cancelled);
        ctx.checkpoint("aggregate")?;

        assemble(
            &rows,
            |r| r.label.clone(),
            &[SeriesSpec::new("Cancellations", |r: &BucketCount| {
                Some(Datum::Count(r.count))
            })],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reports::fixtures::{context, store, OTHER_VENDOR, VENDOR};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_only_inactive_vendor_bookings_count() {
        let store = store(json!({
            "users": [
                {
                    "_id": {"$oid": "64b000000000000000000001"},
                    "bookings": [
                        {"serviceId": VENDOR, "startTime": "2025-07-01T10:00:00", "isActive": false},
                        {"serviceId": VENDOR, "startTime": "2025-07-02T10:00:00", "isActive": true},
                        {"serviceId": VENDOR, "startTime": "2025-07-03T10:00:00"},
                        {"serviceId": OTHER_VENDOR, "startTime": "2025-07-01T10:00:00", "isActive": false}
                    ]
                },
                {
                    "_id": {"$oid": "64b000000000000000000002"},
                    "bookings": [
                        {"serviceId": {"$oid": VENDOR}, "startTime": "2025-07-04T10:00:00", "isActive": false},
                        {"serviceId": VENDOR, "startTime": null, "isActive": false}
                    ]
                }
            ]
        }));
        let ctx = context(&store, None);
        let assembled = WeeklyCancellations.compute(&ctx).unwrap();

        assert_eq!(assembled.categories, vec!["Week of 30 Jun 2025"]);
        assert_eq!(assembled.series[0].name, "Cancellations");
        assert_eq!(assembled.series[0].data, vec![Some(Datum::Count(2))]);
    }
}
