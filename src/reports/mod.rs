//! Report implementations
//!
//! Each report kind lives in its own module and implements [`Report`]. A report
//! queries the store, normalizes and filters records to the window, aggregates
//! them and hands ordered rows to the assembler.

mod aov_by_visit;
mod bookings_by_facility;
mod new_vs_returning;
mod revenue_by_tier;
mod signups;
mod weekly_bookings;
mod weekly_cancellations;
mod weekly_sales;

pub use aov_by_visit::AovByVisit;
pub use bookings_by_facility::BookingsByFacility;
pub use new_vs_returning::NewVsReturning;
pub use revenue_by_tier::RevenueByTier;
pub use signups::SignupsMonthly;
pub use weekly_bookings::WeeklyBookings;
pub use weekly_cancellations::WeeklyCancellations;
pub use weekly_sales::WeeklySales;

use crate::aggregate::group_by;
use crate::assembler::Assembled;
use crate::error::ReportError;
use crate::metrics::booking_matches_vendor;
use crate::normalizer::normalize;
use crate::pipeline::Deadline;
use crate::store::DocumentStore;
use crate::types::{Booking, Bucket, Granularity, ObjectId, ReportKind};
use crate::window::ReportWindow;
use serde::Serialize;

/// Everything a report needs for one computation
pub struct ReportContext<'a> {
    pub store: &'a dyn DocumentStore,
    pub vendor: ObjectId,
    pub window: ReportWindow,
    /// Request override of the report's default bucketing
    pub granularity: Option<Granularity>,
    /// Currency label used in series names
    pub currency: &'a str,
    pub deadline: Deadline,
}

impl ReportContext<'_> {
    /// Requested bucketing, or the report's default
    pub fn granularity_for(&self, kind: ReportKind) -> Granularity {
        self.granularity
            .or(kind.default_granularity())
            .unwrap_or(Granularity::Week)
    }

    /// Fail if the deadline has passed
    pub fn checkpoint(&self, stage: &str) -> Result<(), ReportError> {
        self.deadline.check(stage)
    }

    pub fn bucket_label(&self, bucket: &Bucket) -> String {
        bucket.label(self.window.timezone)
    }
}

/// A report kind
pub trait Report: Send + Sync {
    fn kind(&self) -> ReportKind;

    /// Compute the chart shape for the context's vendor and window
    fn compute(&self, ctx: &ReportContext<'_>) -> Result<Assembled, ReportError>;
}

/// Implementation for a report kind
pub fn report_for(kind: ReportKind) -> Box<dyn Report> {
    match kind {
        ReportKind::WeeklyBookings => Box::new(WeeklyBookings),
        ReportKind::WeeklySales => Box::new(WeeklySales),
        ReportKind::WeeklyCancellations => Box::new(WeeklyCancellations),
        ReportKind::SignupsMonthly => Box::new(SignupsMonthly),
        ReportKind::RevenueByTier => Box::new(RevenueByTier),
        ReportKind::BookingsByFacility => Box::new(BookingsByFacility),
        ReportKind::NewVsReturning => Box::new(NewVsReturning),
        ReportKind::AovByVisit => Box::new(AovByVisit),
    }
}

/// Row of a bucketed count chart
#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct BucketCount {
    pub label: String,
    pub count: u64,
}

/// Count the vendor's bookings per bucket, keeping only those `keep` accepts
pub(crate) fn count_bookings(
    bookings: &[Booking],
    ctx: &ReportContext<'_>,
    granularity: Granularity,
    keep: fn(&Booking) -> bool,
) -> Vec<BucketCount> {
    let tz = ctx.window.timezone;
    let mut undated = 0usize;
    let in_window: Vec<_> = bookings
        .iter()
        .filter(|b| booking_matches_vendor(b, &ctx.vendor) && keep(b))
        .filter_map(|b| {
            let at = normalize(&b.start_time, tz);
            if at.is_none() {
                undated += 1;
            }
            at
        })
        .filter(|at| ctx.window.contains(*at))
        .collect();
    if undated > 0 {
        tracing::debug!(undated, "excluding bookings without a usable start time");
    }

    group_by(
        in_window,
        |at| ctx.window.bucket(*at, granularity),
        |count: &mut u64, _| *count += 1,
    )
    .into_iter()
    .map(|(bucket, count)| BucketCount {
        label: ctx.bucket_label(&bucket),
        count,
    })
    .collect()
}
