//! Booking counts per facility

use super::{Report, ReportContext};
use crate::aggregate::rank_by;
use crate::assembler::{assemble, Assembled, SeriesSpec};
use crate::error::ReportError;
use crate::normalizer::normalize;
use crate::types::{Datum, ReportKind};
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct FacilityRow {
    facility_id: String,
    name: String,
    count: u64,
}

/// In-window bookings of each named facility of the vendor.
///
/// Facilities with no bookings are listed with a zero count. A booking may
/// reference its facility by ObjectId or by string; both count.
pub struct BookingsByFacility;

impl Report for BookingsByFacility {
    fn kind(&self) -> ReportKind {
        ReportKind::BookingsByFacility
    }

    fn compute(&self, ctx: &ReportContext<'_>) -> Result<Assembled, ReportError> {
        let facilities = ctx.store.facilities_for_vendor(&ctx.vendor)?;
        let bookings = ctx.store.bookings()?;
        ctx.checkpoint("query")?;

        let tz = ctx.window.timezone;
        let mut per_facility: HashMap<String, u64> = HashMap::new();
        for booking in &bookings {
            let Some(facility) = &booking.facility_id else {
                continue;
            };
            if normalize(&booking.start_time, tz).is_some_and(|at| ctx.window.contains(at)) {
                *per_facility.entry(facility.key()).or_default() += 1;
            }
        }

        let groups: Vec<(String, FacilityRow)> = facilities
            .iter()
            .filter_map(|f| {
                let name = f.name.as_deref().map(str::trim).filter(|n| !n.is_empty())?;
                let facility_id = f.id.to_hex();
                let count = per_facility.get(&facility_id).copied().unwrap_or(0);
                Some((
                    name.to_string(),
                    FacilityRow {
                        facility_id,
                        name: name.to_string(),
                        count,
                    },
                ))
            })
            .collect();
        let rows: Vec<FacilityRow> = rank_by(groups, |r| r.count as f64, |name| name.as_str())
            .into_iter()
            .map(|(_, row)| row)
            .collect();
        ctx.checkpoint("aggregate")?;

        assemble(
            &rows,
            |r| r.name.clone(),
            &[SeriesSpec::new("Bookings (count)", |r: &FacilityRow| {
                Some(Datum::Count(r.count))
            })],
        )
    }
}
