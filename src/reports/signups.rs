//! Loyalty sign-ups per month

use super::{Report, ReportContext};
use crate::aggregate::group_by;
use crate::assembler::{assemble, Assembled, SeriesSpec};
use crate::error::ReportError;
use crate::normalizer::normalize;
use crate::types::{Datum, ReportKind};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
struct SignupRow {
    label: String,
    total: u64,
}

/// Memberships of the vendor joined inside the window, per bucket
pub struct SignupsMonthly;

impl Report for SignupsMonthly {
    fn kind(&self) -> ReportKind {
        ReportKind::SignupsMonthly
    }

    fn compute(&self, ctx: &ReportContext<'_>) -> Result<Assembled, ReportError> {
        let granularity = ctx.granularity_for(self.kind());
        let members = ctx.store.members_of_vendor(&ctx.vendor)?;
        ctx.checkpoint("query")?;

        let tz = ctx.window.timezone;
        let joined = members
            .iter()
            .flat_map(|m| m.memberships.iter())
            .filter_map(|ms| normalize(&ms.joined_at, tz))
            .filter(|at| ctx.window.contains(*at));

        let rows: Vec<SignupRow> = group_by(
            joined,
            |at| ctx.window.bucket(*at, granularity),
            |total: &mut u64, _| *total += 1,
        )
        .into_iter()
        .map(|(bucket, total)| SignupRow {
            label: ctx.bucket_label(&bucket),
            total,
        })
        .collect();
        ctx.checkpoint("aggregate")?;

        assemble(
            &rows,
            |r| r.label.clone(),
            &[SeriesSpec::new("Sign-ups", |r: &SignupRow| {
                Some(Datum::Count(r.total))
            })],
        )
    }
}
