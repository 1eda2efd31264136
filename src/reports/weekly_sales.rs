//! Gross sales per week

use super::{Report, ReportContext};
use crate::aggregate::{group_by, Tally};
use crate::assembler::{assemble, money, Assembled, SeriesSpec};
use crate::error::ReportError;
use crate::metrics::MetricExtractor;
use crate::types::{Datum, ReportKind};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct SalesRow {
    label: String,
    total_sales: f64,
}

/// Gross spend of the vendor's visits inside the window, per bucket
pub struct WeeklySales;

impl Report for WeeklySales {
    fn kind(&self) -> ReportKind {
        ReportKind::WeeklySales
    }

    fn compute(&self, ctx: &ReportContext<'_>) -> Result<Assembled, ReportError> {
        let granularity = ctx.granularity_for(self.kind());
        let visits = ctx.store.visits_for_vendor(&ctx.vendor)?;
        ctx.checkpoint("query")?;

        let facts = MetricExtractor::extract_all(&visits, ctx.window.timezone);
        let in_window = facts
            .into_iter()
            .filter_map(|f| f.at.filter(|at| ctx.window.contains(*at)).map(|at| (at, f.spend)));

        let rows: Vec<SalesRow> = group_by(
            in_window,
            |(at, _)| ctx.window.bucket(*at, granularity),
            |tally: &mut Tally, (_, spend)| tally.add(spend),
        )
        .into_iter()
        .map(|(bucket, tally)| SalesRow {
            label: ctx.bucket_label(&bucket),
            total_sales: money(tally.sum),
        })
        .collect();
        ctx.checkpoint("aggregate")?;

        assemble(
            &rows,
            |r| r.label.clone(),
            &[SeriesSpec {
                name: format!("Sales ({})", ctx.currency),
                value: |r: &SalesRow| Some(Datum::Amount(r.total_sales)),
            }],
        )
    }
}
