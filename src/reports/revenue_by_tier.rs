//! Revenue per loyalty tier

use super::{Report, ReportContext};
use crate::aggregate::{group_by, rank_by};
use crate::assembler::{assemble, whole, Assembled, SeriesSpec};
use crate::error::ReportError;
use crate::metrics::{MetricExtractor, VisitFact};
use crate::types::{Datum, ReportKind};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct TierRow {
    tier: String,
    total_revenue_gross: f64,
    total_revenue_net: f64,
}

#[derive(Debug, Default)]
struct TierTotals {
    gross: f64,
    net: f64,
}

/// Gross and net revenue of the vendor's in-window visits, per tier.
///
/// Tiers are ranked by gross revenue, highest first, before rounding.
pub struct RevenueByTier;

impl Report for RevenueByTier {
    fn kind(&self) -> ReportKind {
        ReportKind::RevenueByTier
    }

    fn compute(&self, ctx: &ReportContext<'_>) -> Result<Assembled, ReportError> {
        let visits = ctx.store.visits_for_vendor(&ctx.vendor)?;
        ctx.checkpoint("query")?;

        let facts = MetricExtractor::extract_all(&visits, ctx.window.timezone);
        let in_window = facts
            .into_iter()
            .filter(|f| f.at.is_some_and(|at| ctx.window.contains(at)));

        let groups = group_by(
            in_window,
            |f: &VisitFact| Some(f.tier.clone()),
            |totals: &mut TierTotals, f| {
                totals.gross += f.spend;
                totals.net += f.net;
            },
        );
        let rows: Vec<TierRow> = rank_by(groups, |t| t.gross, |tier| tier.as_str())
            .into_iter()
            .map(|(tier, totals)| TierRow {
                tier,
                total_revenue_gross: whole(totals.gross),
                total_revenue_net: whole(totals.net),
            })
            .collect();
        ctx.checkpoint("aggregate")?;

        assemble(
            &rows,
            |r| r.tier.clone(),
            &[
                SeriesSpec {
                    name: format!("Revenue ({})", ctx.currency),
                    value: |r: &TierRow| Some(Datum::Amount(r.total_revenue_gross)),
                },
                SeriesSpec {
                    name: format!("Net Revenue ({})", ctx.currency),
                    value: |r: &TierRow| Some(Datum::Amount(r.total_revenue_net)),
                },
            ],
        )
    }
}
