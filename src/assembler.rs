//! Report assembly
//!
//! Turns ordered report rows into the chart-ready shape callers consume:
//! category labels, index-aligned named series, and the rows themselves as a
//! JSON table. Rounding happens here and nowhere earlier.

use crate::aggregate::round_to;
use crate::error::ReportError;
use crate::types::{Datum, ObjectId, Producer, ReportKind, ReportPayload, Series};
use crate::window::ReportWindow;
use crate::{PRODUCER_NAME, PULSE_VERSION};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Decimal places for currency values
pub const CURRENCY_PLACES: u32 = 2;

/// How to read one series out of a row
pub struct SeriesSpec<R> {
    pub name: String,
    pub value: fn(&R) -> Option<Datum>,
}

impl<R> SeriesSpec<R> {
    pub fn new(name: impl Into<String>, value: fn(&R) -> Option<Datum>) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// Categories, series and table for one report
#[derive(Debug, Clone, PartialEq)]
pub struct Assembled {
    pub categories: Vec<String>,
    pub series: Vec<Series>,
    pub table: Vec<serde_json::Value>,
}

/// Build the chart shape from rows already in display order
pub fn assemble<R, L>(
    rows: &[R],
    label_fn: L,
    specs: &[SeriesSpec<R>],
) -> Result<Assembled, ReportError>
where
    R: Serialize,
    L: Fn(&R) -> String,
{
    let categories = rows.iter().map(&label_fn).collect();
    let series = specs
        .iter()
        .map(|spec| Series {
            name: spec.name.clone(),
            data: rows.iter().map(spec.value).collect(),
        })
        .collect();
    let table = rows
        .iter()
        .map(serde_json::to_value)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Assembled {
        categories,
        series,
        table,
    })
}

/// Currency value rounded to cents
pub fn money(value: f64) -> f64 {
    round_to(value, CURRENCY_PLACES)
}

/// Optional currency value rounded to cents; `None` stays `None`
pub fn money_opt(value: Option<f64>) -> Option<f64> {
    value.map(money)
}

/// Currency value rounded to whole units
pub fn whole(value: f64) -> f64 {
    round_to(value, 0)
}

/// Wraps assembled reports with identifying metadata
pub struct ReportAssembler {
    report_id: String,
}

impl Default for ReportAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportAssembler {
    /// Create an assembler with a fresh report id
    pub fn new() -> Self {
        Self {
            report_id: Uuid::new_v4().to_string(),
        }
    }

    /// Create an assembler with a specific report id
    pub fn with_report_id(report_id: String) -> Self {
        Self { report_id }
    }

    pub fn report_id(&self) -> &str {
        &self.report_id
    }

    /// Attach metadata to an assembled report
    pub fn finish(
        &self,
        kind: ReportKind,
        vendor: &ObjectId,
        window: &ReportWindow,
        assembled: Assembled,
    ) -> ReportPayload {
        ReportPayload {
            report: kind,
            report_id: self.report_id.clone(),
            vendor_id: vendor.to_hex(),
            window: window.echo(),
            categories: assembled.categories,
            series: assembled.series,
            table: assembled.table,
            producer: Producer {
                name: PRODUCER_NAME.to_string(),
                version: PULSE_VERSION.to_string(),
            },
            computed_at_utc: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }

    /// Encode a payload to JSON
    pub fn encode_to_json(payload: &ReportPayload, pretty: bool) -> Result<String, ReportError> {
        let encoded = if pretty {
            serde_json::to_string_pretty(payload)
        } else {
            serde_json::to_string(payload)
        };
        encoded.map_err(|e| ReportError::EncodingError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[derive(Serialize)]
    #[serde(rename_all = "camelCase")]
    struct Row {
        label: String,
        total_sales: f64,
        average: Option<f64>,
    }

    fn rows() -> Vec<Row> {
        vec![
            Row {
                label: "Week of 16 Jun 2025".into(),
                total_sales: 120.5,
                average: Some(40.17),
            },
            Row {
                label: "Week of 23 Jun 2025".into(),
                total_sales: 0.0,
                average: None,
            },
        ]
    }

    #[test]
    fn test_assemble_aligns_series_with_categories() {
        let specs = vec![
            SeriesSpec::new("Sales (SGD)", |r: &Row| Some(Datum::Amount(r.total_sales))),
            SeriesSpec::new("Average", |r: &Row| r.average.map(Datum::Amount)),
        ];
        let assembled = assemble(&rows(), |r| r.label.clone(), &specs).unwrap();

        assert_eq!(
            assembled.categories,
            vec!["Week of 16 Jun 2025", "Week of 23 Jun 2025"]
        );
        assert_eq!(assembled.series[0].data.len(), 2);
        assert_eq!(assembled.series[1].data, vec![Some(Datum::Amount(40.17)), None]);
        assert_eq!(
            assembled.table[1],
            json!({"label": "Week of 23 Jun 2025", "totalSales": 0.0, "average": null})
        );
    }

    #[test]
    fn test_empty_rows_produce_empty_series() {
        let specs = vec![SeriesSpec::new("Sales (SGD)", |r: &Row| {
            Some(Datum::Amount(r.total_sales))
        })];
        let empty: Vec<Row> = Vec::new();
        let assembled = assemble(&empty, |r| r.label.clone(), &specs).unwrap();
        assert!(assembled.categories.is_empty());
        assert_eq!(assembled.series[0].name, "Sales (SGD)");
        assert!(assembled.series[0].data.is_empty());
    }

    #[test]
    fn test_rounding_helpers() {
        assert_eq!(money(10.005_000_1), 10.01);
        assert_eq!(money_opt(None), None);
        assert_eq!(whole(1499.5), 1500.0);
    }

    #[test]
    fn test_finish_adds_metadata() {
        let vendor = ObjectId::parse_str("67f773acc9504931fcc411ec").unwrap();
        let window = ReportWindow::new(
            Utc.with_ymd_and_hms(2025, 6, 15, 16, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2025, 8, 10, 16, 0, 0).unwrap(),
            chrono_tz::Asia::Singapore,
        )
        .unwrap();
        let assembler = ReportAssembler::with_report_id("report-1".into());
        let payload = assembler.finish(
            ReportKind::WeeklySales,
            &vendor,
            &window,
            Assembled {
                categories: vec![],
                series: vec![],
                table: vec![],
            },
        );

        assert_eq!(payload.report_id, "report-1");
        assert_eq!(payload.vendor_id, "67f773acc9504931fcc411ec");
        assert_eq!(payload.window.start, "2025-06-15T16:00:00Z");
        assert_eq!(payload.window.timezone, "Asia/Singapore");
        assert_eq!(payload.producer.name, PRODUCER_NAME);

        let json = ReportAssembler::encode_to_json(&payload, false).unwrap();
        assert!(json.contains("\"report\":\"weekly-sales\""));
    }
}
