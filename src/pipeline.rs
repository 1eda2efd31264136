//! Pipeline orchestration
//!
//! This module provides the public API for Vendor Pulse. A [`ReportProcessor`]
//! takes a request shaped like a dashboard query string and runs it through
//! validation, window resolution, the report itself and assembly, answering
//! with an HTTP-style status and JSON body any web layer can forward.

use crate::assembler::ReportAssembler;
use crate::config::AnalyticsConfig;
use crate::error::ReportError;
use crate::reports::{report_for, ReportContext};
use crate::store::DocumentStore;
use crate::types::{Granularity, ObjectId, ReportKind, ReportPayload, WindowEcho};
use crate::window::{resolve, ReportWindow, WindowParams};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::{Duration, Instant};

/// Query parameters of a report request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportRequest {
    pub report: ReportKind,
    #[serde(default)]
    pub vendor_id: Option<String>,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub year: Option<String>,
    #[serde(default)]
    pub step: Option<String>,
    #[serde(default)]
    pub bucket: Option<String>,
}

impl ReportRequest {
    /// Request for `report` with every parameter absent
    pub fn new(report: ReportKind) -> Self {
        Self {
            report,
            vendor_id: None,
            from: None,
            to: None,
            year: None,
            step: report.required_step().map(String::from),
            bucket: None,
        }
    }

    fn window_params(&self) -> WindowParams<'_> {
        WindowParams {
            from: self.from.as_deref(),
            to: self.to.as_deref(),
            year: self.year.as_deref(),
        }
    }
}

/// Status code and JSON body for a request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportResponse {
    pub status: u16,
    pub body: Value,
}

/// Wall-clock budget for one computation, checked between stages
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    started: Instant,
    budget: Option<Duration>,
}

impl Deadline {
    pub fn new(budget: Option<Duration>) -> Self {
        Self {
            started: Instant::now(),
            budget,
        }
    }

    pub fn unbounded() -> Self {
        Self::new(None)
    }

    /// Error once the budget is spent
    pub fn check(&self, stage: &str) -> Result<(), ReportError> {
        match self.budget {
            Some(budget) if self.started.elapsed() > budget => {
                tracing::debug!(stage, ?budget, "deadline exceeded");
                Err(ReportError::Timeout(budget))
            }
            _ => Ok(()),
        }
    }
}

/// Corrective message for a missing or wrong `step` parameter
fn step_hint(kind: ReportKind, step: &str) -> String {
    match kind {
        ReportKind::AovByVisit => format!(
            "Add ?step={step} to compute AOV by actual visits within the time window."
        ),
        _ => format!("Add ?step={step}"),
    }
}

/// Headline totals for a vendor over one window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KpiSummary {
    pub vendor_id: String,
    pub window: WindowEcho,
    /// `None` when the underlying report failed
    pub signups: Option<u64>,
    pub bookings: Option<u64>,
    /// First-time plus returning visits
    pub visits: Option<u64>,
    pub sales: Option<f64>,
}

/// Parameters of a KPI summary request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct KpiRequest {
    pub vendor_id: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub year: Option<String>,
}

/// Report processor over a document store.
///
/// The store and configuration are read-only, so one processor can serve
/// concurrent requests.
pub struct ReportProcessor<S> {
    store: S,
    config: AnalyticsConfig,
}

impl<S: DocumentStore> ReportProcessor<S> {
    /// Create a processor, validating the configuration
    pub fn new(store: S, config: AnalyticsConfig) -> Result<Self, ReportError> {
        config.validate()?;
        Ok(Self { store, config })
    }

    /// Create a processor with the default configuration
    pub fn with_defaults(store: S) -> Self {
        Self {
            store,
            config: AnalyticsConfig::default(),
        }
    }

    pub fn config(&self) -> &AnalyticsConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Answer a request with a status code and JSON body
    pub fn respond(&self, request: &ReportRequest) -> ReportResponse {
        let kind = request.report;
        let outcome = self
            .run(request)
            .and_then(|payload| serde_json::to_value(payload).map_err(ReportError::from));

        match outcome {
            Ok(body) => ReportResponse { status: 200, body },
            Err(e) if e.is_client_error() => {
                tracing::debug!(report = %kind, error = %e, "rejected report request");
                ReportResponse {
                    status: e.status_code(),
                    body: json!({ "error": e.to_string() }),
                }
            }
            Err(e) => {
                tracing::error!(report = %kind, error = %e, "report computation failed");
                ReportResponse {
                    status: e.status_code(),
                    body: json!({ "error": kind.failure_message() }),
                }
            }
        }
    }

    /// Compute a report payload
    pub fn run(&self, request: &ReportRequest) -> Result<ReportPayload, ReportError> {
        self.run_at(request, Utc::now())
    }

    /// Compute a report payload with `now` as the reference for rolling windows
    pub fn run_at(
        &self,
        request: &ReportRequest,
        now: DateTime<Utc>,
    ) -> Result<ReportPayload, ReportError> {
        let kind = request.report;

        if let Some(required) = kind.required_step() {
            let step = request.step.as_deref().map(str::trim).unwrap_or("");
            if step != required {
                return Err(ReportError::MissingParameter(step_hint(kind, required)));
            }
        }

        let vendor = self.resolve_vendor(request.vendor_id.as_deref())?;
        let granularity = parse_bucket(request.bucket.as_deref())?;
        let window = resolve(&request.window_params(), &self.config.window, now)?;
        let deadline = Deadline::new(self.config.timeout());
        tracing::debug!(report = %kind, vendor = %vendor, ?window, "computing report");

        let ctx = ReportContext {
            store: &self.store,
            vendor,
            window,
            granularity,
            currency: &self.config.currency,
            deadline,
        };
        let assembled = report_for(kind).compute(&ctx)?;
        deadline.check("assemble")?;

        let payload = ReportAssembler::new().finish(kind, &vendor, &window, assembled);
        tracing::debug!(
            report = %kind,
            report_id = %payload.report_id,
            categories = payload.categories.len(),
            "report computed"
        );
        Ok(payload)
    }

    /// Sign-ups, bookings, visits and sales totals for one vendor and window.
    ///
    /// The four reports run concurrently. A failing report leaves its total
    /// empty instead of failing the summary; invalid input still fails it.
    pub fn kpi_summary(&self, request: &KpiRequest) -> Result<KpiSummary, ReportError> {
        let vendor = self.resolve_vendor(request.vendor_id.as_deref())?;
        let params = WindowParams {
            from: request.from.as_deref(),
            to: request.to.as_deref(),
            year: request.year.as_deref(),
        };
        let now = Utc::now();
        let window = resolve(&params, &self.config.window, now)?;

        let base = ReportRequest {
            report: ReportKind::SignupsMonthly,
            vendor_id: Some(vendor.to_hex()),
            from: request.from.clone(),
            to: request.to.clone(),
            year: request.year.clone(),
            step: None,
            bucket: None,
        };
        let total_of = |kind: ReportKind, series: usize| -> Option<f64> {
            let request = ReportRequest {
                report: kind,
                step: kind.required_step().map(String::from),
                ..base.clone()
            };
            match self.run_at(&request, now) {
                Ok(payload) => Some(payload.series.iter().take(series).map(|s| s.total()).sum()),
                Err(e) => {
                    tracing::error!(report = %kind, error = %e, "KPI report failed");
                    None
                }
            }
        };

        let (signups, bookings, visits, sales) = std::thread::scope(|scope| {
            let signups = scope.spawn(|| total_of(ReportKind::SignupsMonthly, 1));
            let bookings = scope.spawn(|| total_of(ReportKind::WeeklyBookings, 1));
            let visits = scope.spawn(|| total_of(ReportKind::NewVsReturning, 2));
            let sales = total_of(ReportKind::WeeklySales, 1);
            (
                signups.join().ok().flatten(),
                bookings.join().ok().flatten(),
                visits.join().ok().flatten(),
                sales,
            )
        });

        Ok(KpiSummary {
            vendor_id: vendor.to_hex(),
            window: window.echo(),
            signups: signups.map(|v| v as u64),
            bookings: bookings.map(|v| v as u64),
            visits: visits.map(|v| v as u64),
            sales: sales.map(crate::assembler::money),
        })
    }

    fn resolve_vendor(&self, raw: Option<&str>) -> Result<ObjectId, ReportError> {
        match raw.map(str::trim).filter(|s| !s.is_empty()) {
            Some(id) => {
                ObjectId::parse_str(id).ok_or_else(|| ReportError::InvalidVendorId(id.to_string()))
            }
            None => self.config.default_vendor_id(),
        }
    }
}

fn parse_bucket(raw: Option<&str>) -> Result<Option<Granularity>, ReportError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(s) => Granularity::parse(s).map(Some).ok_or_else(|| {
            ReportError::InvalidParameter(format!(
                "'bucket' must be one of iso-week, week, month (got '{s}')"
            ))
        }),
    }
}

/// Window a request would be computed over, without running it
pub fn preview_window(
    config: &AnalyticsConfig,
    request: &ReportRequest,
    now: DateTime<Utc>,
) -> Result<ReportWindow, ReportError> {
    resolve(&request.window_params(), &config.window, now)
}
