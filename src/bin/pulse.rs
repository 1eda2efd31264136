//! Pulse CLI - Command-line interface for Vendor Pulse
//!
//! Commands:
//! - report: Compute one report over a snapshot
//! - kpi: Compute headline totals for a vendor
//! - validate: Count documents reports would exclude or zero
//! - doctor: Diagnose configuration and snapshot health

use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use vendor_pulse::config::{AnalyticsConfig, ConfigOverrides, WindowKind};
use vendor_pulse::pipeline::{preview_window, KpiRequest, ReportProcessor, ReportRequest};
use vendor_pulse::schema::Snapshot;
use vendor_pulse::store::SnapshotStore;
use vendor_pulse::types::ReportKind;
use vendor_pulse::window::parse_timezone;
use vendor_pulse::{ReportError, PRODUCER_NAME, PULSE_VERSION};

/// Pulse - Vendor analytics reports over document snapshots
#[derive(Parser)]
#[command(name = "pulse")]
#[command(version = PULSE_VERSION)]
#[command(about = "Compute vendor dashboard reports from a data snapshot", long_about = None)]
struct Cli {
    #[command(flatten)]
    settings: Settings,

    #[command(subcommand)]
    command: Commands,
}

/// Settings shared by every command
#[derive(Args)]
struct Settings {
    /// Snapshot file (JSON collections or NDJSON; use - for stdin)
    #[arg(long, env = "PULSE_SNAPSHOT", global = true)]
    snapshot: Option<PathBuf>,

    /// Configuration file (JSON); flags below override it
    #[arg(long, env = "PULSE_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// How report windows are chosen
    #[arg(long, env = "PULSE_WINDOW_MODE", global = true)]
    window_mode: Option<WindowModeArg>,

    /// Fixed window start (RFC 3339)
    #[arg(long, env = "PULSE_WINDOW_START", global = true)]
    window_start: Option<DateTime<Utc>>,

    /// Fixed window end, exclusive (RFC 3339)
    #[arg(long, env = "PULSE_WINDOW_END", global = true)]
    window_end: Option<DateTime<Utc>>,

    /// Reporting timezone (IANA format, e.g., "Asia/Singapore")
    #[arg(long, env = "PULSE_TIMEZONE", global = true)]
    timezone: Option<String>,

    /// Vendor used when a request names none
    #[arg(long, env = "PULSE_DEFAULT_VENDOR", global = true)]
    default_vendor: Option<String>,

    /// Currency label used in series names
    #[arg(long, env = "PULSE_CURRENCY", global = true)]
    currency: Option<String>,

    /// Per-request computation budget in milliseconds (0 disables)
    #[arg(long, env = "PULSE_TIMEOUT_MS", global = true)]
    timeout_ms: Option<u64>,

    /// Output format
    #[arg(long, default_value = "json-pretty", global = true)]
    output_format: OutputFormat,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute one report
    Report {
        /// Report to compute
        #[arg(value_parser = parse_report_kind)]
        report: ReportKind,

        #[command(flatten)]
        query: QueryArgs,

        /// Discriminator some reports require (fr-weekly, by-actual)
        #[arg(long)]
        step: Option<String>,

        /// Bucketing override (iso-week, week, month)
        #[arg(long)]
        bucket: Option<String>,
    },

    /// Compute sign-up, booking, visit and sales totals
    Kpi {
        #[command(flatten)]
        query: QueryArgs,
    },

    /// Count documents that reports would exclude or zero
    Validate,

    /// Diagnose configuration and snapshot health
    Doctor,
}

/// Query parameters shared by report and kpi
#[derive(Args)]
struct QueryArgs {
    /// Vendor ObjectId (24 hex characters)
    #[arg(long)]
    vendor_id: Option<String>,

    /// Window start (ISO date), parameterized mode only
    #[arg(long)]
    from: Option<String>,

    /// Window end (ISO date, exclusive), parameterized mode only
    #[arg(long)]
    to: Option<String>,

    /// Calendar year, parameterized mode only
    #[arg(long)]
    year: Option<String>,
}

impl Settings {
    /// Flag and environment values, layered over the configuration file
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            window_kind: self.window_mode.map(|mode| match mode {
                WindowModeArg::Fixed => WindowKind::Fixed,
                WindowModeArg::Parameterized => WindowKind::Parameterized,
            }),
            window_start: self.window_start,
            window_end: self.window_end,
            timezone: self.timezone.clone(),
            default_vendor: self.default_vendor.clone(),
            currency: self.currency.clone(),
            timeout_ms: self.timeout_ms,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum WindowModeArg {
    /// Same window for every request
    Fixed,
    /// Window from --from/--to/--year
    Parameterized,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Compact JSON on one line
    Json,
    /// Pretty-printed JSON
    JsonPretty,
}

fn parse_report_kind(s: &str) -> Result<ReportKind, String> {
    ReportKind::parse(s).ok_or_else(|| {
        let known: Vec<&str> = ReportKind::ALL.iter().map(ReportKind::as_str).collect();
        format!("unknown report '{s}' (expected one of: {})", known.join(", "))
    })
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e)).unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("vendor_pulse=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: Cli) -> Result<(), PulseCliError> {
    let settings = cli.settings;
    match cli.command {
        Commands::Report {
            report,
            query,
            step,
            bucket,
        } => {
            let request = ReportRequest {
                report,
                vendor_id: query.vendor_id,
                from: query.from,
                to: query.to,
                year: query.year,
                step: step.or_else(|| report.required_step().map(String::from)),
                bucket,
            };
            cmd_report(&settings, &request)
        }
        Commands::Kpi { query } => {
            let request = KpiRequest {
                vendor_id: query.vendor_id,
                from: query.from,
                to: query.to,
                year: query.year,
            };
            cmd_kpi(&settings, &request)
        }
        Commands::Validate => cmd_validate(&settings),
        Commands::Doctor => cmd_doctor(&settings),
    }
}

fn cmd_report(settings: &Settings, request: &ReportRequest) -> Result<(), PulseCliError> {
    let processor = build_processor(settings)?;
    let response = processor.respond(request);
    print_output(&response.body, settings.output_format)?;

    if response.status == 200 {
        Ok(())
    } else {
        Err(PulseCliError::ReportFailed {
            status: response.status,
            message: response.body["error"].as_str().unwrap_or_default().to_string(),
        })
    }
}

fn cmd_kpi(settings: &Settings, request: &KpiRequest) -> Result<(), PulseCliError> {
    let processor = build_processor(settings)?;
    let summary = processor.kpi_summary(request)?;
    print_output(&summary, settings.output_format)
}

fn cmd_validate(settings: &Settings) -> Result<(), PulseCliError> {
    let config = load_config(settings)?;
    let tz = parse_timezone(config.window.timezone())?;
    let snapshot = load_snapshot(settings)?;

    let report = snapshot.validate(tz);
    print_output(&report, settings.output_format)?;

    if report.is_clean() {
        Ok(())
    } else {
        let flagged = report.collections.iter().filter(|c| !c.is_clean()).count();
        Err(PulseCliError::ValidationFailed(flagged))
    }
}

fn cmd_doctor(settings: &Settings) -> Result<(), PulseCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "pulse_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("Pulse version {}", PULSE_VERSION),
    });

    // Configuration, and the window a bare request would use
    match load_config(settings) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Ok,
                message: format!(
                    "Default vendor {}, currency {}, timeout {} ms",
                    config.default_vendor, config.currency, config.timeout_ms
                ),
            });
            let bare_request = ReportRequest::new(ReportKind::WeeklyBookings);
            checks.push(match preview_window(&config, &bare_request, Utc::now()) {
                Ok(window) => DoctorCheck {
                    name: "window".to_string(),
                    status: CheckStatus::Ok,
                    message: format!(
                        "{} to {} ({})",
                        window.start.to_rfc3339(),
                        window.end.to_rfc3339(),
                        window.timezone.name()
                    ),
                },
                Err(e) => DoctorCheck {
                    name: "window".to_string(),
                    status: CheckStatus::Error,
                    message: e.to_string(),
                },
            });
        }
        Err(e) => checks.push(DoctorCheck {
            name: "config".to_string(),
            status: CheckStatus::Error,
            message: CliError::from(e).message,
        }),
    }

    // Snapshot presence and decodability
    match settings.snapshot.as_deref() {
        None => checks.push(DoctorCheck {
            name: "snapshot".to_string(),
            status: CheckStatus::Warning,
            message: "No snapshot configured (set --snapshot or PULSE_SNAPSHOT)".to_string(),
        }),
        Some(path) if path.to_string_lossy() != "-" && !path.exists() => checks.push(DoctorCheck {
            name: "snapshot".to_string(),
            status: CheckStatus::Error,
            message: format!("Snapshot file {} does not exist", path.display()),
        }),
        Some(_) => checks.push(match load_snapshot(settings) {
            Ok(snapshot) => DoctorCheck {
                name: "snapshot".to_string(),
                status: if snapshot.skipped.is_empty() {
                    CheckStatus::Ok
                } else {
                    CheckStatus::Warning
                },
                message: format!(
                    "{} members, {} visits, {} facilities, {} skipped documents",
                    snapshot.members.len(),
                    snapshot.visits.len(),
                    snapshot.facilities.len(),
                    snapshot.skipped.len()
                ),
            },
            Err(e) => DoctorCheck {
                name: "snapshot".to_string(),
                status: CheckStatus::Error,
                message: CliError::from(e).message,
            },
        }),
    }

    let stdin_check = if atty::is(atty::Stream::Stdin) {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a TTY (pass a snapshot path)".to_string(),
        }
    } else {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a pipe (--snapshot - reads it)".to_string(),
        }
    };
    checks.push(stdin_check);

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: PULSE_VERSION.to_string(),
        checks,
    };
    print_output(&report, settings.output_format)?;

    let has_errors = report.checks.iter().any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        Err(PulseCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

/// Configuration file (if any) with flag and environment overrides applied
fn load_config(settings: &Settings) -> Result<AnalyticsConfig, PulseCliError> {
    let file = match settings.config.as_deref() {
        Some(path) => Some(std::fs::read_to_string(path)?),
        None => None,
    };
    Ok(AnalyticsConfig::layered(file.as_deref(), &settings.overrides())?)
}

fn load_snapshot(settings: &Settings) -> Result<Snapshot, PulseCliError> {
    let path = settings.snapshot.as_deref().ok_or(PulseCliError::NoSnapshot)?;
    read_snapshot(path)
}

fn read_snapshot(path: &Path) -> Result<Snapshot, PulseCliError> {
    if path.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(Snapshot::parse(&buffer)?)
    } else {
        Ok(Snapshot::from_path(path)?)
    }
}

fn build_processor(settings: &Settings) -> Result<ReportProcessor<SnapshotStore>, PulseCliError> {
    let config = load_config(settings)?;
    let snapshot = load_snapshot(settings)?;
    Ok(ReportProcessor::new(SnapshotStore::new(snapshot), config)?)
}

fn print_output<T: Serialize>(value: &T, format: OutputFormat) -> Result<(), PulseCliError> {
    let output = match format {
        OutputFormat::Json => serde_json::to_string(value)?,
        OutputFormat::JsonPretty => serde_json::to_string_pretty(value)?,
    };
    println!("{}", output);
    Ok(())
}

// Error types

#[derive(Debug)]
enum PulseCliError {
    Io(io::Error),
    Report(ReportError),
    Json(serde_json::Error),
    NoSnapshot,
    ReportFailed { status: u16, message: String },
    ValidationFailed(usize),
    DoctorFailed,
}

impl From<io::Error> for PulseCliError {
    fn from(e: io::Error) -> Self {
        PulseCliError::Io(e)
    }
}

impl From<ReportError> for PulseCliError {
    fn from(e: ReportError) -> Self {
        PulseCliError::Report(e)
    }
}

impl From<serde_json::Error> for PulseCliError {
    fn from(e: serde_json::Error) -> Self {
        PulseCliError::Json(e)
    }
}

#[derive(Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<PulseCliError> for CliError {
    fn from(e: PulseCliError) -> Self {
        match e {
            PulseCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            PulseCliError::Report(e @ ReportError::ConfigError(_)) => CliError {
                code: "CONFIG_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check --config and the PULSE_* settings".to_string()),
            },
            PulseCliError::Report(e) if e.is_client_error() => CliError {
                code: "INVALID_REQUEST".to_string(),
                message: e.to_string(),
                hint: Some("Check the query flags".to_string()),
            },
            PulseCliError::Report(e) => CliError {
                code: "SNAPSHOT_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Run 'pulse validate' for details".to_string()),
            },
            PulseCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            PulseCliError::NoSnapshot => CliError {
                code: "NO_SNAPSHOT".to_string(),
                message: "No snapshot path given".to_string(),
                hint: Some("Pass --snapshot <file> or set PULSE_SNAPSHOT".to_string()),
            },
            PulseCliError::ReportFailed { status, message } => CliError {
                code: if status < 500 { "INVALID_REQUEST" } else { "REPORT_FAILED" }.to_string(),
                message,
                hint: Some("Set RUST_LOG=vendor_pulse=debug for details".to_string()),
            },
            PulseCliError::ValidationFailed(count) => CliError {
                code: "VALIDATION_FAILED".to_string(),
                message: format!("{} collections have documents reports will exclude", count),
                hint: Some("Review the validation report for details".to_string()),
            },
            PulseCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
        }
    }
}

// Report types

#[derive(Serialize)]
struct DoctorReport {
    producer: String,
    version: String,
    checks: Vec<DoctorCheck>,
}

#[derive(Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

#[derive(Serialize)]
#[serde(rename_all = "lowercase")]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_flags_then_env_then_file() {
        // Only this test touches the environment
        std::env::set_var("PULSE_CURRENCY", "EUR");
        std::env::set_var("PULSE_TIMEOUT_MS", "750");

        let cli = Cli::try_parse_from(["pulse", "--currency", "USD", "validate"]).unwrap();
        let overrides = cli.settings.overrides();
        assert_eq!(overrides.currency.as_deref(), Some("USD"));
        assert_eq!(overrides.timeout_ms, Some(750));

        std::env::remove_var("PULSE_CURRENCY");
        std::env::remove_var("PULSE_TIMEOUT_MS");

        let file = r#"{"currency": "MYR", "timeoutMs": 5000}"#;
        let config = AnalyticsConfig::layered(Some(file), &overrides).unwrap();
        assert_eq!(config.currency, "USD");
        assert_eq!(config.timeout_ms, 750);
    }

    #[test]
    fn test_window_mode_flag_maps_to_kind() {
        let cli = Cli::try_parse_from([
            "pulse",
            "--window-mode",
            "parameterized",
            "--timezone",
            "UTC",
            "doctor",
        ])
        .unwrap();
        let overrides = cli.settings.overrides();
        assert_eq!(overrides.window_kind, Some(WindowKind::Parameterized));
        assert_eq!(overrides.timezone.as_deref(), Some("UTC"));
    }
}
