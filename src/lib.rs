//! Vendor Pulse - Analytics reports for multi-vendor loyalty and booking data
//!
//! Pulse turns raw member, visit, booking and facility documents into
//! chart-ready report payloads through a deterministic pipeline: document
//! decoding → normalization → window filtering → aggregation → assembly.
//!
//! ## Reports
//!
//! - **Time series**: weekly bookings, sales and cancellations; monthly sign-ups
//! - **Breakdowns**: revenue by loyalty tier, bookings by facility
//! - **Cohorts**: first-time vs returning visits, AOV by in-window visit count

pub mod aggregate;
pub mod assembler;
pub mod classifier;
pub mod config;
pub mod error;
pub mod metrics;
pub mod normalizer;
pub mod pipeline;
pub mod reports;
pub mod schema;
pub mod store;
pub mod types;
pub mod window;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use config::AnalyticsConfig;
pub use error::ReportError;
pub use pipeline::{KpiRequest, KpiSummary, ReportProcessor, ReportRequest, ReportResponse};
pub use store::{DocumentStore, SnapshotStore};
pub use types::{ReportKind, ReportPayload};

// Snapshot exports
pub use schema::{Snapshot, ValidationReport};

/// Pulse version embedded in all report payloads
pub const PULSE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name for report payloads
pub const PRODUCER_NAME: &str = "vendor-pulse";
