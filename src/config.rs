//! Analytics configuration

use crate::error::ReportError;
use crate::types::ObjectId;
use crate::window::{parse_timezone, WindowMode};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Vendor reported on when a request names none
pub const DEFAULT_VENDOR_ID: &str = "67f773acc9504931fcc411ec";

/// Currency label used in series names
pub const DEFAULT_CURRENCY: &str = "SGD";

/// Default per-request computation budget
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Configuration shared by every request a processor serves
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AnalyticsConfig {
    /// How report windows are chosen
    pub window: WindowMode,
    /// 24-hex vendor id used for blank `vendorId`
    pub default_vendor: String,
    pub currency: String,
    /// Per-request deadline; `0` disables it
    pub timeout_ms: u64,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            window: WindowMode::default(),
            default_vendor: DEFAULT_VENDOR_ID.to_string(),
            currency: DEFAULT_CURRENCY.to_string(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

/// Window mode named without its bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowKind {
    Fixed,
    Parameterized,
}

/// Settings layered over a configuration file, e.g. from flags or the
/// environment. `None` keeps the file's value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigOverrides {
    pub window_kind: Option<WindowKind>,
    /// Fixed mode only
    pub window_start: Option<DateTime<Utc>>,
    /// Fixed mode only
    pub window_end: Option<DateTime<Utc>>,
    pub timezone: Option<String>,
    pub default_vendor: Option<String>,
    pub currency: Option<String>,
    pub timeout_ms: Option<u64>,
}

impl AnalyticsConfig {
    /// Parse from JSON; absent fields take their defaults
    pub fn from_json(json: &str) -> Result<Self, ReportError> {
        let config = Self::parse_json(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Build from an optional JSON file body with `overrides` on top.
    ///
    /// Only the merged result is validated, so an override may repair a file
    /// value.
    pub fn layered(file: Option<&str>, overrides: &ConfigOverrides) -> Result<Self, ReportError> {
        let base = match file {
            Some(json) => Self::parse_json(json)?,
            None => Self::default(),
        };
        base.with_overrides(overrides)
    }

    /// Apply `overrides` and validate the result.
    ///
    /// Switching a parameterized configuration to fixed starts from the
    /// default fixed range.
    pub fn with_overrides(mut self, overrides: &ConfigOverrides) -> Result<Self, ReportError> {
        let timezone = overrides
            .timezone
            .clone()
            .unwrap_or_else(|| self.window.timezone().to_string());

        self.window = match (overrides.window_kind, self.window) {
            (Some(WindowKind::Parameterized), _) | (None, WindowMode::Parameterized { .. }) => {
                WindowMode::Parameterized { timezone }
            }
            (Some(WindowKind::Fixed), current) | (None, current) => {
                let (start, end) = match current {
                    WindowMode::Fixed { start, end, .. } => (start, end),
                    WindowMode::Parameterized { .. } => WindowMode::default_fixed_range(),
                };
                WindowMode::Fixed {
                    start: overrides.window_start.unwrap_or(start),
                    end: overrides.window_end.unwrap_or(end),
                    timezone,
                }
            }
        };
        if let Some(vendor) = &overrides.default_vendor {
            self.default_vendor = vendor.clone();
        }
        if let Some(currency) = &overrides.currency {
            self.currency = currency.clone();
        }
        if let Some(timeout_ms) = overrides.timeout_ms {
            self.timeout_ms = timeout_ms;
        }

        self.validate()?;
        Ok(self)
    }

    fn parse_json(json: &str) -> Result<Self, ReportError> {
        serde_json::from_str(json)
            .map_err(|e| ReportError::ConfigError(format!("invalid configuration JSON: {e}")))
    }

    /// Check the configuration can serve requests
    pub fn validate(&self) -> Result<(), ReportError> {
        parse_timezone(self.window.timezone())
            .map_err(|e| ReportError::ConfigError(e.to_string()))?;

        if let WindowMode::Fixed { start, end, .. } = &self.window {
            if start >= end {
                return Err(ReportError::ConfigError(format!(
                    "fixed window start {start} must be before end {end}"
                )));
            }
        }

        self.default_vendor_id()?;

        if self.currency.trim().is_empty() {
            return Err(ReportError::ConfigError("currency label must not be empty".into()));
        }
        Ok(())
    }

    pub fn default_vendor_id(&self) -> Result<ObjectId, ReportError> {
        ObjectId::parse_str(self.default_vendor.trim()).ok_or_else(|| {
            ReportError::ConfigError(format!(
                "default vendor '{}' is not a 24-character ObjectId hex",
                self.default_vendor
            ))
        })
    }

    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_ms > 0).then(|| Duration::from_millis(self.timeout_ms))
    }
}
