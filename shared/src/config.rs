//! Tunable constants of the calculation system

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::errors::{SharedError, SharedResult};
use crate::types::CalcType;

/// Timing and threshold settings shared by strategies, orchestrators and the persister
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalcSettings {
    /// Synthetic duration estimate for household calculations
    pub household_estimate: Duration,

    /// Synthetic duration estimate for economy-wide calculations
    pub economy_estimate: Duration,

    /// Poll interval while an economy calculation is in flight
    pub economy_poll_interval: Duration,

    /// Progress tick for household calculations
    pub household_poll_interval: Duration,

    /// Consecutive failed polls before a calculation is failed
    pub poll_error_threshold: u32,

    /// Delay before the single persistence retry
    pub persist_retry_delay: Duration,

    /// Highest progress reported before a terminal status arrives
    pub progress_cap: f64,

    /// Hard ceiling on economy calculations
    pub economy_timeout: Duration,

    /// How long a settled household outcome stays readable
    pub household_grace: Duration,
}

impl Default for CalcSettings {
    fn default() -> Self {
        Self {
            household_estimate: Duration::from_secs(45),
            economy_estimate: Duration::from_secs(12 * 60),
            economy_poll_interval: Duration::from_secs(1),
            household_poll_interval: Duration::from_millis(500),
            poll_error_threshold: 3,
            persist_retry_delay: Duration::from_secs(1),
            progress_cap: 95.0,
            economy_timeout: Duration::from_secs(25 * 60),
            household_grace: Duration::from_secs(5),
        }
    }
}

impl CalcSettings {
    /// Synthetic duration estimate for one calculation family
    pub fn estimate_for(&self, calc_type: CalcType) -> Duration {
        match calc_type {
            CalcType::Economy => self.economy_estimate,
            CalcType::Household => self.household_estimate,
        }
    }

    pub fn poll_interval_for(&self, calc_type: CalcType) -> Duration {
        match calc_type {
            CalcType::Economy => self.economy_poll_interval,
            CalcType::Household => self.household_poll_interval,
        }
    }

    pub fn validate(&self) -> SharedResult<()> {
        if self.household_estimate.is_zero() {
            return Err(invalid("household_estimate", &self.household_estimate));
        }
        if self.economy_estimate.is_zero() {
            return Err(invalid("economy_estimate", &self.economy_estimate));
        }
        if self.economy_poll_interval.is_zero() {
            return Err(invalid("economy_poll_interval", &self.economy_poll_interval));
        }
        if self.household_poll_interval.is_zero() {
            return Err(invalid("household_poll_interval", &self.household_poll_interval));
        }
        if self.poll_error_threshold == 0 {
            return Err(invalid("poll_error_threshold", &self.poll_error_threshold));
        }
        if !(0.0..100.0).contains(&self.progress_cap) {
            return Err(invalid("progress_cap", &self.progress_cap));
        }
        Ok(())
    }
}

fn invalid(field: &str, value: &dyn std::fmt::Debug) -> SharedError {
    SharedError::InvalidConfig {
        field: field.to_string(),
        value: format!("{value:?}"),
    }
}

/// Where the remote compute backend and the durable store live
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Base URL of the job-based analysis API
    pub analysis_url: String,

    /// Base URL of the record API (households, reports, simulations)
    pub records_url: String,

    /// Per-request timeout
    pub request_timeout: Duration,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            analysis_url: "http://localhost:8000".to_string(),
            records_url: "http://localhost:5000".to_string(),
            request_timeout: Duration::from_secs(30 * 60),
        }
    }
}

impl BackendConfig {
    pub fn new(analysis_url: impl Into<String>, records_url: impl Into<String>) -> Self {
        Self {
            analysis_url: analysis_url.into(),
            records_url: records_url.into(),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> SharedResult<()> {
        for (field, value) in [("analysis_url", &self.analysis_url), ("records_url", &self.records_url)] {
            if !(value.starts_with("http://") || value.starts_with("https://")) {
                return Err(invalid(field, value));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_constants() {
        let settings = CalcSettings::default();
        assert_eq!(settings.household_estimate, Duration::from_secs(45));
        assert_eq!(settings.economy_estimate, Duration::from_secs(720));
        assert_eq!(settings.economy_poll_interval, Duration::from_secs(1));
        assert_eq!(settings.household_poll_interval, Duration::from_millis(500));
        assert_eq!(settings.poll_error_threshold, 3);
        assert_eq!(settings.persist_retry_delay, Duration::from_secs(1));
        assert_eq!(settings.progress_cap, 95.0);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_zero_threshold_rejected() {
        let settings = CalcSettings {
            poll_error_threshold: 0,
            ..Default::default()
        };
        match settings.validate() {
            Err(SharedError::InvalidConfig { field, .. }) => assert_eq!(field, "poll_error_threshold"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_backend_urls_need_scheme() {
        assert!(BackendConfig::default().validate().is_ok());
        let config = BackendConfig::new("localhost:8000", "http://records");
        assert!(config.validate().is_err());
    }
}
