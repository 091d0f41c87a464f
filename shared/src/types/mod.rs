//! Core types used throughout the calculation system

pub mod status;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

pub use status::{error_codes, CalcError, CalcState, CalcStatus, InFlight, StatusKind};

/// Identifier of one calculation attempt (cache and registry key)
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CalcId(String);

impl CalcId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CalcId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for CalcId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for CalcId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Calculation family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalcType {
    Economy,
    Household,
}

impl fmt::Display for CalcType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CalcType::Economy => write!(f, "economy"),
            CalcType::Household => write!(f, "household"),
        }
    }
}

impl std::str::FromStr for CalcType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "economy" | "society_wide" | "societywide" => Ok(CalcType::Economy),
            "household" => Ok(CalcType::Household),
            _ => Err(format!("Unknown calculation type: {s}")),
        }
    }
}

/// Durable record a calculation result is written back to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetType {
    Report,
    Simulation,
}

impl fmt::Display for TargetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetType::Report => write!(f, "report"),
            TargetType::Simulation => write!(f, "simulation"),
        }
    }
}

/// Immutable description of one calculation attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalcMetadata {
    pub calc_id: CalcId,
    pub calc_type: CalcType,
    pub target_type: TargetType,
    pub started_at: DateTime<Utc>,

    /// Parent report of a simulation-targeted calculation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report_id: Option<String>,

    /// Monotonic start, follows the runtime clock (paused in tests)
    #[serde(skip, default = "Instant::now")]
    started: Instant,
}

impl CalcMetadata {
    pub fn new(calc_id: CalcId, calc_type: CalcType, target_type: TargetType) -> Self {
        Self {
            calc_id,
            calc_type,
            target_type,
            started_at: Utc::now(),
            report_id: None,
            started: Instant::now(),
        }
    }

    pub fn with_report_id(mut self, report_id: Option<String>) -> Self {
        self.report_id = report_id;
        self
    }

    /// Time since this attempt started
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn started_instant(&self) -> Instant {
        self.started
    }
}

impl PartialEq for CalcMetadata {
    fn eq(&self, other: &Self) -> bool {
        self.calc_id == other.calc_id
            && self.calc_type == other.calc_type
            && self.target_type == other.target_type
            && self.started_at == other.started_at
            && self.report_id == other.report_id
    }
}

/// Baseline and optional reform policy of a calculation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyIds {
    pub baseline: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reform: Option<String>,
}

impl PolicyIds {
    /// Reform takes precedence over baseline
    pub fn effective(&self) -> &str {
        self.reform.as_deref().unwrap_or(&self.baseline)
    }
}

/// Everything a strategy needs to talk to the compute backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalcParams {
    pub calc_id: CalcId,
    pub country_id: String,
    pub calc_type: CalcType,
    pub policy_ids: PolicyIds,
    pub population_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<String>,
}

/// Population a calculation runs over
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Population {
    Household { household_id: String },
    Geography { geography_id: Option<String> },
}

/// Request to start (or rejoin) one calculation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalcStartConfig {
    pub calc_id: CalcId,
    pub target_type: TargetType,
    pub country_id: String,
    pub population: Population,
    pub baseline_policy_id: String,
    #[serde(default)]
    pub reform_policy_id: Option<String>,
    #[serde(default)]
    pub report_id: Option<String>,
    #[serde(default)]
    pub year: Option<String>,
}

impl CalcStartConfig {
    pub fn calc_type(&self) -> CalcType {
        match self.population {
            Population::Household { .. } => CalcType::Household,
            Population::Geography { .. } => CalcType::Economy,
        }
    }

    /// Metadata for a fresh attempt
    pub fn build_metadata(&self) -> CalcMetadata {
        CalcMetadata::new(self.calc_id.clone(), self.calc_type(), self.target_type)
            .with_report_id(self.report_id.clone())
    }

    pub fn build_params(&self) -> CalcParams {
        let (population_id, region) = match &self.population {
            Population::Household { household_id } => (household_id.clone(), None),
            Population::Geography { geography_id } => {
                let region = geography_id.clone().unwrap_or_else(|| self.country_id.clone());
                (region.clone(), Some(region))
            }
        };

        CalcParams {
            calc_id: self.calc_id.clone(),
            country_id: self.country_id.clone(),
            calc_type: self.calc_type(),
            policy_ids: PolicyIds {
                baseline: self.baseline_policy_id.clone(),
                reform: self.reform_policy_id.clone(),
            },
            population_id,
            region,
            year: self.year.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geography_config(geography_id: Option<&str>) -> CalcStartConfig {
        CalcStartConfig {
            calc_id: CalcId::from("report-1"),
            target_type: TargetType::Report,
            country_id: "us".to_string(),
            population: Population::Geography {
                geography_id: geography_id.map(str::to_string),
            },
            baseline_policy_id: "1".to_string(),
            reform_policy_id: Some("2".to_string()),
            report_id: None,
            year: Some("2025".to_string()),
        }
    }

    #[test]
    fn test_geography_without_id_defaults_region_to_country() {
        let params = geography_config(None).build_params();

        assert_eq!(params.calc_type, CalcType::Economy);
        assert_eq!(params.region.as_deref(), Some("us"));
        assert_eq!(params.population_id, "us");
        assert_eq!(params.policy_ids.effective(), "2");
    }

    #[test]
    fn test_household_population_has_no_region() {
        let mut config = geography_config(Some("ca"));
        config.population = Population::Household {
            household_id: "hh-9".to_string(),
        };
        config.reform_policy_id = None;

        let params = config.build_params();
        assert_eq!(params.calc_type, CalcType::Household);
        assert_eq!(params.population_id, "hh-9");
        assert!(params.region.is_none());
        assert_eq!(params.policy_ids.effective(), "1");
    }

    #[test]
    fn test_calc_type_parsing() {
        assert_eq!("economy".parse::<CalcType>().unwrap(), CalcType::Economy);
        assert_eq!("Household".parse::<CalcType>().unwrap(), CalcType::Household);
        assert!("bogus".parse::<CalcType>().is_err());
    }

    #[test]
    fn test_metadata_equality_ignores_monotonic_start() {
        let metadata = CalcMetadata::new(CalcId::from("a"), CalcType::Household, TargetType::Simulation);
        let copy = metadata.clone();
        assert_eq!(metadata, copy);
        assert_eq!(metadata.calc_id.to_string(), "a");
    }
}
