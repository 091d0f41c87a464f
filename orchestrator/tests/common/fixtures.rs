//! Test fixtures and data for orchestrator tests

use calc_orchestrator::{AnalysisJob, JobState, ReportRecord};
use calc_shared::{
    CalcError, CalcId, CalcMetadata, CalcStartConfig, CalcStatus, CalcType, InFlight, Population, TargetType,
};
use serde_json::{json, Value};

/// Standard test data and fixtures
pub struct TestFixtures;

impl TestFixtures {
    pub const COUNTRY: &'static str = "us";
    pub const YEAR: &'static str = "2025";
    pub const BASELINE_POLICY: &'static str = "2";
    pub const REFORM_POLICY: &'static str = "88";
    pub const JOB_ID: &'static str = "job-42";
    pub const HOUSEHOLD_ID: &'static str = "hh-9";

    /// Report-targeted nationwide economy run
    pub fn economy_config(calc_id: &str) -> CalcStartConfig {
        CalcStartConfig {
            calc_id: CalcId::from(calc_id),
            target_type: TargetType::Report,
            country_id: Self::COUNTRY.to_string(),
            population: Population::Geography { geography_id: None },
            baseline_policy_id: Self::BASELINE_POLICY.to_string(),
            reform_policy_id: Some(Self::REFORM_POLICY.to_string()),
            report_id: None,
            year: Some(Self::YEAR.to_string()),
        }
    }

    /// Simulation-targeted household run belonging to `report_id`
    pub fn household_config(calc_id: &str, report_id: Option<&str>) -> CalcStartConfig {
        CalcStartConfig {
            calc_id: CalcId::from(calc_id),
            target_type: TargetType::Simulation,
            country_id: Self::COUNTRY.to_string(),
            population: Population::Household {
                household_id: Self::HOUSEHOLD_ID.to_string(),
            },
            baseline_policy_id: Self::BASELINE_POLICY.to_string(),
            reform_policy_id: None,
            report_id: report_id.map(str::to_string),
            year: Some(Self::YEAR.to_string()),
        }
    }

    pub fn economy_result() -> Value {
        json!({
            "budget": { "budgetary_impact": -1.2e9 },
            "poverty": { "change": -0.004 }
        })
    }

    pub fn household_result() -> Value {
        json!({ "household_net_income": 51234.5 })
    }

    pub fn pending_job(queue_position: u32) -> AnalysisJob {
        AnalysisJob {
            queue_position: Some(queue_position),
            ..AnalysisJob::new(Self::JOB_ID, JobState::Pending)
        }
    }

    pub fn running_job() -> AnalysisJob {
        AnalysisJob::new(Self::JOB_ID, JobState::Running)
    }

    pub fn completed_job() -> AnalysisJob {
        AnalysisJob {
            result: Some(Self::economy_result()),
            ..AnalysisJob::new(Self::JOB_ID, JobState::Completed)
        }
    }

    pub fn failed_job(message: &str) -> AnalysisJob {
        AnalysisJob {
            error_message: Some(message.to_string()),
            ..AnalysisJob::new(Self::JOB_ID, JobState::Failed)
        }
    }

    pub fn report_record(report_id: &str, simulation_ids: &[&str]) -> ReportRecord {
        ReportRecord {
            id: report_id.to_string(),
            simulation_ids: simulation_ids.iter().map(|id| id.to_string()).collect(),
            year: Some(Self::YEAR.to_string()),
            status: Some("pending".to_string()),
        }
    }

    pub fn metadata(calc_id: &str, calc_type: CalcType) -> CalcMetadata {
        CalcMetadata::new(CalcId::from(calc_id), calc_type, TargetType::Simulation)
    }

    pub fn computing(calc_id: &str, progress: f64, message: &str) -> CalcStatus {
        CalcStatus::computing(Self::metadata(calc_id, CalcType::Economy), InFlight::new(progress, message))
    }

    pub fn complete(calc_id: &str, result: Value) -> CalcStatus {
        CalcStatus::complete(Self::metadata(calc_id, CalcType::Household), result)
    }

    pub fn failed(calc_id: &str, code: &str, message: &str) -> CalcStatus {
        CalcStatus::error(Self::metadata(calc_id, CalcType::Economy), CalcError::new(code, message, false))
    }
}
