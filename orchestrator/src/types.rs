//! Records exchanged with the remote compute backend and the durable store

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Remote lifecycle of an economy analysis job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Pending,
    Running,
    Completed,
    Failed,
}

/// Snapshot of one remote analysis job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisJob {
    pub job_id: String,
    pub status: JobState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue_position: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_time_remaining_ms: Option<u64>,
    /// Impact payload, present once the job completed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}

impl AnalysisJob {
    pub fn new(job_id: impl Into<String>, status: JobState) -> Self {
        Self {
            job_id: job_id.into(),
            status,
            error_message: None,
            queue_position: None,
            estimated_time_remaining_ms: None,
            result: None,
        }
    }
}

/// Durable report record as far as persistence needs it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportRecord {
    pub id: String,
    #[serde(default)]
    pub simulation_ids: Vec<String>,
    #[serde(default)]
    pub year: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}
