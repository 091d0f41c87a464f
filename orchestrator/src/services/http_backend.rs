//! HTTP client for the remote compute backend
//!
//! Economy-wide runs go through the job API (create, then poll by id).
//! Household runs are a single request that returns once the result exists.

use async_trait::async_trait;
use calc_shared::{BackendConfig, CalcParams};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{OrchestratorError, OrchestratorResult};
use crate::traits::{EconomyBackend, HouseholdBackend};
use crate::types::{AnalysisJob, JobState};

/// Dataset used for nationwide US economy runs
const US_NATIONWIDE_DATASET: &str = "enhanced_cps";

#[derive(Debug, Serialize)]
struct CreateJobRequest<'a> {
    tax_benefit_model_name: String,
    region: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    dataset_id: Option<&'a str>,
    policy_id: &'a str,
}

/// Job response; anything besides the bookkeeping fields is result payload
#[derive(Debug, Deserialize)]
struct JobResponse {
    report_id: String,
    status: JobState,
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    queue_position: Option<u32>,
    #[serde(default)]
    estimated_time_remaining_ms: Option<u64>,
    #[serde(flatten)]
    rest: Map<String, Value>,
}

impl From<JobResponse> for AnalysisJob {
    fn from(response: JobResponse) -> Self {
        let result = match response.status {
            JobState::Completed if !response.rest.is_empty() => Some(Value::Object(response.rest)),
            _ => None,
        };
        AnalysisJob {
            job_id: response.report_id,
            status: response.status,
            error_message: response.error_message,
            queue_position: response.queue_position,
            estimated_time_remaining_ms: response.estimated_time_remaining_ms,
            result,
        }
    }
}

#[derive(Debug, Deserialize)]
struct HouseholdResponse {
    status: String,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    message: Option<String>,
}

/// reqwest-backed implementation of both backend traits
#[derive(Debug, Clone)]
pub struct HttpComputeBackend {
    client: reqwest::Client,
    config: BackendConfig,
}

impl HttpComputeBackend {
    pub fn new(config: BackendConfig) -> OrchestratorResult<Self> {
        config.validate()?;
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self { client, config })
    }

    fn analysis_url(&self, path: &str) -> String {
        format!("{}/{}", self.config.analysis_url.trim_end_matches('/'), path)
    }

    fn records_url(&self, path: &str) -> String {
        format!("{}/{}", self.config.records_url.trim_end_matches('/'), path)
    }
}

fn model_name(country_id: &str) -> String {
    format!("policyengine_{country_id}")
}

/// Nationwide US runs need an explicit dataset; everything else uses the default
fn dataset_for(country_id: &str, region: &str) -> Option<&'static str> {
    (country_id == "us" && region == "us").then_some(US_NATIONWIDE_DATASET)
}

async fn error_body(response: reqwest::Response) -> String {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    if body.is_empty() {
        status.to_string()
    } else {
        format!("{status}: {body}")
    }
}

#[async_trait]
impl EconomyBackend for HttpComputeBackend {
    async fn create_job(&self, params: &CalcParams) -> OrchestratorResult<AnalysisJob> {
        let region = params.region.as_deref().unwrap_or(&params.country_id);
        let request = CreateJobRequest {
            tax_benefit_model_name: model_name(&params.country_id),
            region,
            dataset_id: dataset_for(&params.country_id, region),
            policy_id: params.policy_ids.effective(),
        };
        debug!(calc = %params.calc_id, "POST economic-impact {:?}", request);

        let response = self
            .client
            .post(self.analysis_url("analysis/economic-impact"))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(OrchestratorError::BackendError {
                message: format!("Failed to create economy analysis: {}", error_body(response).await),
            });
        }
        let job: JobResponse = response.json().await?;
        Ok(job.into())
    }

    async fn get_job(&self, job_id: &str) -> OrchestratorResult<AnalysisJob> {
        let response = self
            .client
            .get(self.analysis_url(&format!("analysis/economic-impact/{job_id}")))
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(OrchestratorError::NotFound {
                resource: format!("economy analysis {job_id}"),
            });
        }
        if !response.status().is_success() {
            return Err(OrchestratorError::BackendError {
                message: format!("Failed to get economy analysis: {}", error_body(response).await),
            });
        }
        let job: JobResponse = response.json().await?;
        Ok(job.into())
    }
}

#[async_trait]
impl HouseholdBackend for HttpComputeBackend {
    async fn calculate(&self, params: &CalcParams) -> OrchestratorResult<Value> {
        let url = self.records_url(&format!(
            "{}/household/{}/policy/{}",
            params.country_id,
            params.population_id,
            params.policy_ids.effective()
        ));
        debug!(calc = %params.calc_id, "GET {}", url);

        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(OrchestratorError::BackendError {
                message: format!("Household calculation failed: {}", error_body(response).await),
            });
        }

        let body: HouseholdResponse = response.json().await?;
        match (body.status.as_str(), body.result) {
            ("ok", Some(result)) => Ok(result),
            _ => Err(OrchestratorError::BackendError {
                message: body
                    .message
                    .unwrap_or_else(|| "Household calculation failed".to_string()),
            }),
        }
    }
}
