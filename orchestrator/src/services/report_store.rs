//! HTTP client for the durable report store, with a local record cache

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use calc_shared::{BackendConfig, TargetType};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::error::{OrchestratorError, OrchestratorResult};
use crate::traits::ReportStore;
use crate::types::ReportRecord;

#[derive(Debug, Serialize)]
struct RecordUpdate<'a> {
    id: &'a str,
    status: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    output: Option<&'a Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    year: Option<&'a str>,
}

pub struct HttpReportStore {
    client: reqwest::Client,
    base_url: String,
    /// Report lookups memoised until invalidated
    reports: Mutex<HashMap<String, ReportRecord>>,
}

impl HttpReportStore {
    pub fn new(config: &BackendConfig) -> OrchestratorResult<Self> {
        config.validate()?;
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: config.records_url.trim_end_matches('/').to_string(),
            reports: Mutex::new(HashMap::new()),
        })
    }

    fn reports(&self) -> MutexGuard<'_, HashMap<String, ReportRecord>> {
        self.reports.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_cached(&self, report_id: &str) -> bool {
        self.reports().contains_key(report_id)
    }

    async fn patch(&self, country_id: &str, resource: &str, update: &RecordUpdate<'_>) -> OrchestratorResult<()> {
        let url = format!("{}/{}/{}", self.base_url, country_id, resource);
        debug!("PATCH {} id={} status={}", url, update.id, update.status);

        let response = self.client.patch(url).json(update).send().await?;
        if !response.status().is_success() {
            return Err(OrchestratorError::StoreError {
                message: format!("PATCH {resource} {} returned {}", update.id, response.status()),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ReportStore for HttpReportStore {
    async fn mark_report_complete(
        &self,
        country_id: &str,
        report_id: &str,
        year: Option<String>,
        output: &Value,
    ) -> OrchestratorResult<()> {
        let update = RecordUpdate {
            id: report_id,
            status: "complete",
            output: Some(output),
            year: year.as_deref(),
        };
        self.patch(country_id, "report", &update).await
    }

    async fn mark_report_error(&self, country_id: &str, report_id: &str) -> OrchestratorResult<()> {
        let update = RecordUpdate {
            id: report_id,
            status: "error",
            output: None,
            year: None,
        };
        self.patch(country_id, "report", &update).await
    }

    async fn update_simulation(&self, country_id: &str, simulation_id: &str, output: &Value) -> OrchestratorResult<()> {
        let update = RecordUpdate {
            id: simulation_id,
            status: "complete",
            output: Some(output),
            year: None,
        };
        self.patch(country_id, "simulation", &update).await
    }

    async fn mark_simulation_error(&self, country_id: &str, simulation_id: &str) -> OrchestratorResult<()> {
        let update = RecordUpdate {
            id: simulation_id,
            status: "error",
            output: None,
            year: None,
        };
        self.patch(country_id, "simulation", &update).await
    }

    async fn get_report(&self, country_id: &str, report_id: &str) -> OrchestratorResult<ReportRecord> {
        if let Some(record) = self.reports().get(report_id).cloned() {
            return Ok(record);
        }

        let url = format!("{}/{}/report/{}", self.base_url, country_id, report_id);
        let response = self.client.get(url).send().await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(OrchestratorError::NotFound {
                resource: format!("report {report_id}"),
            });
        }
        if !response.status().is_success() {
            return Err(OrchestratorError::StoreError {
                message: format!("GET report {report_id} returned {}", response.status()),
            });
        }

        // Record API wraps payloads as {status, result}
        let body: Value = response.json().await?;
        let payload = body.get("result").cloned().unwrap_or(body);
        let record: ReportRecord = serde_json::from_value(payload)?;

        self.reports().insert(report_id.to_string(), record.clone());
        Ok(record)
    }

    fn invalidate(&self, target: TargetType, id: &str) {
        if target == TargetType::Report && self.reports().remove(id).is_some() {
            debug!("Invalidated cached report {}", id);
        }
    }
}
