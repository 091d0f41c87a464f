//! Writes completed results back to the durable store
//!
//! One attempt, a fixed delay, one retry. There is no backoff growth.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use calc_shared::{calc_debug, calc_info, calc_warn, CalcId, CalcMetadata, CalcStatus, TargetType};
use serde_json::Value;

use crate::error::{OrchestratorError, OrchestratorResult};
use crate::traits::{ReportStore, StatusCache};

/// Request-level details the durable write needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistContext {
    pub country_id: String,
    pub year: Option<String>,
}

pub struct ResultPersister {
    store: Arc<dyn ReportStore>,
    cache: Arc<dyn StatusCache>,
    retry_delay: Duration,
    /// report id -> sibling attempts whose outputs were last written to it
    report_writes: Mutex<HashMap<String, Vec<CalcMetadata>>>,
}

impl ResultPersister {
    pub fn new(store: Arc<dyn ReportStore>, cache: Arc<dyn StatusCache>, retry_delay: Duration) -> Self {
        Self {
            store,
            cache,
            retry_delay,
            report_writes: Mutex::new(HashMap::new()),
        }
    }

    fn report_writes(&self) -> MutexGuard<'_, HashMap<String, Vec<CalcMetadata>>> {
        self.report_writes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Claim the parent report write for this set of sibling attempts
    ///
    /// Returns false when the same attempts were already written (or are
    /// being written) by another sibling.
    fn claim_report_write(&self, report_id: &str, attempts: &[CalcMetadata]) -> bool {
        let mut writes = self.report_writes();
        if writes.get(report_id).is_some_and(|written| written.as_slice() == attempts) {
            return false;
        }
        writes.insert(report_id.to_string(), attempts.to_vec());
        true
    }

    fn release_report_write(&self, report_id: &str, attempts: &[CalcMetadata]) {
        let mut writes = self.report_writes();
        if writes.get(report_id).is_some_and(|written| written.as_slice() == attempts) {
            writes.remove(report_id);
        }
    }

    /// Persist a `complete` status, retrying once after the fixed delay
    pub async fn persist(&self, status: &CalcStatus, context: &PersistContext) -> OrchestratorResult<()> {
        let metadata = &status.metadata;
        let result = match status.result() {
            Some(result) if !result.is_null() => result,
            _ => {
                return Err(OrchestratorError::NothingToPersist {
                    calc_id: metadata.calc_id.clone(),
                    status: status.kind(),
                })
            }
        };

        if let Err(first) = self.write(status, result, context).await {
            calc_warn!(metadata.calc_id, "Persistence failed, retrying once: {}", first);
            tokio::time::sleep(self.retry_delay).await;

            if let Err(retry) = self.write(status, result, context).await {
                return Err(OrchestratorError::PersistenceFailed {
                    target: metadata.target_type,
                    message: retry.to_string(),
                });
            }
        }

        calc_info!(metadata.calc_id, "Persisted {} result", metadata.target_type);
        Ok(())
    }

    /// Best-effort failure record in the durable store
    ///
    /// A failed simulation is marked along with its parent report.
    pub async fn record_failure(&self, status: &CalcStatus, context: &PersistContext) -> OrchestratorResult<()> {
        let metadata = &status.metadata;
        let id = metadata.calc_id.as_str();
        match metadata.target_type {
            TargetType::Report => self.fail_report(id, context).await,
            TargetType::Simulation => {
                self.store.mark_simulation_error(&context.country_id, id).await?;
                self.store.invalidate(TargetType::Simulation, id);

                match &metadata.report_id {
                    Some(report_id) => self.fail_report(report_id, context).await,
                    None => Ok(()),
                }
            }
        }
    }

    async fn fail_report(&self, report_id: &str, context: &PersistContext) -> OrchestratorResult<()> {
        self.store.mark_report_error(&context.country_id, report_id).await?;
        self.store.invalidate(TargetType::Report, report_id);
        Ok(())
    }

    async fn write(&self, status: &CalcStatus, result: &Value, context: &PersistContext) -> OrchestratorResult<()> {
        let metadata = &status.metadata;
        let id = metadata.calc_id.as_str();
        match metadata.target_type {
            TargetType::Report => self.write_report(id, context.year.clone(), result, context).await,
            TargetType::Simulation => {
                self.store.update_simulation(&context.country_id, id, result).await?;
                self.store.invalidate(TargetType::Simulation, id);

                match &metadata.report_id {
                    Some(report_id) => self.complete_parent_report(report_id, context).await,
                    None => Ok(()),
                }
            }
        }
    }

    async fn write_report(
        &self,
        report_id: &str,
        year: Option<String>,
        output: &Value,
        context: &PersistContext,
    ) -> OrchestratorResult<()> {
        self.store
            .mark_report_complete(&context.country_id, report_id, year, output)
            .await?;
        self.store.invalidate(TargetType::Report, report_id);
        Ok(())
    }

    /// Mark the parent report complete once every sibling simulation is
    ///
    /// The report output is the list of simulation outputs in report order.
    async fn complete_parent_report(&self, report_id: &str, context: &PersistContext) -> OrchestratorResult<()> {
        let report = self.store.get_report(&context.country_id, report_id).await?;

        let mut outputs = Vec::with_capacity(report.simulation_ids.len());
        let mut attempts = Vec::with_capacity(report.simulation_ids.len());
        for simulation_id in &report.simulation_ids {
            let sibling = self.cache.get(&CalcId::from(simulation_id.as_str()));
            match sibling.as_ref().and_then(|s| s.result().map(|output| (output, &s.metadata))) {
                Some((output, metadata)) => {
                    outputs.push(output.clone());
                    attempts.push(metadata.clone());
                }
                None => {
                    calc_debug!(report_id, "Simulation {} not complete yet", simulation_id);
                    return Ok(());
                }
            }
        }
        if outputs.is_empty() {
            return Ok(());
        }

        if !self.claim_report_write(report_id, &attempts) {
            calc_debug!(report_id, "Report already written for these simulations");
            return Ok(());
        }

        let year = report.year.clone().or_else(|| context.year.clone());
        let written = self.write_report(report_id, year, &Value::Array(outputs), context).await;
        if written.is_err() {
            self.release_report_write(report_id, &attempts);
        }
        written
    }
}
