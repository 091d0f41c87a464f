//! Economy-wide strategy: create a remote job once, then poll it

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use calc_shared::{
    calc_debug, calc_info, calc_warn, error_codes, CalcError, CalcId, CalcMetadata, CalcParams, CalcSettings,
    CalcStatus, CalcType, InFlight,
};

use crate::core::{ProgressSynthesizer, ServerHint};
use crate::traits::{CalcStrategy, EconomyBackend, RefetchConfig};
use crate::types::{AnalysisJob, JobState};

const STARTING_MESSAGE: &str = "Starting economy analysis...";
const QUEUED_MESSAGE: &str = "Waiting in queue...";
const RETRYING_MESSAGE: &str = "Retrying status check...";
const FAILED_MESSAGE: &str = "Economy analysis failed";

#[derive(Default)]
struct JobBook {
    /// calcId -> remote job id
    jobs: HashMap<CalcId, String>,
    /// Consecutive failed polls per calcId
    errors: HashMap<CalcId, u32>,
}

pub struct EconomyStrategy {
    backend: Arc<dyn EconomyBackend>,
    settings: CalcSettings,
    synthesizer: ProgressSynthesizer,
    book: Mutex<JobBook>,
}

impl EconomyStrategy {
    pub fn new(backend: Arc<dyn EconomyBackend>, settings: CalcSettings) -> Self {
        Self {
            backend,
            synthesizer: ProgressSynthesizer::new(&settings),
            settings,
            book: Mutex::new(JobBook::default()),
        }
    }

    fn book(&self) -> MutexGuard<'_, JobBook> {
        self.book.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn job_id(&self, calc_id: &CalcId) -> Option<String> {
        self.book().jobs.get(calc_id).cloned()
    }

    pub fn error_count(&self, calc_id: &CalcId) -> u32 {
        self.book().errors.get(calc_id).copied().unwrap_or(0)
    }

    fn clear(&self, calc_id: &CalcId) {
        let mut book = self.book();
        book.jobs.remove(calc_id);
        book.errors.remove(calc_id);
    }

    async fn create(&self, params: &CalcParams, metadata: &CalcMetadata) -> CalcStatus {
        let calc_id = &metadata.calc_id;
        match self.backend.create_job(params).await {
            Ok(job) => {
                calc_info!(calc_id, "Created economy job {}", job.job_id);
                self.book().jobs.insert(calc_id.clone(), job.job_id.clone());
                match job.status {
                    JobState::Pending | JobState::Running => {
                        let estimate = self.synthesizer.estimate(metadata.elapsed(), CalcType::Economy, Some(&hint(&job)));
                        let detail = InFlight::new(estimate.progress, STARTING_MESSAGE)
                            .with_queue_position(job.queue_position)
                            .with_estimated_time_remaining_ms(job.estimated_time_remaining_ms);
                        CalcStatus::pending(metadata.clone(), detail)
                    }
                    _ => self.interpret(job, metadata),
                }
            }
            Err(e) => {
                calc_warn!(calc_id, "Failed to create economy job: {}", e);
                CalcStatus::error(
                    metadata.clone(),
                    CalcError::retryable(error_codes::START_FAILED, format!("Failed to start economy analysis: {e}")),
                )
            }
        }
    }

    async fn poll(&self, job_id: &str, metadata: &CalcMetadata) -> CalcStatus {
        let calc_id = &metadata.calc_id;
        match self.backend.get_job(job_id).await {
            Ok(job) => {
                self.book().errors.remove(calc_id);
                self.interpret(job, metadata)
            }
            Err(e) => {
                let attempts = {
                    let mut book = self.book();
                    let count = book.errors.entry(calc_id.clone()).or_insert(0);
                    *count += 1;
                    *count
                };
                calc_warn!(
                    calc_id,
                    "Poll error ({}/{}): {}",
                    attempts,
                    self.settings.poll_error_threshold,
                    e
                );

                if attempts >= self.settings.poll_error_threshold {
                    self.clear(calc_id);
                    return CalcStatus::error(
                        metadata.clone(),
                        CalcError::retryable(
                            error_codes::POLL_FAILED,
                            format!("Economy analysis status check failed after {attempts} attempts: {e}"),
                        ),
                    );
                }

                let progress = self.synthesizer.synthetic(metadata.elapsed(), CalcType::Economy);
                CalcStatus::pending(metadata.clone(), InFlight::new(progress, RETRYING_MESSAGE))
            }
        }
    }

    /// Map a remote job snapshot onto the unified status
    fn interpret(&self, job: AnalysisJob, metadata: &CalcMetadata) -> CalcStatus {
        let calc_id = &metadata.calc_id;
        match job.status {
            JobState::Completed => {
                self.clear(calc_id);
                match job.result {
                    Some(result) if !result.is_null() => CalcStatus::complete(metadata.clone(), result),
                    _ => CalcStatus::error(
                        metadata.clone(),
                        CalcError::retryable(
                            error_codes::ECONOMY_ANALYSIS_FAILED,
                            "Economy analysis completed without a result",
                        ),
                    ),
                }
            }
            JobState::Failed => {
                self.clear(calc_id);
                let message = job.error_message.unwrap_or_else(|| FAILED_MESSAGE.to_string());
                CalcStatus::error(
                    metadata.clone(),
                    CalcError::retryable(error_codes::ECONOMY_ANALYSIS_FAILED, message),
                )
            }
            JobState::Pending => {
                let estimate = self.synthesizer.estimate(metadata.elapsed(), CalcType::Economy, Some(&hint(&job)));
                let message = match job.queue_position {
                    Some(position) if position > 0 => estimate.message,
                    _ => QUEUED_MESSAGE.to_string(),
                };
                let detail = InFlight::new(estimate.progress, message)
                    .with_queue_position(job.queue_position)
                    .with_estimated_time_remaining_ms(job.estimated_time_remaining_ms);
                CalcStatus::pending(metadata.clone(), detail)
            }
            JobState::Running => {
                let estimate = self.synthesizer.estimate(metadata.elapsed(), CalcType::Economy, Some(&hint(&job)));
                let detail = InFlight::new(estimate.progress, estimate.message)
                    .with_queue_position(job.queue_position)
                    .with_estimated_time_remaining_ms(job.estimated_time_remaining_ms);
                CalcStatus::computing(metadata.clone(), detail)
            }
        }
    }

    fn timed_out(&self, metadata: &CalcMetadata) -> CalcStatus {
        self.clear(&metadata.calc_id);
        let minutes = self.settings.economy_timeout.as_secs() / 60;
        CalcStatus::error(
            metadata.clone(),
            CalcError::retryable(
                error_codes::TIMEOUT,
                format!("Economy analysis timed out after {minutes} minutes"),
            ),
        )
    }
}

fn hint(job: &AnalysisJob) -> ServerHint {
    ServerHint {
        queue_position: job.queue_position,
        estimated_time_remaining_ms: job.estimated_time_remaining_ms,
    }
}

#[async_trait]
impl CalcStrategy for EconomyStrategy {
    fn calc_type(&self) -> CalcType {
        CalcType::Economy
    }

    async fn execute(&self, params: &CalcParams, metadata: &CalcMetadata) -> CalcStatus {
        if metadata.elapsed() > self.settings.economy_timeout {
            calc_warn!(metadata.calc_id, "Economy analysis exceeded {:?}", self.settings.economy_timeout);
            return self.timed_out(metadata);
        }

        // A hung request must not outlive the ceiling
        let remaining = self.settings.economy_timeout.saturating_sub(metadata.elapsed());
        let step = async {
            match self.job_id(&metadata.calc_id) {
                None => self.create(params, metadata).await,
                Some(job_id) => {
                    calc_debug!(metadata.calc_id, "Polling economy job {}", job_id);
                    self.poll(&job_id, metadata).await
                }
            }
        };

        match tokio::time::timeout(remaining, step).await {
            Ok(status) => status,
            Err(_) => {
                calc_warn!(metadata.calc_id, "Backend request outlived the {:?} ceiling", self.settings.economy_timeout);
                self.timed_out(metadata)
            }
        }
    }

    fn refetch_config(&self, current: &CalcStatus) -> RefetchConfig {
        if current.is_in_flight() {
            RefetchConfig::every(self.settings.economy_poll_interval)
        } else {
            RefetchConfig::stop()
        }
    }

    fn release(&self, calc_id: &CalcId) {
        self.clear(calc_id);
    }
}
