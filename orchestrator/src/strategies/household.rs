//! Household strategy: one blocking request, synthetic progress while it runs

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use calc_shared::{
    calc_debug, calc_info, calc_warn, error_codes, CalcError, CalcId, CalcMetadata, CalcParams, CalcSettings,
    CalcStatus, CalcType, InFlight,
};

use crate::core::{ActiveCalcTracker, Lookup, Outcome, ProgressSynthesizer};
use crate::traits::{CalcStrategy, HouseholdBackend, RefetchConfig};

pub struct HouseholdStrategy {
    backend: Arc<dyn HouseholdBackend>,
    tracker: Arc<ActiveCalcTracker>,
    settings: CalcSettings,
    synthesizer: ProgressSynthesizer,
}

impl HouseholdStrategy {
    pub fn new(backend: Arc<dyn HouseholdBackend>, settings: CalcSettings) -> Self {
        Self {
            backend,
            tracker: Arc::new(ActiveCalcTracker::new()),
            synthesizer: ProgressSynthesizer::new(&settings),
            settings,
        }
    }

    pub fn tracker(&self) -> &Arc<ActiveCalcTracker> {
        &self.tracker
    }

    /// Synthetic progress for a request that has been open for `elapsed`
    fn computing(&self, metadata: &CalcMetadata, elapsed: Duration) -> CalcStatus {
        let estimate = self.synthesizer.estimate(elapsed, CalcType::Household, None);
        CalcStatus::computing(metadata.clone(), InFlight::new(estimate.progress, estimate.message))
    }

    /// Fire the request in the background and record its outcome when it settles
    fn launch(&self, params: &CalcParams, metadata: &CalcMetadata) {
        let backend = self.backend.clone();
        let tracker = self.tracker.clone();
        let grace = self.settings.household_grace;
        let params = params.clone();
        let calc_id = metadata.calc_id.clone();
        let attempt = metadata.started_instant();

        tokio::spawn(async move {
            let outcome = match backend.calculate(&params).await {
                Ok(result) => {
                    calc_info!(calc_id, "Household calculation finished");
                    Outcome::Complete(result)
                }
                Err(e) => {
                    calc_warn!(calc_id, "Household calculation failed: {}", e);
                    Outcome::Failed(e.to_string())
                }
            };
            tracker.settle(&calc_id, attempt, outcome);

            // Keep the outcome readable for late readers, then forget it
            tokio::time::sleep(grace).await;
            if tracker.expire(&calc_id, attempt) {
                calc_debug!(calc_id, "Household outcome expired after {:?}", grace);
            }
        });
    }
}

fn settled_status(metadata: &CalcMetadata, outcome: Outcome) -> CalcStatus {
    match outcome {
        Outcome::Complete(result) => CalcStatus::complete(metadata.clone(), result),
        Outcome::Failed(message) => CalcStatus::error(
            metadata.clone(),
            CalcError::retryable(error_codes::HOUSEHOLD_CALC_FAILED, message),
        ),
    }
}

#[async_trait]
impl CalcStrategy for HouseholdStrategy {
    fn calc_type(&self) -> CalcType {
        CalcType::Household
    }

    async fn execute(&self, params: &CalcParams, metadata: &CalcMetadata) -> CalcStatus {
        let calc_id = &metadata.calc_id;
        let attempt = metadata.started_instant();

        match self.tracker.lookup(calc_id, attempt) {
            Lookup::Settled(outcome) => settled_status(metadata, outcome),
            // Progress follows the request itself, not this caller's attempt
            Lookup::Running { elapsed, .. } => self.computing(metadata, elapsed),
            Lookup::Absent => {
                if self
                    .tracker
                    .begin(calc_id, attempt, self.settings.household_estimate)
                {
                    calc_info!(calc_id, "Starting household calculation");
                    self.launch(params, metadata);
                }
                self.computing(metadata, metadata.elapsed())
            }
        }
    }

    fn refetch_config(&self, current: &CalcStatus) -> RefetchConfig {
        if current.is_in_flight() {
            RefetchConfig::every(self.settings.household_poll_interval)
        } else {
            RefetchConfig::stop()
        }
    }

    fn release(&self, _calc_id: &CalcId) {
        // The request cannot be aborted; its outcome expires on its own
    }
}
