//! Lifecycle of one calculation
//!
//! `created -> started -> polling -> {persisting -> done} | failed`
//!
//! The orchestrator calls its strategy once at start, writes every status it
//! gets back to the cache, and keeps polling on the schedule the strategy
//! asks for until a terminal status arrives. A complete status is persisted,
//! then the orchestrator removes itself from its manager's registry.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use calc_shared::{
    calc_debug, calc_error, calc_info, calc_warn, error_codes, logging, CalcError, CalcId, CalcMetadata, CalcParams,
    CalcSettings, CalcStartConfig, CalcStatus,
};

use crate::core::{CancelToken, PollTimer};
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::manager::OrchestratorRegistry;
use crate::persister::{PersistContext, ResultPersister};
use crate::traits::{CalcStrategy, StatusCache};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Created,
    Started,
    Polling,
    Persisting,
    Done,
    Failed,
}

impl Phase {
    pub fn is_finished(self) -> bool {
        matches!(self, Phase::Done | Phase::Failed)
    }
}

/// Settings shared by every orchestrator of a manager
#[derive(Debug, Clone, Default)]
pub struct OrchestratorSettings {
    pub calc: CalcSettings,

    /// Mark report-targeted failures in the durable store
    pub record_failures: bool,
}

/// Everything fixed at start time
#[derive(Debug, Clone)]
struct RunContext {
    params: CalcParams,
    metadata: CalcMetadata,
    persist: PersistContext,
}

/// Drives one calculation from start to a terminal status
pub struct CalcOrchestrator {
    calc_id: CalcId,
    strategy: Arc<dyn CalcStrategy>,
    cache: Arc<dyn StatusCache>,
    persister: Arc<ResultPersister>,
    registry: Weak<OrchestratorRegistry>,
    settings: OrchestratorSettings,

    phase: Mutex<Phase>,
    run: Mutex<Option<RunContext>>,
    poll: Mutex<Option<PollTimer>>,
    cancelled: AtomicBool,
    last_error: Mutex<Option<String>>,
}

impl CalcOrchestrator {
    pub fn new(
        calc_id: CalcId,
        strategy: Arc<dyn CalcStrategy>,
        cache: Arc<dyn StatusCache>,
        persister: Arc<ResultPersister>,
        registry: Weak<OrchestratorRegistry>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            calc_id,
            strategy,
            cache,
            persister,
            registry,
            settings,
            phase: Mutex::new(Phase::Created),
            run: Mutex::new(None),
            poll: Mutex::new(None),
            cancelled: AtomicBool::new(false),
            last_error: Mutex::new(None),
        }
    }

    pub fn calc_id(&self) -> &CalcId {
        &self.calc_id
    }

    pub fn phase(&self) -> Phase {
        *lock(&self.phase)
    }

    /// Persistence failure message, if the last persist gave up
    pub fn last_error(&self) -> Option<String> {
        lock(&self.last_error).clone()
    }

    pub fn is_polling(&self) -> bool {
        lock(&self.poll)
            .as_ref()
            .is_some_and(|timer| !timer.is_cancelled() && !timer.is_finished())
    }

    fn set_phase(&self, phase: Phase) {
        *lock(&self.phase) = phase;
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Run the first strategy step and schedule polling
    ///
    /// Returns `Err` only for misuse; calculation failures end up in the
    /// cache as an `error` status.
    pub async fn start(self: &Arc<Self>, config: CalcStartConfig) -> OrchestratorResult<()> {
        {
            let mut phase = lock(&self.phase);
            if *phase != Phase::Created {
                return Err(OrchestratorError::AlreadyStarted {
                    calc_id: self.calc_id.clone(),
                });
            }
            *phase = Phase::Started;
        }

        let metadata = config.build_metadata();
        let params = config.build_params();

        if metadata.calc_type != self.strategy.calc_type() {
            let err = OrchestratorError::StrategyMismatch {
                calc_id: self.calc_id.clone(),
                expected: self.strategy.calc_type(),
            };
            self.cache.set(
                &self.calc_id,
                CalcStatus::error(metadata, CalcError::new(error_codes::START_FAILED, err.to_string(), false)),
            );
            self.set_phase(Phase::Failed);
            return Err(err);
        }

        calc_info!(
            self.calc_id,
            "Starting {} calculation for {} (population {})",
            metadata.calc_type,
            metadata.target_type,
            params.population_id
        );

        *lock(&self.run) = Some(RunContext {
            params: params.clone(),
            metadata: metadata.clone(),
            persist: PersistContext {
                country_id: config.country_id.clone(),
                year: config.year.clone(),
            },
        });

        self.cache.set(&self.calc_id, CalcStatus::initializing(metadata.clone()));

        let status = self.strategy.execute(&params, &metadata).await;
        if self.is_cancelled() {
            calc_debug!(self.calc_id, "Cleaned up during start, discarding initial status");
            return Ok(());
        }
        self.cache.set(&self.calc_id, status.clone());

        if status.is_terminal() {
            self.finish(status).await;
            return Ok(());
        }

        match self.strategy.refetch_config(&status).interval {
            Some(interval) => self.start_polling(interval),
            None => {
                calc_warn!(self.calc_id, "Strategy asked for no polling on an in-flight status");
                self.set_phase(Phase::Failed);
                self.unregister();
            }
        }
        Ok(())
    }

    fn start_polling(self: &Arc<Self>, interval: Duration) {
        let weak = Arc::downgrade(self);
        let timer = PollTimer::start(interval, move |token| {
            let weak = weak.clone();
            async move {
                match weak.upgrade() {
                    Some(orchestrator) => orchestrator.poll_once(token).await,
                    None => None,
                }
            }
        });

        let mut poll = lock(&self.poll);
        if self.is_cancelled() {
            timer.cancel();
            return;
        }
        *poll = Some(timer);
        drop(poll);

        self.set_phase(Phase::Polling);
        calc_debug!(self.calc_id, "Polling every {:?}", interval);
    }

    /// One poll step; returns the delay before the next one
    async fn poll_once(self: Arc<Self>, token: CancelToken) -> Option<Duration> {
        let run = lock(&self.run).clone()?;

        let status = self.strategy.execute(&run.params, &run.metadata).await;
        if token.is_cancelled() || self.is_cancelled() {
            calc_debug!(self.calc_id, "Discarding late poll result after cleanup");
            return None;
        }

        self.cache.set(&self.calc_id, status.clone());
        if let (Some(progress), Some(message)) = (status.progress(), status.message()) {
            logging::log_progress(&self.calc_id, progress, message);
        }

        if status.is_terminal() {
            self.finish(status).await;
            return None;
        }
        self.strategy.refetch_config(&status).interval
    }

    /// Terminal handling: persist or record the failure, then unregister
    async fn finish(&self, status: CalcStatus) {
        let persist_context = lock(&self.run).as_ref().map(|run| run.persist.clone());

        if status.is_complete() {
            self.set_phase(Phase::Persisting);
            let outcome = match &persist_context {
                Some(context) => self.persister.persist(&status, context).await,
                None => Err(OrchestratorError::ConfigurationError {
                    field: "run context".to_string(),
                }),
            };
            match outcome {
                Ok(()) => {
                    logging::log_success(&self.calc_id, "Calculation complete and persisted");
                    self.set_phase(Phase::Done);
                }
                Err(e) => {
                    // The result stays complete in the cache; only bookkeeping failed
                    logging::log_error(&self.calc_id, "Failed to persist result", &e);
                    *lock(&self.last_error) = Some(e.to_string());
                    self.set_phase(Phase::Failed);
                }
            }
        } else {
            if let Some(error) = status.calc_error() {
                calc_error!(self.calc_id, "Calculation failed [{}]: {}", error.code, error.message);
            }
            if self.settings.record_failures {
                if let Some(context) = &persist_context {
                    if let Err(e) = self.persister.record_failure(&status, context).await {
                        calc_warn!(self.calc_id, "Could not record failure: {}", e);
                    }
                }
            }
            self.set_phase(Phase::Failed);
        }

        self.stop_polling();
        self.unregister();
    }

    fn stop_polling(&self) -> bool {
        match lock(&self.poll).take() {
            Some(timer) => {
                timer.cancel();
                true
            }
            None => false,
        }
    }

    fn unregister(&self) {
        if let Some(registry) = self.registry.upgrade() {
            if let Some(message) = self.last_error() {
                registry.record_persist_failure(&self.calc_id, message);
            }
            registry.remove_if(&self.calc_id, |entry| std::ptr::eq(entry, self));
        }
    }

    /// Stop polling; idempotent
    ///
    /// A request already sent is not aborted, its result is dropped.
    pub fn cleanup(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        if self.stop_polling() {
            calc_debug!(self.calc_id, "cleanup() stopped polling");
        } else {
            calc_debug!(self.calc_id, "cleanup() found no active polling");
        }
        if !self.phase().is_finished() {
            self.strategy.release(&self.calc_id);
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
