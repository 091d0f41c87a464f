//! Per-family registry of live orchestrators
//!
//! At most one orchestrator exists per calcId. `start_calculation` registers
//! the new orchestrator before starting it, so a second call arriving while
//! the first is still creating the remote job sees it and does nothing.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use calc_shared::{calc_debug, calc_info, CalcId, CalcStartConfig, CalcType};
use serde::Serialize;

use crate::error::OrchestratorResult;
use crate::orchestrator::{CalcOrchestrator, OrchestratorSettings};
use crate::persister::ResultPersister;
use crate::strategies::{EconomyStrategy, HouseholdStrategy};
use crate::traits::{CalcStrategy, EconomyBackend, HouseholdBackend, ReportStore, StatusCache};

/// calcId -> live orchestrator
///
/// Also remembers the persistence failure of the last finished run per
/// calcId, since the orchestrator itself is gone once it unregisters.
#[derive(Default)]
pub struct OrchestratorRegistry {
    entries: Mutex<HashMap<CalcId, Arc<CalcOrchestrator>>>,
    persist_failures: Mutex<HashMap<CalcId, String>>,
}

impl OrchestratorRegistry {
    fn lock(&self) -> MutexGuard<'_, HashMap<CalcId, Arc<CalcOrchestrator>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn persist_failures(&self) -> MutexGuard<'_, HashMap<CalcId, String>> {
        self.persist_failures.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert unless an entry already exists; returns whether it was inserted
    ///
    /// A new run forgets the persistence failure of the previous one.
    pub fn try_insert(&self, calc_id: &CalcId, orchestrator: Arc<CalcOrchestrator>) -> bool {
        let mut entries = self.lock();
        if entries.contains_key(calc_id) {
            return false;
        }
        entries.insert(calc_id.clone(), orchestrator);
        self.persist_failures().remove(calc_id);
        true
    }

    pub fn record_persist_failure(&self, calc_id: &CalcId, message: String) {
        self.persist_failures().insert(calc_id.clone(), message);
    }

    pub fn persist_failure(&self, calc_id: &CalcId) -> Option<String> {
        self.persist_failures().get(calc_id).cloned()
    }

    pub fn remove(&self, calc_id: &CalcId) -> Option<Arc<CalcOrchestrator>> {
        self.lock().remove(calc_id)
    }

    /// Remove the entry only if `predicate` accepts it
    pub fn remove_if(&self, calc_id: &CalcId, predicate: impl Fn(&CalcOrchestrator) -> bool) -> bool {
        let mut entries = self.lock();
        match entries.get(calc_id) {
            Some(entry) if predicate(entry.as_ref()) => {
                entries.remove(calc_id);
                true
            }
            _ => false,
        }
    }

    pub fn contains(&self, calc_id: &CalcId) -> bool {
        self.lock().contains_key(calc_id)
    }

    pub fn ids(&self) -> Vec<CalcId> {
        let mut ids: Vec<CalcId> = self.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    fn drain(&self) -> Vec<Arc<CalcOrchestrator>> {
        self.lock().drain().map(|(_, orchestrator)| orchestrator).collect()
    }
}

/// Snapshot for diagnostics
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManagerDebugInfo {
    pub calc_type: CalcType,
    pub active_count: usize,
    pub active_ids: Vec<CalcId>,
}

/// Idempotent entry point for one calculation family
pub struct CalcManager {
    strategy: Arc<dyn CalcStrategy>,
    cache: Arc<dyn StatusCache>,
    persister: Arc<ResultPersister>,
    settings: OrchestratorSettings,
    registry: Arc<OrchestratorRegistry>,
}

impl CalcManager {
    pub fn new(
        strategy: Arc<dyn CalcStrategy>,
        cache: Arc<dyn StatusCache>,
        store: Arc<dyn ReportStore>,
        settings: OrchestratorSettings,
    ) -> Self {
        let persister = Arc::new(ResultPersister::new(
            store,
            cache.clone(),
            settings.calc.persist_retry_delay,
        ));
        Self {
            strategy,
            cache,
            persister,
            settings,
            registry: Arc::new(OrchestratorRegistry::default()),
        }
    }

    /// Manager for economy-wide calculations
    pub fn economy(
        backend: Arc<dyn EconomyBackend>,
        cache: Arc<dyn StatusCache>,
        store: Arc<dyn ReportStore>,
        settings: OrchestratorSettings,
    ) -> Self {
        let strategy = Arc::new(EconomyStrategy::new(backend, settings.calc.clone()));
        Self::new(strategy, cache, store, settings)
    }

    /// Manager for household calculations
    pub fn household(
        backend: Arc<dyn HouseholdBackend>,
        cache: Arc<dyn StatusCache>,
        store: Arc<dyn ReportStore>,
        settings: OrchestratorSettings,
    ) -> Self {
        let strategy = Arc::new(HouseholdStrategy::new(backend, settings.calc.clone()));
        Self::new(strategy, cache, store, settings)
    }

    pub fn calc_type(&self) -> CalcType {
        self.strategy.calc_type()
    }

    /// Start a calculation unless one is already running for its calcId
    ///
    /// Returns `Ok(false)` for the no-op case. A start that fails removes
    /// its registry entry before the error is returned.
    pub async fn start_calculation(&self, config: CalcStartConfig) -> OrchestratorResult<bool> {
        let calc_id = config.calc_id.clone();
        let orchestrator = Arc::new(CalcOrchestrator::new(
            calc_id.clone(),
            self.strategy.clone(),
            self.cache.clone(),
            self.persister.clone(),
            Arc::downgrade(&self.registry),
            self.settings.clone(),
        ));

        if !self.registry.try_insert(&calc_id, orchestrator.clone()) {
            calc_debug!(calc_id, "Already running, start is a no-op");
            return Ok(false);
        }

        if let Err(e) = orchestrator.start(config).await {
            self.registry
                .remove_if(&calc_id, |entry| std::ptr::eq(entry, orchestrator.as_ref()));
            orchestrator.cleanup();
            return Err(e);
        }
        Ok(true)
    }

    pub fn is_running(&self, calc_id: &CalcId) -> bool {
        self.registry.contains(calc_id)
    }

    /// Remove and stop one orchestrator; no-op when none is registered
    pub fn cleanup(&self, calc_id: &CalcId) {
        match self.registry.remove(calc_id) {
            Some(orchestrator) => {
                calc_info!(calc_id, "Cleaning up orchestrator");
                orchestrator.cleanup();
            }
            None => {
                calc_debug!(calc_id, "No orchestrator to clean up");
            }
        }
    }

    /// Stop everything, for process shutdown
    pub fn cleanup_all(&self) {
        for orchestrator in self.registry.drain() {
            orchestrator.cleanup();
        }
    }

    pub fn orchestrator(&self, calc_id: &CalcId) -> Option<Arc<CalcOrchestrator>> {
        self.registry.lock().get(calc_id).cloned()
    }

    /// Why the last finished run for `calc_id` could not persist its result
    ///
    /// Readable after the orchestrator has unregistered, including runs that
    /// settled before `start_calculation` returned.
    pub fn persistence_error(&self, calc_id: &CalcId) -> Option<String> {
        self.registry.persist_failure(calc_id)
    }

    pub fn debug_info(&self) -> ManagerDebugInfo {
        let active_ids = self.registry.ids();
        ManagerDebugInfo {
            calc_type: self.calc_type(),
            active_count: active_ids.len(),
            active_ids,
        }
    }
}

impl Drop for CalcManager {
    fn drop(&mut self) {
        self.cleanup_all();
    }
}
