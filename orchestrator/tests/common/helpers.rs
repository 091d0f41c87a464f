//! Test helpers and builder patterns for orchestrator tests

use std::sync::Arc;
use std::time::Duration;

use calc_orchestrator::*;
use calc_shared::{CalcId, CalcSettings, CalcStatus, StatusKind};
use tokio::sync::mpsc::UnboundedReceiver;

/// Builder for a manager wired to an in-memory cache and a mocked store
pub struct ManagerBuilder {
    cache: Arc<InMemoryStatusCache>,
    store: MockReportStore,
    settings: OrchestratorSettings,
}

impl ManagerBuilder {
    /// Store accepts every write by default
    pub fn new() -> Self {
        let mut store = MockReportStore::new();
        store
            .expect_mark_report_complete()
            .returning(|_, _, _, _| Ok(()))
            .times(0..);
        store.expect_update_simulation().returning(|_, _, _| Ok(())).times(0..);
        store.expect_invalidate().return_const(()).times(0..);

        Self {
            cache: Arc::new(InMemoryStatusCache::new()),
            store,
            settings: OrchestratorSettings::default(),
        }
    }

    /// Replace the default store mock entirely
    pub fn with_store<F>(mut self, setup: F) -> Self
    where
        F: FnOnce(&mut MockReportStore),
    {
        let mut store = MockReportStore::new();
        setup(&mut store);
        self.store = store;
        self
    }

    pub fn with_settings<F>(mut self, setup: F) -> Self
    where
        F: FnOnce(&mut CalcSettings),
    {
        setup(&mut self.settings.calc);
        self
    }

    pub fn recording_failures(mut self) -> Self {
        self.settings.record_failures = true;
        self
    }

    pub fn with_cache(mut self, cache: Arc<InMemoryStatusCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn economy(self, backend: MockEconomyBackend) -> (CalcManager, Arc<InMemoryStatusCache>) {
        let manager = CalcManager::economy(Arc::new(backend), self.cache.clone(), Arc::new(self.store), self.settings);
        (manager, self.cache)
    }

    pub fn household(self, backend: MockHouseholdBackend) -> (CalcManager, Arc<InMemoryStatusCache>) {
        let manager =
            CalcManager::household(Arc::new(backend), self.cache.clone(), Arc::new(self.store), self.settings);
        (manager, self.cache)
    }
}

impl Default for ManagerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Helper functions for common test operations
pub struct TestHelpers;

impl TestHelpers {
    /// Wait (on the paused clock) until the manager no longer tracks `calc_id`
    pub async fn wait_until_settled(manager: &CalcManager, calc_id: &CalcId, limit: Duration) {
        let deadline = tokio::time::Instant::now() + limit;
        while manager.is_running(calc_id) {
            assert!(
                tokio::time::Instant::now() < deadline,
                "{calc_id} still running after {limit:?}"
            );
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    /// Every status delivered so far, without waiting
    pub fn drain(updates: &mut UnboundedReceiver<CalcStatus>) -> Vec<CalcStatus> {
        let mut seen = Vec::new();
        while let Ok(status) = updates.try_recv() {
            seen.push(status);
        }
        seen
    }

    pub fn kinds(statuses: &[CalcStatus]) -> Vec<StatusKind> {
        statuses.iter().map(CalcStatus::kind).collect()
    }

    /// Progress values must never decrease for one attempt
    pub fn assert_monotonic(statuses: &[CalcStatus]) {
        let progress: Vec<f64> = statuses.iter().filter_map(CalcStatus::progress).collect();
        for pair in progress.windows(2) {
            assert!(pair[1] >= pair[0], "progress went backwards: {progress:?}");
        }
    }
}
