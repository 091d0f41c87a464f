//! Trait definitions with mockall annotations for testing
//!
//! These are the seams of the orchestration subsystem: the remote compute
//! backend, the durable report store, the status cache and the per-family
//! execution strategy. Everything is injected through constructors so tests
//! can swap in mocks or an in-memory cache.

use std::sync::Arc;
use std::time::Duration;

use calc_shared::{CalcId, CalcMetadata, CalcParams, CalcStatus, CalcType, TargetType};
use serde_json::Value;

use crate::error::OrchestratorResult;
use crate::types::{AnalysisJob, ReportRecord};

/// Callback invoked with every status written for a subscribed calcId
pub type StatusCallback = Arc<dyn Fn(&CalcStatus) + Send + Sync>;

/// Handle returned by `StatusCache::subscribe`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// Polling decision derived from the latest cached status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefetchConfig {
    /// Delay before the next poll; `None` stops polling
    pub interval: Option<Duration>,

    /// How long a cached status counts as fresh
    pub stale_time: Duration,
}

impl RefetchConfig {
    pub fn every(interval: Duration) -> Self {
        Self {
            interval: Some(interval),
            stale_time: Duration::ZERO,
        }
    }

    pub fn stop() -> Self {
        Self {
            interval: None,
            stale_time: Duration::MAX,
        }
    }
}

/// Job-based economy-wide analysis API
#[mockall::automock]
#[async_trait::async_trait]
pub trait EconomyBackend: Send + Sync {
    /// Create a remote analysis job
    ///
    /// # Parameters
    /// - `params`: country, region and policies of the calculation
    ///
    /// # Returns
    /// The created job, whose id is used for every later poll
    async fn create_job(&self, params: &CalcParams) -> OrchestratorResult<AnalysisJob>;

    /// Fetch the current state of a job created earlier
    async fn get_job(&self, job_id: &str) -> OrchestratorResult<AnalysisJob>;
}

/// Blocking household calculation API
#[mockall::automock]
#[async_trait::async_trait]
pub trait HouseholdBackend: Send + Sync {
    /// Run one household calculation to completion
    ///
    /// The request itself stays open for the whole computation, there is
    /// no job id to poll.
    async fn calculate(&self, params: &CalcParams) -> OrchestratorResult<Value>;
}

/// Durable store of reports and simulations
#[mockall::automock]
#[async_trait::async_trait]
pub trait ReportStore: Send + Sync {
    /// Mark a report complete with its output
    async fn mark_report_complete(
        &self,
        country_id: &str,
        report_id: &str,
        year: Option<String>,
        output: &Value,
    ) -> OrchestratorResult<()>;

    /// Mark a report as failed
    async fn mark_report_error(&self, country_id: &str, report_id: &str) -> OrchestratorResult<()>;

    /// Store the output of one simulation
    async fn update_simulation(
        &self,
        country_id: &str,
        simulation_id: &str,
        output: &Value,
    ) -> OrchestratorResult<()>;

    /// Mark a simulation as failed
    async fn mark_simulation_error(&self, country_id: &str, simulation_id: &str) -> OrchestratorResult<()>;

    /// Look up a report record (may be served from a local record cache)
    async fn get_report(&self, country_id: &str, report_id: &str) -> OrchestratorResult<ReportRecord>;

    /// Drop any locally cached copy of a record so the next read refetches it
    fn invalidate(&self, target: TargetType, id: &str);
}

/// Key-addressable latest-status store with fan-out to subscribers
///
/// `set` notifies every subscriber of that calcId synchronously, in
/// registration order, before it returns.
pub trait StatusCache: Send + Sync {
    fn get(&self, calc_id: &CalcId) -> Option<CalcStatus>;

    fn set(&self, calc_id: &CalcId, status: CalcStatus);

    fn subscribe(&self, calc_id: &CalcId, callback: StatusCallback) -> SubscriptionId;

    /// Returns false when the subscription was already gone
    fn unsubscribe(&self, subscription: SubscriptionId) -> bool;
}

/// How one calculation family talks to the remote backend
#[mockall::automock]
#[async_trait::async_trait]
pub trait CalcStrategy: Send + Sync {
    /// Family this strategy runs
    fn calc_type(&self) -> CalcType;

    /// One step: start the remote work or report on work already started
    ///
    /// Failures are reported as an `error` status, never as `Err`.
    async fn execute(&self, params: &CalcParams, metadata: &CalcMetadata) -> CalcStatus;

    /// Polling schedule given the latest status
    fn refetch_config(&self, current: &CalcStatus) -> RefetchConfig;

    /// Forget any per-calculation bookkeeping (called on cleanup)
    fn release(&self, calc_id: &CalcId);
}
