//! Calculation orchestration library
//!
//! Drives long-running policy calculations on a remote compute backend:
//! starts each calculation at most once, polls it to a terminal state,
//! keeps a shared status cache current with honest progress, and writes
//! completed results to the durable report store.

pub mod core;
pub mod error;
pub mod manager;
pub mod orchestrator;
pub mod persister;
pub mod services;
pub mod strategies;
pub mod traits;
pub mod types;

// Re-export commonly used types
pub use crate::core::{
    ActiveCalcTracker, AggregateState, AggregateWatcher, AggregatedStatus, InMemoryStatusCache, ProgressSynthesizer,
    StatusAggregator,
};
pub use error::{OrchestratorError, OrchestratorResult};
pub use manager::{CalcManager, ManagerDebugInfo};
pub use orchestrator::{CalcOrchestrator, OrchestratorSettings, Phase};
pub use persister::{PersistContext, ResultPersister};
pub use strategies::{EconomyStrategy, HouseholdStrategy};
pub use traits::{
    CalcStrategy, EconomyBackend, HouseholdBackend, RefetchConfig, ReportStore, StatusCache, StatusCallback,
    SubscriptionId,
};
pub use traits::{MockCalcStrategy, MockEconomyBackend, MockHouseholdBackend, MockReportStore};
pub use types::{AnalysisJob, JobState, ReportRecord};
