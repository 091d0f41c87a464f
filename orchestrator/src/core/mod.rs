//! Core building blocks
//!
//! Status cache, progress synthesis, single-flight tracking, aggregation
//! and the poll timer. None of these talk to the network.

pub mod active_calc;
pub mod aggregator;
pub mod poll_timer;
pub mod progress;
pub mod status_cache;

pub use active_calc::{ActiveCalcTracker, Lookup, Outcome};
pub use aggregator::{AggregateState, AggregateWatcher, AggregatedStatus, StatusAggregator};
pub use poll_timer::{CancelToken, PollTimer};
pub use progress::{phase_message, ProgressEstimate, ProgressSynthesizer, ServerHint};
pub use status_cache::InMemoryStatusCache;
