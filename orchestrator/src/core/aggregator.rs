//! Combined view over several calculations backing one report

use std::sync::{Arc, Weak};

use calc_shared::{CalcError, CalcId, CalcStatus, StatusKind};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::watch;

use super::progress::ProgressSynthesizer;
use crate::traits::{StatusCache, StatusCallback, SubscriptionId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateState {
    Idle,
    Computing,
    Complete,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregatedStatus {
    pub state: AggregateState,
    pub progress: Option<f64>,
    pub message: Option<String>,
    pub queue_position: Option<u32>,
    pub estimated_time_remaining_ms: Option<u64>,
    pub result: Option<Value>,
    pub error: Option<CalcError>,
    /// Some calculation has not left `initializing` yet
    pub is_initializing: bool,
}

impl AggregatedStatus {
    fn with_state(state: AggregateState, is_initializing: bool) -> Self {
        Self {
            state,
            progress: None,
            message: None,
            queue_position: None,
            estimated_time_remaining_ms: None,
            result: None,
            error: None,
            is_initializing,
        }
    }

    pub fn idle() -> Self {
        Self::with_state(AggregateState::Idle, false)
    }
}

#[derive(Debug, Clone, Default)]
pub struct StatusAggregator {
    synthesizer: ProgressSynthesizer,
}

impl StatusAggregator {
    pub fn new(synthesizer: ProgressSynthesizer) -> Self {
        Self { synthesizer }
    }

    /// Fold the statuses of independent calculations into one view
    ///
    /// `None` entries are calculations with nothing cached yet. `is_loading`
    /// is set by callers still waiting on their first read.
    pub fn aggregate(&self, statuses: &[Option<CalcStatus>], is_loading: bool) -> AggregatedStatus {
        let known: Vec<&CalcStatus> = statuses.iter().flatten().collect();
        let is_initializing = known.iter().any(|s| s.kind() == StatusKind::Initializing);

        if statuses.is_empty() && !is_loading {
            return AggregatedStatus::idle();
        }

        if let Some(error) = known.iter().find_map(|s| s.calc_error()) {
            let mut view = AggregatedStatus::with_state(AggregateState::Error, is_initializing);
            view.error = Some(error.clone());
            return view;
        }

        let computing: Vec<&CalcStatus> = known.iter().copied().filter(|s| s.is_in_flight()).collect();
        if !computing.is_empty() || is_loading {
            return self.computing_view(&computing, &known, is_initializing);
        }

        if !known.is_empty() && known.len() == statuses.len() && known.iter().all(|s| s.is_complete()) {
            let mut view = AggregatedStatus::with_state(AggregateState::Complete, is_initializing);
            view.result = known.first().and_then(|s| s.result()).cloned();
            return view;
        }

        AggregatedStatus::with_state(AggregateState::Idle, is_initializing)
    }

    fn computing_view(&self, computing: &[&CalcStatus], known: &[&CalcStatus], is_initializing: bool) -> AggregatedStatus {
        let mut view = AggregatedStatus::with_state(AggregateState::Computing, is_initializing);
        let first = match computing.first() {
            Some(first) => *first,
            None => {
                // Still loading: estimate from any calc that has started, else report zero
                let progress = known
                    .iter()
                    .find(|s| !s.is_terminal())
                    .map(|s| self.synthesizer.synthetic(s.metadata.elapsed(), s.metadata.calc_type))
                    .unwrap_or(0.0);
                view.progress = Some(self.synthesizer.clamp(progress));
                return view;
            }
        };

        let reported: Vec<f64> = computing.iter().filter_map(|s| s.progress()).collect();
        let progress = if reported.is_empty() {
            self.synthesizer
                .synthetic(first.metadata.elapsed(), first.metadata.calc_type)
        } else {
            reported.iter().sum::<f64>() / reported.len() as f64
        };
        view.progress = Some(self.synthesizer.clamp(progress));

        let messages: Vec<&str> = computing.iter().filter_map(|s| s.message()).collect();
        if !messages.is_empty() {
            view.message = Some(messages.join("; "));
        }

        if let Some(detail) = first.in_flight() {
            view.queue_position = detail.queue_position;
            view.estimated_time_remaining_ms = detail.estimated_time_remaining_ms;
        }
        view
    }
}

/// Live aggregate over a fixed set of calcIds
///
/// Recomputes on every cache write to any of the ids and publishes on a
/// watch channel. Dropping the watcher unsubscribes it.
pub struct AggregateWatcher {
    cache: Arc<dyn StatusCache>,
    subscriptions: Vec<SubscriptionId>,
    rx: watch::Receiver<AggregatedStatus>,
}

impl AggregateWatcher {
    pub fn new(cache: Arc<dyn StatusCache>, calc_ids: Vec<CalcId>, aggregator: StatusAggregator) -> Self {
        let initial = read_all(cache.as_ref(), &calc_ids, &aggregator);
        let (tx, rx) = watch::channel(initial);
        let tx = Arc::new(tx);
        let ids = Arc::new(calc_ids);
        let aggregator = Arc::new(aggregator);
        let weak_cache: Weak<dyn StatusCache> = Arc::downgrade(&cache);

        let subscriptions = ids
            .iter()
            .map(|calc_id| {
                let tx = tx.clone();
                let ids = ids.clone();
                let aggregator = aggregator.clone();
                let weak_cache = weak_cache.clone();
                let callback: StatusCallback = Arc::new(move |_: &CalcStatus| {
                    if let Some(cache) = weak_cache.upgrade() {
                        tx.send_replace(read_all(cache.as_ref(), &ids, &aggregator));
                    }
                });
                cache.subscribe(calc_id, callback)
            })
            .collect();

        Self {
            cache,
            subscriptions,
            rx,
        }
    }

    pub fn current(&self) -> AggregatedStatus {
        self.rx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<AggregatedStatus> {
        self.rx.clone()
    }
}

impl Drop for AggregateWatcher {
    fn drop(&mut self) {
        for subscription in self.subscriptions.drain(..) {
            self.cache.unsubscribe(subscription);
        }
    }
}

fn read_all(cache: &dyn StatusCache, ids: &[CalcId], aggregator: &StatusAggregator) -> AggregatedStatus {
    let statuses: Vec<Option<CalcStatus>> = ids.iter().map(|id| cache.get(id)).collect();
    aggregator.aggregate(&statuses, false)
}
