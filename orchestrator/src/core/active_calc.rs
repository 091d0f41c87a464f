//! Single-flight tracker for blocking household requests
//!
//! One entry per calcId moving `absent -> running -> settled`. A settled
//! entry stays readable for a grace window, then the owner removes it.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use calc_shared::CalcId;
use serde_json::Value;
use tokio::time::Instant;

/// Terminal outcome of a tracked request
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Complete(Value),
    Failed(String),
}

#[derive(Debug, Clone)]
enum EntryState {
    Running,
    Settled(Outcome),
}

#[derive(Debug, Clone)]
struct Entry {
    /// Start instant of the attempt that owns this entry
    attempt: Instant,
    estimate: Duration,
    state: EntryState,
}

/// What `lookup` saw for a calcId
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    Absent,
    Running { elapsed: Duration, estimate: Duration },
    Settled(Outcome),
}

#[derive(Debug, Default)]
pub struct ActiveCalcTracker {
    entries: Mutex<HashMap<CalcId, Entry>>,
}

impl ActiveCalcTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<CalcId, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current state for `attempt`
    ///
    /// A running entry is always reported, whichever attempt started it.
    /// A settled entry from an older attempt reads as absent.
    pub fn lookup(&self, calc_id: &CalcId, attempt: Instant) -> Lookup {
        match self.lock().get(calc_id) {
            None => Lookup::Absent,
            Some(entry) => match &entry.state {
                EntryState::Running => Lookup::Running {
                    elapsed: entry.attempt.elapsed(),
                    estimate: entry.estimate,
                },
                EntryState::Settled(_) if entry.attempt < attempt => Lookup::Absent,
                EntryState::Settled(outcome) => Lookup::Settled(outcome.clone()),
            },
        }
    }

    /// Claim the calcId for a new request
    ///
    /// Returns false when a request is already running for it.
    pub fn begin(&self, calc_id: &CalcId, attempt: Instant, estimate: Duration) -> bool {
        let mut entries = self.lock();
        if let Some(Entry {
            state: EntryState::Running,
            ..
        }) = entries.get(calc_id)
        {
            return false;
        }
        entries.insert(
            calc_id.clone(),
            Entry {
                attempt,
                estimate,
                state: EntryState::Running,
            },
        );
        true
    }

    /// Record the outcome of the running request started at `attempt`
    pub fn settle(&self, calc_id: &CalcId, attempt: Instant, outcome: Outcome) {
        if let Some(entry) = self.lock().get_mut(calc_id) {
            if entry.attempt == attempt {
                entry.state = EntryState::Settled(outcome);
            }
        }
    }

    /// Drop a settled entry once its grace window is over
    ///
    /// No-op if the entry was replaced by a newer attempt meanwhile.
    pub fn expire(&self, calc_id: &CalcId, attempt: Instant) -> bool {
        let mut entries = self.lock();
        let expired = matches!(
            entries.get(calc_id),
            Some(Entry { attempt: a, state: EntryState::Settled(_), .. }) if *a == attempt
        );
        if expired {
            entries.remove(calc_id);
        }
        expired
    }

    pub fn is_running(&self, calc_id: &CalcId) -> bool {
        matches!(
            self.lock().get(calc_id),
            Some(Entry {
                state: EntryState::Running,
                ..
            })
        )
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
