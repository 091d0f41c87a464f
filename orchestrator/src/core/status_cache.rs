//! In-memory status cache with synchronous subscriber fan-out

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use calc_shared::{CalcId, CalcStatus};
use tokio::sync::mpsc;

use crate::traits::{StatusCache, StatusCallback, SubscriptionId};

#[derive(Default)]
struct CacheInner {
    entries: HashMap<CalcId, CalcStatus>,
    subscribers: HashMap<CalcId, Vec<(SubscriptionId, StatusCallback)>>,
    next_subscription: u64,
}

/// Process-wide status cache, shared behind an `Arc`
#[derive(Default)]
pub struct InMemoryStatusCache {
    inner: Mutex<CacheInner>,
}

impl InMemoryStatusCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, CacheInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Receive every status written for one calcId on a channel
    ///
    /// The caller owns the subscription and should unsubscribe when done.
    pub fn watch_channel(&self, calc_id: &CalcId) -> (SubscriptionId, mpsc::UnboundedReceiver<CalcStatus>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.subscribe(
            calc_id,
            std::sync::Arc::new(move |status: &CalcStatus| {
                // Receiver gone, nothing left to deliver to
                let _ = tx.send(status.clone());
            }),
        );
        (id, rx)
    }

    pub fn subscriber_count(&self, calc_id: &CalcId) -> usize {
        self.lock().subscribers.get(calc_id).map_or(0, Vec::len)
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }
}

impl StatusCache for InMemoryStatusCache {
    fn get(&self, calc_id: &CalcId) -> Option<CalcStatus> {
        self.lock().entries.get(calc_id).cloned()
    }

    fn set(&self, calc_id: &CalcId, status: CalcStatus) {
        let callbacks: Vec<StatusCallback> = {
            let mut inner = self.lock();
            inner.entries.insert(calc_id.clone(), status.clone());
            inner
                .subscribers
                .get(calc_id)
                .map(|subs| subs.iter().map(|(_, cb)| cb.clone()).collect())
                .unwrap_or_default()
        };

        // Outside the lock so callbacks may read the cache or unsubscribe
        for callback in callbacks {
            callback(&status);
        }
    }

    fn subscribe(&self, calc_id: &CalcId, callback: StatusCallback) -> SubscriptionId {
        let mut inner = self.lock();
        inner.next_subscription += 1;
        let id = SubscriptionId(inner.next_subscription);
        inner
            .subscribers
            .entry(calc_id.clone())
            .or_default()
            .push((id, callback));
        id
    }

    fn unsubscribe(&self, subscription: SubscriptionId) -> bool {
        let mut inner = self.lock();
        let mut removed = false;
        inner.subscribers.retain(|_, subs| {
            let before = subs.len();
            subs.retain(|(id, _)| *id != subscription);
            removed |= subs.len() != before;
            !subs.is_empty()
        });
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use calc_shared::{CalcMetadata, CalcType, InFlight, TargetType};
    use std::sync::Arc;

    fn status(id: &str, progress: f64) -> CalcStatus {
        let metadata = CalcMetadata::new(CalcId::from(id), CalcType::Economy, TargetType::Report);
        CalcStatus::pending(metadata, InFlight::new(progress, "Waiting in queue..."))
    }

    fn recorder(log: &Arc<Mutex<Vec<String>>>, tag: &'static str) -> StatusCallback {
        let log = log.clone();
        Arc::new(move |status: &CalcStatus| {
            log.lock()
                .unwrap()
                .push(format!("{tag}:{}", status.progress().unwrap_or_default()));
        })
    }

    #[test]
    fn test_get_returns_latest_set() {
        let cache = InMemoryStatusCache::new();
        let id = CalcId::from("report-1");

        assert!(cache.get(&id).is_none());
        cache.set(&id, status("report-1", 10.0));
        cache.set(&id, status("report-1", 20.0));

        assert_eq!(cache.get(&id).and_then(|s| s.progress()), Some(20.0));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_subscribers_notified_in_registration_order() {
        let cache = InMemoryStatusCache::new();
        let id = CalcId::from("report-1");
        let log = Arc::new(Mutex::new(Vec::new()));

        cache.subscribe(&id, recorder(&log, "a"));
        cache.subscribe(&id, recorder(&log, "b"));
        cache.subscribe(&CalcId::from("other"), recorder(&log, "x"));

        cache.set(&id, status("report-1", 1.0));
        cache.set(&id, status("report-1", 2.0));

        assert_eq!(*log.lock().unwrap(), vec!["a:1", "b:1", "a:2", "b:2"]);
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let cache = InMemoryStatusCache::new();
        let id = CalcId::from("report-1");
        let log = Arc::new(Mutex::new(Vec::new()));

        let first = cache.subscribe(&id, recorder(&log, "a"));
        cache.subscribe(&id, recorder(&log, "b"));

        assert!(cache.unsubscribe(first));
        assert!(!cache.unsubscribe(first));
        cache.set(&id, status("report-1", 5.0));

        assert_eq!(*log.lock().unwrap(), vec!["b:5"]);
        assert_eq!(cache.subscriber_count(&id), 1);
    }

    #[test]
    fn test_callback_may_read_cache() {
        let cache = Arc::new(InMemoryStatusCache::new());
        let id = CalcId::from("report-1");
        let seen = Arc::new(Mutex::new(None));

        let reader = cache.clone();
        let seen_in_cb = seen.clone();
        let key = id.clone();
        cache.subscribe(
            &id,
            Arc::new(move |_: &CalcStatus| {
                *seen_in_cb.lock().unwrap() = reader.get(&key).and_then(|s| s.progress());
            }),
        );

        cache.set(&id, status("report-1", 33.0));
        assert_eq!(*seen.lock().unwrap(), Some(33.0));
    }

    #[tokio::test]
    async fn test_watch_channel_receives_updates() {
        let cache = InMemoryStatusCache::new();
        let id = CalcId::from("sim-4");
        let (subscription, mut rx) = cache.watch_channel(&id);

        cache.set(&id, status("sim-4", 12.0));
        let received = rx.recv().await.unwrap();
        assert_eq!(received.progress(), Some(12.0));

        assert!(cache.unsubscribe(subscription));
        assert_eq!(cache.subscriber_count(&id), 0);
    }
}
