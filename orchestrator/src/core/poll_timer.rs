//! Cancellable repeating timer driving the poll loop
//!
//! Each tick returns the delay before the next one (or `None` to stop).
//! Cancelling never interrupts a tick that is already running; the tick is
//! expected to check its `CancelToken` before publishing anything.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Read side of a timer's cancel flag
#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    /// True once cancelled or once the owning timer is gone
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow() || self.rx.has_changed().is_err()
    }

    /// Resolves when the token is cancelled
    pub async fn cancelled(&mut self) {
        while !*self.rx.borrow_and_update() {
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }
}

pub struct PollTimer {
    cancel: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl PollTimer {
    /// Spawn the loop; the first tick fires after `first_delay`
    pub fn start<F, Fut>(first_delay: Duration, mut tick: F) -> Self
    where
        F: FnMut(CancelToken) -> Fut + Send + 'static,
        Fut: Future<Output = Option<Duration>> + Send + 'static,
    {
        let (cancel, rx) = watch::channel(false);
        let token = CancelToken { rx };

        let task = tokio::spawn(async move {
            let mut waiter = token.clone();
            let mut delay = first_delay;
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = waiter.cancelled() => break,
                }
                if token.is_cancelled() {
                    break;
                }
                match tick(token.clone()).await {
                    Some(next) if !token.is_cancelled() => delay = next,
                    _ => break,
                }
            }
        });

        Self { cancel, task }
    }

    /// Stop scheduling further ticks; idempotent
    pub fn cancel(&self) {
        self.cancel.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    /// True once the loop has exited
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for PollTimer {
    fn drop(&mut self) {
        self.cancel.send_replace(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn counting_timer(count: Arc<AtomicU32>, interval: Duration) -> PollTimer {
        PollTimer::start(interval, move |_token| {
            let count = count.clone();
            async move {
                count.fetch_add(1, Ordering::SeqCst);
                Some(interval)
            }
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_follow_interval() {
        let count = Arc::new(AtomicU32::new(0));
        let timer = counting_timer(count.clone(), Duration::from_secs(1));

        tokio::time::sleep(Duration::from_millis(3_500)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);
        assert!(!timer.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_future_ticks() {
        let count = Arc::new(AtomicU32::new(0));
        let timer = counting_timer(count.clone(), Duration::from_secs(1));

        tokio::time::sleep(Duration::from_millis(2_500)).await;
        timer.cancel();
        timer.cancel();
        tokio::time::sleep(Duration::from_secs(10)).await;

        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert!(timer.is_cancelled());
        assert!(timer.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_none_from_tick_ends_loop() {
        let count = Arc::new(AtomicU32::new(0));
        let ticks = count.clone();
        let timer = PollTimer::start(Duration::from_millis(500), move |_token| {
            let ticks = ticks.clone();
            async move {
                let n = ticks.fetch_add(1, Ordering::SeqCst) + 1;
                (n < 2).then_some(Duration::from_millis(500))
            }
        });

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert!(timer.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_flight_tick_sees_cancellation() {
        let observed = Arc::new(AtomicU32::new(0));
        let seen = observed.clone();
        let timer = PollTimer::start(Duration::from_millis(100), move |token| {
            let seen = seen.clone();
            async move {
                tokio::time::sleep(Duration::from_secs(2)).await;
                if token.is_cancelled() {
                    seen.store(1, Ordering::SeqCst);
                }
                Some(Duration::from_millis(100))
            }
        });

        tokio::time::sleep(Duration::from_millis(500)).await;
        timer.cancel();
        tokio::time::sleep(Duration::from_secs(3)).await;

        assert_eq!(observed.load(Ordering::SeqCst), 1);
        assert!(timer.is_finished());
    }
}
