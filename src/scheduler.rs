//! Owned Periodic Tasks
//!
//! Every recurring timer in the crate (carousel auto-advance, product image
//! cycling, disk cache maintenance) is a [`ScheduledTask`]. The task stops when
//! it is cancelled or when its owner drops it.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Shortest accepted period; shorter ones are raised to it
pub const MIN_PERIOD: Duration = Duration::from_millis(10);

/// Periodic background task, cancelled on drop
#[derive(Debug)]
pub struct ScheduledTask {
    name: &'static str,
    token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl ScheduledTask {
    /// Run `tick` every `period`, first after one full period.
    ///
    /// A tick that overruns delays the next one rather than bursting. Periods
    /// below [`MIN_PERIOD`] are raised to it.
    pub fn every<F, Fut>(name: &'static str, period: Duration, mut tick: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if period < MIN_PERIOD {
            warn!(task = name, ?period, min = ?MIN_PERIOD, "Period too short, clamped");
        }
        let period = period.max(MIN_PERIOD);
        let token = CancellationToken::new();
        let child = token.clone();

        let handle = tokio::spawn(async move {
            let mut timer = interval_at(Instant::now() + period, period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = child.cancelled() => {
                        debug!(task = name, "Scheduled task stopped");
                        break;
                    }
                    _ = timer.tick() => tick().await,
                }
            }
        });

        Self {
            name,
            token,
            handle: Some(handle),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Stop the task; an in-progress tick finishes first
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Cancel and wait for the loop to exit
    pub async fn shutdown(mut self) {
        self.token.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for ScheduledTask {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Cyclic index advanced on a timer, e.g. the visible carousel banner or the
/// image currently shown for a product.
#[derive(Debug)]
pub struct Rotator {
    len: usize,
    index: Arc<watch::Sender<usize>>,
    task: Option<ScheduledTask>,
}

impl Rotator {
    /// Rotator over `len` positions without a timer
    pub fn manual(len: usize) -> Self {
        let (tx, _rx) = watch::channel(0);
        Self {
            len,
            index: Arc::new(tx),
            task: None,
        }
    }

    /// Rotator advancing every `period`. Nothing is scheduled for fewer than
    /// two positions.
    pub fn spawn(name: &'static str, len: usize, period: Duration) -> Self {
        let mut rotator = Self::manual(len);
        if len > 1 {
            let index = Arc::clone(&rotator.index);
            rotator.task = Some(ScheduledTask::every(name, period, move || {
                index.send_modify(|i| *i = (*i + 1) % len);
                std::future::ready(())
            }));
        }
        rotator
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Current position
    pub fn current(&self) -> usize {
        *self.index.borrow()
    }

    /// Step forward, wrapping
    pub fn advance(&self) -> usize {
        if self.len > 0 {
            self.index.send_modify(|i| *i = (*i + 1) % self.len);
        }
        self.current()
    }

    /// Jump to a position; out-of-range positions are ignored
    pub fn select(&self, position: usize) -> bool {
        if position < self.len {
            self.index.send_replace(position);
            true
        } else {
            false
        }
    }

    /// Position change notifications
    pub fn subscribe(&self) -> watch::Receiver<usize> {
        self.index.subscribe()
    }

    /// Stop automatic advancing, keeping the current position
    pub fn stop(&mut self) {
        self.task = None;
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_cancelled())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_task_ticks_until_dropped() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let task = ScheduledTask::every("test", Duration::from_secs(1), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            std::future::ready(())
        });

        tokio::time::sleep(Duration::from_millis(3500)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);

        drop(task);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_waits_for_exit() {
        let task = ScheduledTask::every("test", Duration::from_secs(1), || async {});
        assert_eq!(task.name(), "test");
        task.cancel();
        assert!(task.is_cancelled());
        task.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_period_is_clamped() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let task = ScheduledTask::every("zero", Duration::ZERO, move || {
            counter.fetch_add(1, Ordering::SeqCst);
            std::future::ready(())
        });

        tokio::time::sleep(MIN_PERIOD * 3 + MIN_PERIOD / 2).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);
        drop(task);

        let rotator = Rotator::spawn("carousel", 2, Duration::ZERO);
        assert!(rotator.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rotator_wraps() {
        let rotator = Rotator::spawn("carousel", 3, Duration::from_secs(5));
        let mut changes = rotator.subscribe();
        assert_eq!(rotator.current(), 0);

        tokio::time::sleep(Duration::from_millis(15_500)).await;
        assert_eq!(rotator.current(), 0);
        assert!(changes.has_changed().unwrap());

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(rotator.current(), 1);
    }

    #[tokio::test]
    async fn test_rotator_single_item_does_not_schedule() {
        let rotator = Rotator::spawn("carousel", 1, Duration::from_secs(5));
        assert!(!rotator.is_running());
        assert_eq!(rotator.advance(), 0);
    }

    #[test]
    fn test_manual_rotator() {
        let rotator = Rotator::manual(4);
        assert_eq!(rotator.advance(), 1);
        assert!(rotator.select(3));
        assert!(!rotator.select(4));
        assert_eq!(rotator.advance(), 0);
        assert!(Rotator::manual(0).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stopped_rotator_holds_position() {
        let mut rotator = Rotator::spawn("images", 2, Duration::from_secs(1));
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(rotator.current(), 1);

        rotator.stop();
        assert!(!rotator.is_running());
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(rotator.current(), 1);
    }
}
