//! Per-device command queue: one task at a time, in submission order.
//!
//! Tasks wait for their turn on a fair [`tokio::sync::Mutex`], which grants
//! the lock in request order. Once dispatched, a task is separated from the
//! previous dispatch by at least the configured interval and is cut off after
//! the configured timeout. A failed or timed-out task releases the queue for
//! the next one.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use serde::Deserialize;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Queue pacing configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Minimum time between two dispatches, in milliseconds.
    pub interval_ms: u64,
    /// Maximum time a dispatched task may run, in milliseconds.
    pub timeout_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            interval_ms: 250,
            timeout_ms: 10_000,
        }
    }
}

impl QueueConfig {
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Outcome of a task that did not succeed.
#[derive(Debug, thiserror::Error)]
pub enum QueueError<E> {
    /// The task ran longer than the configured timeout.
    #[error("queued task timed out after {0:?}")]
    Timeout(Duration),
    /// The task itself failed.
    #[error("queued task failed")]
    Task(#[source] E),
}

/// Serializing, rate-limited task queue.
#[derive(Debug)]
pub struct CommandQueue {
    config: QueueConfig,
    last_dispatch: Mutex<Option<Instant>>,
    pending: AtomicUsize,
}

impl CommandQueue {
    #[must_use]
    pub fn new(config: QueueConfig) -> Self {
        Self {
            config,
            last_dispatch: Mutex::new(None),
            pending: AtomicUsize::new(0),
        }
    }

    /// Whether no task is waiting or running.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.pending.load(Ordering::SeqCst) == 0
    }

    /// Run `task` once every previously submitted task has finished and the
    /// pacing interval has elapsed.
    ///
    /// # Errors
    ///
    /// [`QueueError::Timeout`] when the task exceeds the timeout,
    /// [`QueueError::Task`] when the task returns an error.
    pub async fn submit<F, T, E>(&self, task: F) -> Result<T, QueueError<E>>
    where
        F: Future<Output = Result<T, E>>,
    {
        let _pending = PendingGuard::enter(&self.pending);
        let mut last_dispatch = self.last_dispatch.lock().await;

        if let Some(previous) = *last_dispatch {
            tokio::time::sleep_until(previous + self.config.interval()).await;
        }
        *last_dispatch = Some(Instant::now());

        let timeout = self.config.timeout();
        match tokio::time::timeout(timeout, task).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => Err(QueueError::Task(err)),
            Err(_) => Err(QueueError::Timeout(timeout)),
        }
    }
}

struct PendingGuard<'a>(&'a AtomicUsize);

impl<'a> PendingGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn queue(interval_ms: u64, timeout_ms: u64) -> Arc<CommandQueue> {
        Arc::new(CommandQueue::new(QueueConfig {
            interval_ms,
            timeout_ms,
        }))
    }

    #[tokio::test(start_paused = true)]
    async fn should_run_tasks_in_submission_order() {
        let queue = queue(0, 1_000);
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for i in 0..5u8 {
            let queue = Arc::clone(&queue);
            let order = Arc::clone(&order);
            handles.push(tokio::spawn(async move {
                queue
                    .submit(async {
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        order.lock().unwrap().push(i);
                        Ok::<_, ()>(())
                    })
                    .await
            }));
            tokio::task::yield_now().await;
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test(start_paused = true)]
    async fn should_space_dispatches_by_interval() {
        let queue = queue(500, 1_000);
        let start = Instant::now();

        queue.submit(async { Ok::<_, ()>(()) }).await.unwrap();
        let second = queue.submit(async { Ok::<_, ()>(Instant::now()) }).await.unwrap();

        assert!(second - start >= Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn should_never_overlap_tasks() {
        let queue = queue(0, 1_000);
        let running = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let queue = Arc::clone(&queue);
            let running = Arc::clone(&running);
            let max_seen = Arc::clone(&max_seen);
            handles.push(tokio::spawn(async move {
                queue
                    .submit(async {
                        let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                        max_seen.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        running.fetch_sub(1, Ordering::SeqCst);
                        Ok::<_, ()>(())
                    })
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn should_time_out_slow_task_and_keep_serving() {
        let queue = queue(0, 100);

        let slow = queue
            .submit(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<_, ()>(())
            })
            .await;
        assert!(matches!(slow, Err(QueueError::Timeout(d)) if d == Duration::from_millis(100)));

        let next = queue.submit(async { Ok::<_, ()>(7) }).await;
        assert_eq!(next.unwrap(), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn should_not_cancel_siblings_when_a_task_fails() {
        let queue = queue(0, 1_000);

        let failed = queue.submit(async { Err::<(), _>("boom") }).await;
        assert!(matches!(failed, Err(QueueError::Task("boom"))));

        let ok = queue.submit(async { Ok::<_, &str>(1) }).await;
        assert_eq!(ok.unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn should_report_idle_only_when_nothing_is_pending() {
        let queue = queue(0, 1_000);
        assert!(queue.is_idle());

        let busy = Arc::clone(&queue);
        let handle = tokio::spawn(async move {
            busy.submit(async {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok::<_, ()>(())
            })
            .await
        });
        tokio::task::yield_now().await;
        assert!(!queue.is_idle());

        handle.await.unwrap().unwrap();
        assert!(queue.is_idle());
    }
}
