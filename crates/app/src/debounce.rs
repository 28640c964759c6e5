//! Debounce gate: latest write per key wins.
//!
//! Every call schedules a cancellable timer for its key and cancels the timer
//! of the call it replaces. Only a call whose timer runs out while it is still
//! the newest one for its key is allowed to proceed.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::oneshot;

use meross_bridge_domain::id::UpdateToken;

/// Window during which a newer write supersedes an older one.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);

/// Per-key cancel-and-replace timers.
#[derive(Debug)]
pub struct Debouncer<K> {
    pending: Mutex<HashMap<K, (UpdateToken, oneshot::Sender<()>)>>,
}

impl<K> Default for Debouncer<K> {
    fn default() -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
        }
    }
}

impl<K: Eq + Hash + Clone> Debouncer<K> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait `delay`, then report whether this call is still the newest for `key`.
    ///
    /// A superseded call returns `false` as soon as the newer call arrives;
    /// the caller must drop its update silently.
    pub async fn debounce(&self, key: K, delay: Duration) -> bool {
        let token = UpdateToken::new();
        let (cancel_tx, cancel_rx) = oneshot::channel();

        {
            let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some((_, previous)) = pending.insert(key.clone(), (token, cancel_tx)) {
                let _ = previous.send(());
            }
        }
        let slot = Slot {
            pending: &self.pending,
            key,
            token,
        };

        tokio::select! {
            () = tokio::time::sleep(delay) => {}
            _ = cancel_rx => return false,
        }
        slot.release()
    }

    /// Number of keys with a write waiting out its window.
    #[must_use]
    pub fn waiting(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// The entry a call owns in the pending map, released when the call ends
/// or is dropped.
struct Slot<'a, K: Eq + Hash> {
    pending: &'a Mutex<HashMap<K, (UpdateToken, oneshot::Sender<()>)>>,
    key: K,
    token: UpdateToken,
}

impl<K: Eq + Hash> Slot<'_, K> {
    /// Remove the entry if it is still ours. Returns whether it was.
    fn release(&self) -> bool {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        match pending.get(&self.key) {
            Some((current, _)) if *current == self.token => {
                pending.remove(&self.key);
                true
            }
            _ => false,
        }
    }
}

impl<K: Eq + Hash> Drop for Slot<'_, K> {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn should_proceed_when_alone() {
        let debouncer = Debouncer::new();
        assert!(debouncer.debounce("hue", DEFAULT_DEBOUNCE).await);
        assert_eq!(debouncer.waiting(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn should_let_only_the_last_of_a_burst_proceed() {
        let debouncer = Arc::new(Debouncer::new());

        let mut handles = Vec::new();
        for _ in 0..3 {
            let debouncer = Arc::clone(&debouncer);
            handles.push(tokio::spawn(async move {
                debouncer.debounce("brightness", DEFAULT_DEBOUNCE).await
            }));
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        let mut results = Vec::new();
        for handle in handles {
            results.push(handle.await.unwrap());
        }
        assert_eq!(results, vec![false, false, true]);
    }

    #[tokio::test(start_paused = true)]
    async fn should_not_cross_keys() {
        let debouncer = Arc::new(Debouncer::new());

        let first = {
            let debouncer = Arc::clone(&debouncer);
            tokio::spawn(async move { debouncer.debounce("hue", DEFAULT_DEBOUNCE).await })
        };
        tokio::task::yield_now().await;
        let second = debouncer.debounce("brightness", DEFAULT_DEBOUNCE).await;

        assert!(first.await.unwrap());
        assert!(second);
    }

    #[tokio::test(start_paused = true)]
    async fn should_proceed_again_after_window_elapsed() {
        let debouncer = Debouncer::new();
        assert!(debouncer.debounce("on", DEFAULT_DEBOUNCE).await);
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(debouncer.debounce("on", DEFAULT_DEBOUNCE).await);
    }

    #[tokio::test(start_paused = true)]
    async fn should_forget_a_cancelled_wait() {
        let debouncer = Debouncer::new();

        let waited = tokio::time::timeout(
            Duration::from_millis(100),
            debouncer.debounce("brightness", DEFAULT_DEBOUNCE),
        )
        .await;

        assert!(waited.is_err());
        assert_eq!(debouncer.waiting(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn should_keep_the_newer_wait_when_an_older_one_is_dropped() {
        let debouncer = Arc::new(Debouncer::new());

        let older = {
            let debouncer = Arc::clone(&debouncer);
            tokio::spawn(async move { debouncer.debounce("hue", DEFAULT_DEBOUNCE).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        let newer = {
            let debouncer = Arc::clone(&debouncer);
            tokio::spawn(async move { debouncer.debounce("hue", DEFAULT_DEBOUNCE).await })
        };
        assert!(!older.await.unwrap());
        assert_eq!(debouncer.waiting(), 1);

        assert!(newer.await.unwrap());
        assert_eq!(debouncer.waiting(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn should_return_early_when_superseded() {
        let debouncer = Arc::new(Debouncer::new());
        let start = tokio::time::Instant::now();

        let first = {
            let debouncer = Arc::clone(&debouncer);
            tokio::spawn(async move {
                let proceed = debouncer.debounce("hue", DEFAULT_DEBOUNCE).await;
                (proceed, tokio::time::Instant::now())
            })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        let _ = debouncer.debounce("hue", DEFAULT_DEBOUNCE).await;

        let (proceed, finished) = first.await.unwrap();
        assert!(!proceed);
        assert!(finished - start < DEFAULT_DEBOUNCE);
    }
}
