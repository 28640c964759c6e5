//! In-memory adaptive lighting flag.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};

use meross_bridge_domain::error::BridgeError;

use crate::ports::AdaptiveLighting;

/// Adaptive lighting controller state kept in process.
///
/// The curve itself is driven by the hub; this only tracks whether it is
/// engaged so that manual color input can switch it off.
#[derive(Debug, Default)]
pub struct AdaptiveLightingState {
    active: AtomicBool,
}

impl AdaptiveLightingState {
    #[must_use]
    pub fn new(active: bool) -> Self {
        Self {
            active: AtomicBool::new(active),
        }
    }

    /// Engage the curve again.
    pub fn enable(&self) {
        self.active.store(true, Ordering::SeqCst);
    }
}

impl AdaptiveLighting for AdaptiveLightingState {
    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    fn disable(&self) -> impl Future<Output = Result<(), BridgeError>> + Send {
        if self.active.swap(false, Ordering::SeqCst) {
            tracing::info!("adaptive lighting disabled");
        }
        async { Ok(()) }
    }
}
