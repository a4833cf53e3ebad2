//! The plugin host contract.
//!
//! Plugins never see a concrete store type. They are handed an
//! `Arc<dyn StoreHost<S>>` exposing exactly four capabilities: read state,
//! force-replace state, subscribe to committed transitions, and (optionally)
//! subscribe to action events. Anything store-like that implements this
//! trait can reuse the history and persistence plugins unchanged.

use std::sync::Arc;

/// A committed-transition listener. Receives the newly committed state.
pub type StateListener<S> = Arc<dyn Fn(&Arc<S>) + Send + Sync>;

/// An action-event listener. Fires before the reducer runs.
pub type ActionListener = Arc<dyn Fn(&ActionRecord) + Send + Sync>;

/// The host-facing view of a dispatched action.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionRecord {
    /// Namespaced action type (`"{store}/{key}"`).
    pub ty: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp_ms: i64,
}

/// Handle for undoing a registration.
///
/// Dropping the handle without calling [`cancel`](Self::cancel) leaves the
/// registration alive, matching the semantics of handing out an unsubscribe
/// closure that nobody calls.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Unregister the listener. Safe to call on a torn-down host.
    pub fn cancel(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

/// Minimal capability surface a plugin may assume about its host.
pub trait StoreHost<S>: Send + Sync {
    /// Current state snapshot.
    fn state(&self) -> Arc<S>;

    /// Force-replace state and notify subscribers, bypassing middleware and
    /// reducers. Used for hydration and time travel.
    fn replace_state(&self, next: Arc<S>);

    /// Listen for committed transitions.
    fn subscribe(&self, listener: StateListener<S>) -> Subscription;

    /// Listen for action events. Hosts without this capability return
    /// `None`; plugins must degrade gracefully rather than fail.
    fn subscribe_action(&self, listener: ActionListener) -> Option<Subscription> {
        let _ = listener;
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn test_cancel_runs_once() {
        let fired = Arc::new(AtomicBool::new(false));
        let flag = fired.clone();
        let sub = Subscription::new(move || flag.store(true, Ordering::SeqCst));
        sub.cancel();
        assert!(fired.load(Ordering::SeqCst));
    }

    #[test]
    fn test_drop_does_not_cancel() {
        let fired = Arc::new(AtomicBool::new(false));
        let flag = fired.clone();
        drop(Subscription::new(move || flag.store(true, Ordering::SeqCst)));
        assert!(!fired.load(Ordering::SeqCst));
    }
}
