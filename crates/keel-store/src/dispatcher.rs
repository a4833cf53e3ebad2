//! Dispatcher for queued action dispatch.
//!
//! Middleware hooks, subscribers and effect bodies run while a transition is
//! in flight, so they cannot re-enter the store directly without observing a
//! half-finished cycle. They queue `(key, payload)` pairs on the dispatcher
//! instead; the store drains the queue after the current commit completes, so
//! every queued action runs as a full, ordinary transition in queue order.

use std::sync::mpsc::{Receiver, Sender};

/// An action waiting in the dispatch queue.
#[derive(Debug)]
pub(crate) struct QueuedAction<P> {
    pub key: String,
    pub payload: P,
}

/// Handle for queueing actions into a store from anywhere.
///
/// Cheap to clone; clones all feed the same queue.
pub struct Dispatcher<P> {
    tx: Sender<QueuedAction<P>>,
}

impl<P> Clone for Dispatcher<P> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<P> Dispatcher<P> {
    pub(crate) fn new(tx: Sender<QueuedAction<P>>) -> Self {
        Self { tx }
    }

    /// Queue an action for dispatch after the current transition settles.
    ///
    /// Sending to a destroyed store is a no-op (logged, never an error).
    pub fn dispatch(&self, key: impl Into<String>, payload: P) {
        let queued = QueuedAction {
            key: key.into(),
            payload,
        };
        if self.tx.send(queued).is_err() {
            log::warn!("Dispatcher: store is gone, dropping queued action");
        }
    }
}

pub(crate) fn queue<P>() -> (Dispatcher<P>, Receiver<QueuedAction<P>>) {
    let (tx, rx) = std::sync::mpsc::channel();
    (Dispatcher::new(tx), rx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_preserves_order() {
        let (dispatcher, rx) = queue::<u32>();
        dispatcher.dispatch("first", 1);
        dispatcher.clone().dispatch("second", 2);

        let a = rx.try_recv().unwrap();
        let b = rx.try_recv().unwrap();
        assert_eq!((a.key.as_str(), a.payload), ("first", 1));
        assert_eq!((b.key.as_str(), b.payload), ("second", 2));
        assert!(rx.try_recv().is_err());
    }
}
