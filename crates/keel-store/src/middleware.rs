//! Middleware: ordered interception of every state transition.
//!
//! Each middleware may implement either or both hooks:
//!
//! ```text
//! dispatch → on_action (observe) → reducer → process (transform/veto) → commit
//! ```
//!
//! `on_action` hooks run before the reducer, in registration order. They
//! observe; they cannot stop the reducer from running.
//!
//! `process` hooks fold left-to-right over the candidate state, in
//! registration order. Each hook sees the previous hook's output, not the
//! raw candidate. Returning a clone of `prev` vetoes the transition; later
//! hooks then operate on that veto, and the store commits whatever falls out
//! of the fold.

use std::marker::PhantomData;
use std::sync::Arc;

use crate::dispatcher::Dispatcher;

/// An interceptor pair wrapping every transition of a store.
///
/// Both hooks have pass-through defaults, so a middleware only implements
/// what it needs. Hooks run while the store's internal lock is held: they
/// must not call back into the store. To trigger follow-up actions, queue
/// them on the [`Dispatcher`]; the store drains the queue after the commit.
pub trait Middleware<S, P>: Send {
    /// Observe a dispatched action before the reducer runs.
    ///
    /// `ty` is the namespaced action type (`"{store}/{key}"`).
    fn on_action(&mut self, ty: &str, payload: &P, dispatcher: &Dispatcher<P>) {
        let _ = (ty, payload, dispatcher);
    }

    /// Transform or veto the post-reducer state before it is committed.
    ///
    /// Return `candidate` unchanged to approve, a modified state to
    /// transform, or `prev.clone()` to veto the transition.
    fn process(&mut self, prev: &Arc<S>, candidate: Arc<S>) -> Arc<S> {
        let _ = prev;
        candidate
    }
}

/// Logs every dispatched action at debug level.
pub struct LoggingMiddleware<S, P> {
    _marker: PhantomData<fn(S, P)>,
}

impl<S, P> LoggingMiddleware<S, P> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<S, P> Default for LoggingMiddleware<S, P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Send, P: std::fmt::Debug + Send> Middleware<S, P> for LoggingMiddleware<S, P> {
    fn on_action(&mut self, ty: &str, payload: &P, _dispatcher: &Dispatcher<P>) {
        log::debug!("Action: {} payload={:?}", ty, payload);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher;

    struct Passthrough;

    impl Middleware<u32, u32> for Passthrough {}

    #[test]
    fn test_default_hooks_pass_through() {
        let mut mw = Passthrough;
        let (dispatcher, _rx) = dispatcher::queue::<u32>();
        mw.on_action("s/a", &7, &dispatcher);

        let prev = Arc::new(1u32);
        let candidate = Arc::new(2u32);
        let out = mw.process(&prev, candidate.clone());
        assert!(Arc::ptr_eq(&out, &candidate));
    }
}
