//! Bound action handles.

use std::sync::Arc;

use crate::error::StoreError;
use crate::store::Store;

/// A named state transition bound to its store, obtained via
/// [`Store::action`]. Cheap to clone and hold; `execute` dispatches through
/// the full middleware pipeline.
pub struct Action<S, P, R = ()> {
    store: Store<S, P, R>,
    key: String,
    ty: String,
}

impl<S, P, R> std::fmt::Debug for Action<S, P, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Action")
            .field("key", &self.key)
            .field("ty", &self.ty)
            .finish_non_exhaustive()
    }
}

impl<S, P, R> Clone for Action<S, P, R> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            key: self.key.clone(),
            ty: self.ty.clone(),
        }
    }
}

impl<S, P, R> Action<S, P, R>
where
    S: Clone + Send + Sync + 'static,
    P: Send + 'static,
    R: Send + 'static,
{
    pub(crate) fn new(store: Store<S, P, R>, key: String, ty: String) -> Self {
        Self { store, key, ty }
    }

    /// Namespaced action type (`"{store}/{key}"`).
    pub fn ty(&self) -> &str {
        &self.ty
    }

    /// Dispatch this action with the given payload.
    ///
    /// Synchronous: the reducer, middleware fold, commit and subscriber
    /// fan-out all complete before this returns.
    pub fn execute(&self, payload: P) -> Result<Arc<S>, StoreError> {
        self.store.dispatch(&self.key, payload)
    }
}
