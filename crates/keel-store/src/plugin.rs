//! Plugin contract.
//!
//! A plugin is a value with an `init` that receives the host capabilities
//! and returns what it wants wired in: an optional middleware contribution
//! and an optional teardown. Both are explicit return values rather than
//! side-effecting pushes onto shared store internals, so initialization
//! order stays visible at the construction site.

use std::sync::Arc;

use crate::host::StoreHost;
use crate::middleware::Middleware;

/// Cleanup hook run when the owning store is destroyed.
pub type Teardown = Box<dyn FnOnce() + Send>;

/// What a plugin contributes to its store, returned from [`Plugin::init`].
pub struct PluginSetup<S, P> {
    /// Appended to the store's middleware pipeline, after any middleware
    /// registered directly on the builder.
    pub middleware: Option<Box<dyn Middleware<S, P>>>,
    /// Run on `Store::destroy`. Must unregister everything the plugin
    /// subscribed, so a torn-down store does not keep plugin closures alive.
    pub teardown: Option<Teardown>,
}

impl<S, P> PluginSetup<S, P> {
    /// A plugin that wired everything through host subscriptions and has
    /// nothing else to contribute.
    pub fn empty() -> Self {
        Self {
            middleware: None,
            teardown: None,
        }
    }

    pub fn with_teardown(teardown: impl FnOnce() + Send + 'static) -> Self {
        Self {
            middleware: None,
            teardown: Some(Box::new(teardown)),
        }
    }

    pub fn with_middleware(middleware: Box<dyn Middleware<S, P>>) -> Self {
        Self {
            middleware: Some(middleware),
            teardown: None,
        }
    }
}

/// A store extension living entirely behind the [`StoreHost`] capability
/// surface.
pub trait Plugin<S, P>: Send {
    fn init(&mut self, host: Arc<dyn StoreHost<S>>) -> PluginSetup<S, P>;
}
