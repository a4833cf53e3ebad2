//! # keel-store
//!
//! A mutable-looking, immutably-updated store: named actions with reducer
//! semantics, memoized selectors, an ordered middleware pipeline, async
//! effects with observable status, and a framework-agnostic plugin host.
//!
//! ## Design principles
//!
//! - **One commit point.** Every state transition is computed, filtered
//!   through middleware, and committed in [`Store::dispatch`]; subscribers
//!   only ever observe fully committed states.
//! - **Ergonomics of mutation, semantics of immutability.** Reducers mutate
//!   a draft clone of the state; the previous `Arc<S>` snapshot is never
//!   touched, and `Arc`-wrapped subtrees a reducer leaves alone keep their
//!   references (structural sharing).
//! - **Capability seams.** Plugins see only [`StoreHost`]; inspector
//!   tooling sees only [`DevtoolsSink`]. Neither couples to the concrete
//!   store, so history/persistence plugins and devtools relays work against
//!   any host implementation.
//!
//! ## Usage
//!
//! ```rust
//! use keel_store::{Selector, Store};
//! use std::sync::Arc;
//!
//! #[derive(Clone)]
//! struct AppState {
//!     count: i64,
//! }
//!
//! let store: Store<AppState, i64> = Store::builder("app", AppState { count: 0 })
//!     .action("add", |state, amount: &i64| {
//!         state.count += *amount;
//!         Ok(())
//!     })
//!     .selector("count", Selector::new(|state: &AppState| state.count))
//!     .build();
//!
//! let sub = store.subscribe(|state: &Arc<AppState>| {
//!     println!("count is now {}", state.count);
//! });
//!
//! store.dispatch("add", 2)?;
//! let count = store.selector::<i64>("count")?;
//! assert_eq!(count.select(&store.state()), 2);
//! sub.cancel();
//! # Ok::<(), keel_store::StoreError>(())
//! ```

pub mod action;
pub mod devtools;
pub mod dispatcher;
pub mod effect;
pub mod error;
pub mod host;
pub mod middleware;
pub mod plugin;
pub mod selector;
pub mod store;

// Re-export commonly used types
pub use action::Action;
pub use devtools::{DevtoolsEvent, DevtoolsSink, NoopDevtools, RecordingSink};
pub use dispatcher::Dispatcher;
pub use effect::{BoxFuture, Effect, EffectContext, EffectRun, EffectStatus, EffectStatusHandle};
pub use error::{EffectError, StoreError};
pub use host::{ActionListener, ActionRecord, StateListener, StoreHost, Subscription};
pub use middleware::{LoggingMiddleware, Middleware};
pub use plugin::{Plugin, PluginSetup, Teardown};
pub use selector::Selector;
pub use store::{Store, StoreBuilder};
