//! Fire-and-forget state broadcast between store instances.
//!
//! Each plugin instance publishes its store's committed states onto a
//! [`SyncBus`] tagged with a random origin id, and applies incoming
//! messages through `replace_state`, unless the message carries its own
//! origin tag (self-echo guard) or arrives while it is already applying a
//! remote state. No ordering or delivery guarantees beyond arrival order;
//! last writer wins.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, Sender};
use std::sync::{Arc, Mutex};

use keel_store::{Plugin, PluginSetup, StoreHost};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One broadcast state snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncMessage {
    /// Origin tag of the publishing plugin instance.
    pub origin: String,
    /// Serialized state.
    pub state: Value,
}

/// Transport for [`SyncMessage`]s. Publishing must never block or fail
/// loudly; delivery is best-effort.
pub trait SyncBus: Send + Sync {
    fn publish(&self, msg: SyncMessage);
}

/// In-process bus fanning messages out to mpsc receivers, for tests and
/// same-process multi-store setups.
#[derive(Default)]
pub struct MemoryBus {
    outlets: Mutex<Vec<Sender<SyncMessage>>>,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// A receiver that sees every message published after this call.
    pub fn channel(&self) -> Receiver<SyncMessage> {
        let (tx, rx) = std::sync::mpsc::channel();
        self.outlets
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(tx);
        rx
    }
}

impl SyncBus for MemoryBus {
    fn publish(&self, msg: SyncMessage) {
        // Drop outlets whose receiver is gone.
        self.outlets
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|tx| tx.send(msg.clone()).is_ok());
    }
}

struct SyncShared<S> {
    origin: String,
    bus: Arc<dyn SyncBus>,
    applying: AtomicBool,
    host: Mutex<Option<Arc<dyn StoreHost<S>>>>,
}

/// Cross-instance sync plugin. Clone it before registering to keep a handle
/// for feeding received messages in via [`apply`](Self::apply).
pub struct SyncPlugin<S> {
    shared: Arc<SyncShared<S>>,
}

impl<S> Clone for SyncPlugin<S> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<S> SyncPlugin<S>
where
    S: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    pub fn new(bus: Arc<dyn SyncBus>) -> Self {
        Self {
            shared: Arc::new(SyncShared {
                origin: uuid::Uuid::new_v4().to_string(),
                bus,
                applying: AtomicBool::new(false),
                host: Mutex::new(None),
            }),
        }
    }

    /// This instance's origin tag, as carried on its published messages.
    pub fn origin(&self) -> &str {
        &self.shared.origin
    }

    /// Apply a message received from the bus. Returns `true` when the state
    /// was replaced; self-echoes and undecodable payloads are ignored.
    pub fn apply(&self, msg: &SyncMessage) -> bool {
        if msg.origin == self.shared.origin {
            return false;
        }
        let Ok(state) = serde_json::from_value::<S>(msg.state.clone()) else {
            log::debug!("sync: dropping undecodable message from {}", msg.origin);
            return false;
        };
        let host = self
            .shared
            .host
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        let Some(host) = host else {
            return false;
        };
        self.shared.applying.store(true, Ordering::SeqCst);
        host.replace_state(Arc::new(state));
        self.shared.applying.store(false, Ordering::SeqCst);
        true
    }

    fn publish(&self, state: &Arc<S>) {
        if self.shared.applying.load(Ordering::SeqCst) {
            return; // do not rebroadcast a state we just received
        }
        let Ok(state) = serde_json::to_value(&**state) else {
            return;
        };
        self.shared.bus.publish(SyncMessage {
            origin: self.shared.origin.clone(),
            state,
        });
    }
}

impl<S, P> Plugin<S, P> for SyncPlugin<S>
where
    S: Serialize + DeserializeOwned + Send + Sync + 'static,
    P: Send + 'static,
{
    fn init(&mut self, host: Arc<dyn StoreHost<S>>) -> PluginSetup<S, P> {
        *self
            .shared
            .host
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(host.clone());

        let publisher = self.clone();
        let sub = host.subscribe(Arc::new(move |state: &Arc<S>| publisher.publish(state)));

        let shared = self.shared.clone();
        PluginSetup::with_teardown(move || {
            *shared.host.lock().unwrap_or_else(|e| e.into_inner()) = None;
            sub.cancel();
        })
    }
}
