//! Best-effort state persistence.
//!
//! On init the plugin tries to load a versioned envelope
//! `{_version, _timestamp, state}` from storage, runs the caller's
//! `migrate` hook on a version mismatch, merges the persisted top-level
//! keys over the store's code-defined initial state, and hydrates the
//! result through the host. After that it writes a filtered projection of
//! every committed state back under the same key.
//!
//! Everything here is best-effort: quota errors, corrupt JSON and missing
//! storage are logged at most and never propagate into the transition path.

use std::marker::PhantomData;
use std::sync::Arc;

use chrono::Utc;
use keel_store::{Plugin, PluginSetup, StoreHost};
use keel_storage::Storage;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Migration hook: `(stored_version, stored_state) -> migrated_state`.
/// Return `None` to discard the stored state.
pub type MigrateFn = Arc<dyn Fn(u64, Value) -> Option<Value> + Send + Sync>;

/// Tuning knobs for [`PersistPlugin`].
pub struct PersistOptions {
    /// Storage key for the envelope.
    pub key: String,
    /// Current envelope version; mismatches go through `migrate`.
    pub version: u64,
    /// Keep only these top-level state keys. Takes precedence over
    /// `blacklist` when both are set.
    pub whitelist: Option<Vec<String>>,
    /// Drop these top-level state keys.
    pub blacklist: Vec<String>,
}

impl PersistOptions {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            version: 1,
            whitelist: None,
            blacklist: Vec::new(),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct Envelope {
    #[serde(rename = "_version")]
    version: u64,
    #[serde(rename = "_timestamp")]
    timestamp_ms: i64,
    state: Value,
}

/// Hydrates state from storage at init and saves a filtered snapshot on
/// every commit.
pub struct PersistPlugin<S> {
    opts: PersistOptions,
    storage: Arc<dyn Storage>,
    migrate: Option<MigrateFn>,
    _state: PhantomData<fn(S)>,
}

impl<S> PersistPlugin<S>
where
    S: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    pub fn new(opts: PersistOptions, storage: Arc<dyn Storage>) -> Self {
        Self {
            opts,
            storage,
            migrate: None,
            _state: PhantomData,
        }
    }

    pub fn with_migrate(
        mut self,
        migrate: impl Fn(u64, Value) -> Option<Value> + Send + Sync + 'static,
    ) -> Self {
        self.migrate = Some(Arc::new(migrate));
        self
    }

    /// Filtered projection of a serialized state. Only object states are
    /// filtered; anything else passes through whole.
    fn apply_filter(opts: &PersistOptions, state: Value) -> Value {
        let Value::Object(mut map) = state else {
            return state;
        };
        if let Some(whitelist) = &opts.whitelist {
            map.retain(|k, _| whitelist.iter().any(|w| w == k));
        } else {
            map.retain(|k, _| !opts.blacklist.iter().any(|b| b == k));
        }
        Value::Object(map)
    }

    /// Stored state from the envelope, already migrated if needed.
    fn load(&self) -> Option<Value> {
        let blob = match self.storage.get(&self.opts.key) {
            Ok(blob) => blob?,
            Err(err) => {
                log::debug!("persist: load of `{}` failed: {err}", self.opts.key);
                return None;
            }
        };
        let envelope: Envelope = serde_json::from_str(&blob).ok()?;
        if envelope.version == self.opts.version {
            return Some(envelope.state);
        }
        let migrate = self.migrate.as_ref()?;
        migrate(envelope.version, envelope.state)
    }

    fn save(&self, state: &Arc<S>) {
        let Ok(serialized) = serde_json::to_value(&**state) else {
            return;
        };
        let envelope = Envelope {
            version: self.opts.version,
            timestamp_ms: Utc::now().timestamp_millis(),
            state: Self::apply_filter(&self.opts, serialized),
        };
        let Ok(blob) = serde_json::to_string(&envelope) else {
            return;
        };
        if let Err(err) = self.storage.set(&self.opts.key, &blob) {
            log::warn!("persist: save to `{}` failed: {err}", self.opts.key);
        }
    }

    /// Overlay persisted top-level keys onto the live state, so keys that
    /// were never persisted keep their code-defined values.
    fn merge_into_live(&self, live: &Arc<S>, stored: Value) -> Option<S> {
        let stored = Self::apply_filter(&self.opts, stored);
        let mut base = serde_json::to_value(&**live).ok()?;
        match (&mut base, stored) {
            (Value::Object(base_map), Value::Object(stored_map)) => {
                for (k, v) in stored_map {
                    base_map.insert(k, v);
                }
            }
            (base_slot, stored_whole) => *base_slot = stored_whole,
        }
        serde_json::from_value(base).ok()
    }
}

impl<S, P> Plugin<S, P> for PersistPlugin<S>
where
    S: Serialize + DeserializeOwned + Send + Sync + 'static,
    P: Send + 'static,
{
    fn init(&mut self, host: Arc<dyn StoreHost<S>>) -> PluginSetup<S, P> {
        if let Some(stored) = self.load() {
            if let Some(merged) = self.merge_into_live(&host.state(), stored) {
                host.replace_state(Arc::new(merged));
            }
        }

        let plugin = PersistPlugin {
            opts: PersistOptions {
                key: self.opts.key.clone(),
                version: self.opts.version,
                whitelist: self.opts.whitelist.clone(),
                blacklist: self.opts.blacklist.clone(),
            },
            storage: self.storage.clone(),
            migrate: self.migrate.clone(),
            _state: PhantomData::<fn(S)>,
        };
        let sub = host.subscribe(Arc::new(move |state: &Arc<S>| plugin.save(state)));

        PluginSetup::with_teardown(move || sub.cancel())
    }
}
