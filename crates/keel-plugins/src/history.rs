//! Undo/redo history on top of the [`StoreHost`] capability surface.
//!
//! The plugin records `{prev, next}` pairs for every committed transition it
//! is allowed to keep (filter/exclude lists, actual diff, not during
//! replay), onto a bounded `past` stack. Undo moves entries to `future` and
//! replays `prev` through `replace_state`; any fresh transition discards
//! `future` (standard linear-history branch semantics).
//!
//! With a debounce window, rapid-fire transitions coalesce into a single
//! pending pair spanning the first `prev` and the last `next`: one undo
//! step for a drag or a typing burst. The pending pair is flushed when the
//! window has elapsed (checked on the next notification), before any
//! undo/redo/entries call, by [`HistoryPlugin::flush`], and at teardown.
//!
//! Action labels come from the host's `subscribe_action` capability. Hosts
//! without it still get working undo/redo; entries are labeled
//! [`UNKNOWN_ACTION`]. Degraded, not an error.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use chrono::Utc;
use keel_store::{ActionRecord, Plugin, PluginSetup, StoreHost, Subscription};
use keel_storage::Storage;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Label used when the host cannot attribute transitions to actions.
pub const UNKNOWN_ACTION: &str = "(unknown)";

const PERSIST_VERSION: u32 = 1;
const PERSISTED_ENTRIES: usize = 10;

/// Tuning knobs for [`HistoryPlugin`].
pub struct HistoryOptions {
    /// Maximum depth of each stack; oldest entries are evicted first.
    pub limit: usize,
    /// Coalescing window for rapid successive transitions.
    pub debounce: Option<Duration>,
    /// When set, only transitions with these action labels are recorded.
    /// Labels are namespaced action types (`"{store}/{key}"`).
    pub filter_actions: Option<Vec<String>>,
    /// Transitions with these action labels are never recorded. Ignored for
    /// labels also present in `filter_actions`.
    pub exclude_actions: Vec<String>,
}

impl Default for HistoryOptions {
    fn default() -> Self {
        Self {
            limit: 50,
            debounce: None,
            filter_actions: None,
            exclude_actions: Vec::new(),
        }
    }
}

/// One recorded transition.
pub struct HistoryEntry<S> {
    pub id: u64,
    /// Namespaced action type, or [`UNKNOWN_ACTION`].
    pub action: String,
    pub timestamp_ms: i64,
    pub prev_state: Arc<S>,
    pub next_state: Arc<S>,
}

impl<S> Clone for HistoryEntry<S> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            action: self.action.clone(),
            timestamp_ms: self.timestamp_ms,
            prev_state: self.prev_state.clone(),
            next_state: self.next_state.clone(),
        }
    }
}

struct Pending<S> {
    prev: Arc<S>,
    next: Arc<S>,
    action: String,
    last_change: Instant,
}

struct HistorySnapshot<S> {
    past: Vec<HistoryEntry<S>>,
    present: Arc<S>,
}

type SaveFn<S> = Box<dyn Fn(&VecDeque<HistoryEntry<S>>, &Arc<S>) + Send>;
type LoadFn<S> = Box<dyn Fn() -> Option<HistorySnapshot<S>> + Send>;

#[derive(Serialize, Deserialize)]
struct PersistedHistory {
    version: u32,
    past: Vec<PersistedEntry>,
    present: serde_json::Value,
}

#[derive(Serialize, Deserialize)]
struct PersistedEntry {
    action: String,
    timestamp_ms: i64,
    prev_state: serde_json::Value,
    next_state: serde_json::Value,
}

struct HistoryInner<S> {
    opts: HistoryOptions,
    host: Option<Arc<dyn StoreHost<S>>>,
    past: VecDeque<HistoryEntry<S>>,
    future: VecDeque<HistoryEntry<S>>,
    present: Option<Arc<S>>,
    pending: Option<Pending<S>>,
    is_undoing: bool,
    is_redoing: bool,
    last_action: Option<String>,
    next_id: u64,
    save: Option<SaveFn<S>>,
    load: Option<LoadFn<S>>,
    subs: Vec<Subscription>,
}

impl<S> HistoryInner<S> {
    fn allows(&self, label: &str) -> bool {
        if let Some(filter) = &self.opts.filter_actions {
            return filter.iter().any(|f| f == label);
        }
        !self.opts.exclude_actions.iter().any(|e| e == label)
    }

    fn push_entry(&mut self, prev: Arc<S>, next: Arc<S>, action: String) {
        let entry = HistoryEntry {
            id: self.next_id,
            action,
            timestamp_ms: Utc::now().timestamp_millis(),
            prev_state: prev,
            next_state: next,
        };
        self.next_id += 1;
        self.past.push_back(entry);
        while self.past.len() > self.opts.limit {
            self.past.pop_front();
        }
    }

    /// Flush the pending pair unconditionally.
    fn flush_pending(&mut self) {
        if let Some(pending) = self.pending.take() {
            self.push_entry(pending.prev, pending.next, pending.action);
        }
    }

    /// Flush the pending pair only if its debounce window has elapsed.
    fn flush_if_elapsed(&mut self, now: Instant) {
        let Some(window) = self.opts.debounce else { return };
        let elapsed = self
            .pending
            .as_ref()
            .is_some_and(|p| now.duration_since(p.last_change) >= window);
        if elapsed {
            self.flush_pending();
        }
    }

    fn persist(&self) {
        if let (Some(save), Some(present)) = (&self.save, &self.present) {
            save(&self.past, present);
        }
    }
}

/// Undo/redo plugin. Cheap to clone; clones share one history. Register a
/// clone on the store builder and keep one for `undo()`/`redo()` calls.
pub struct HistoryPlugin<S> {
    inner: Arc<Mutex<HistoryInner<S>>>,
}

impl<S> Clone for HistoryPlugin<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<S: PartialEq + Send + Sync + 'static> HistoryPlugin<S> {
    pub fn new(opts: HistoryOptions) -> Self {
        Self {
            inner: Arc::new(Mutex::new(HistoryInner {
                opts,
                host: None,
                past: VecDeque::new(),
                future: VecDeque::new(),
                present: None,
                pending: None,
                is_undoing: false,
                is_redoing: false,
                last_action: None,
                next_id: 1,
                save: None,
                load: None,
                subs: Vec::new(),
            })),
        }
    }

    /// Persist the history under `key`: an envelope of the last ten entries
    /// plus the present state, written on every record/undo/redo and
    /// restored on init. Corrupt or missing stored data is silently
    /// ignored.
    pub fn with_persistence(self, key: impl Into<String>, storage: Arc<dyn Storage>) -> Self
    where
        S: Serialize + DeserializeOwned,
    {
        let key = key.into();
        {
            let mut guard = self.lock();
            let save_key = key.clone();
            let save_storage = storage.clone();
            guard.save = Some(Box::new(
                move |past: &VecDeque<HistoryEntry<S>>, present: &Arc<S>| {
                    let tail = past
                        .iter()
                        .skip(past.len().saturating_sub(PERSISTED_ENTRIES))
                        .filter_map(|e| {
                            Some(PersistedEntry {
                                action: e.action.clone(),
                                timestamp_ms: e.timestamp_ms,
                                prev_state: serde_json::to_value(&*e.prev_state).ok()?,
                                next_state: serde_json::to_value(&*e.next_state).ok()?,
                            })
                        })
                        .collect();
                    let Ok(present) = serde_json::to_value(&**present) else {
                        return;
                    };
                    let doc = PersistedHistory {
                        version: PERSIST_VERSION,
                        past: tail,
                        present,
                    };
                    let Ok(blob) = serde_json::to_string(&doc) else {
                        return;
                    };
                    if let Err(err) = save_storage.set(&save_key, &blob) {
                        log::warn!("history: persist to `{save_key}` failed: {err}");
                    }
                },
            ));
            guard.load = Some(Box::new(move || {
                let blob = storage.get(&key).ok()??;
                let doc: PersistedHistory = serde_json::from_str(&blob).ok()?;
                if doc.version != PERSIST_VERSION {
                    return None;
                }
                let mut past = Vec::new();
                for (idx, e) in doc.past.into_iter().enumerate() {
                    let prev: S = serde_json::from_value(e.prev_state).ok()?;
                    let next: S = serde_json::from_value(e.next_state).ok()?;
                    past.push(HistoryEntry {
                        id: idx as u64 + 1,
                        action: e.action,
                        timestamp_ms: e.timestamp_ms,
                        prev_state: Arc::new(prev),
                        next_state: Arc::new(next),
                    });
                }
                let present: S = serde_json::from_value(doc.present).ok()?;
                Some(HistorySnapshot {
                    past,
                    present: Arc::new(present),
                })
            }));
        }
        self
    }

    /// Restore the previous state. No-op (returns `false`) when there is
    /// nothing to undo or the plugin is detached.
    pub fn undo(&self) -> bool {
        let (host, target) = {
            let mut guard = self.lock();
            let Some(host) = guard.host.clone() else {
                return false; // detached
            };
            guard.flush_pending();
            let Some(entry) = guard.past.pop_back() else {
                return false;
            };
            let target = entry.prev_state.clone();
            guard.present = Some(target.clone());
            guard.future.push_front(entry);
            guard.is_undoing = true;
            (host, target)
        };
        host.replace_state(target);
        let mut guard = self.lock();
        guard.is_undoing = false;
        guard.persist();
        true
    }

    /// Re-apply the next undone state. No-op when the redo stack is empty.
    pub fn redo(&self) -> bool {
        let (host, target) = {
            let mut guard = self.lock();
            let Some(host) = guard.host.clone() else {
                return false; // detached
            };
            guard.flush_pending();
            let Some(entry) = guard.future.pop_front() else {
                return false;
            };
            let target = entry.next_state.clone();
            guard.present = Some(target.clone());
            guard.past.push_back(entry);
            while guard.past.len() > guard.opts.limit {
                guard.past.pop_front();
            }
            guard.is_redoing = true;
            (host, target)
        };
        host.replace_state(target);
        let mut guard = self.lock();
        guard.is_redoing = false;
        guard.persist();
        true
    }

    /// Drop both stacks and re-read the present state from the host.
    pub fn clear(&self) {
        let host = {
            let mut guard = self.lock();
            guard.past.clear();
            guard.future.clear();
            guard.pending = None;
            guard.host.clone()
        };
        let present = host.map(|h| h.state());
        let mut guard = self.lock();
        if let Some(present) = present {
            guard.present = Some(present);
        }
        guard.persist();
    }

    /// Force the pending debounced pair into a real entry.
    pub fn flush(&self) {
        let mut guard = self.lock();
        guard.flush_pending();
        guard.persist();
    }

    /// Recorded past entries, oldest first. Flushes the pending pair.
    pub fn entries(&self) -> Vec<HistoryEntry<S>> {
        let mut guard = self.lock();
        guard.flush_pending();
        guard.past.iter().cloned().collect()
    }

    pub fn undo_depth(&self) -> usize {
        let guard = self.lock();
        guard.past.len() + usize::from(guard.pending.is_some())
    }

    pub fn redo_depth(&self) -> usize {
        self.lock().future.len()
    }

    pub fn can_undo(&self) -> bool {
        self.undo_depth() > 0
    }

    pub fn can_redo(&self) -> bool {
        self.redo_depth() > 0
    }

    fn on_state(&self, next: &Arc<S>) {
        let mut guard = self.lock();
        if guard.host.is_none() {
            return; // torn down
        }
        if guard.is_undoing || guard.is_redoing {
            guard.present = Some(next.clone());
            return;
        }
        let Some(prev) = guard.present.clone() else {
            guard.present = Some(next.clone());
            return;
        };
        let label = guard
            .last_action
            .take()
            .unwrap_or_else(|| UNKNOWN_ACTION.to_string());
        if Arc::ptr_eq(&prev, next) {
            return; // same snapshot, nothing to record
        }
        if *prev == **next {
            // A fresh Arc with an equal value (a no-op reducer ran); an
            // undo step for it would restore an identical state.
            guard.present = Some(next.clone());
            return;
        }
        guard.present = Some(next.clone());
        if !guard.allows(&label) {
            return;
        }
        let now = Instant::now();
        guard.flush_if_elapsed(now);
        guard.future.clear(); // the new branch invalidates redo
        if guard.opts.debounce.is_some() {
            match &mut guard.pending {
                Some(pending) => {
                    pending.next = next.clone();
                    pending.last_change = now;
                }
                None => {
                    guard.pending = Some(Pending {
                        prev,
                        next: next.clone(),
                        action: label,
                        last_change: now,
                    });
                }
            }
        } else {
            guard.push_entry(prev, next.clone(), label);
        }
        guard.persist();
    }

    fn teardown(&self) {
        let subs = {
            let mut guard = self.lock();
            guard.flush_pending();
            guard.persist();
            guard.host = None;
            std::mem::take(&mut guard.subs)
        };
        for sub in subs {
            sub.cancel();
        }
    }

    fn lock(&self) -> MutexGuard<'_, HistoryInner<S>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl<S, P> Plugin<S, P> for HistoryPlugin<S>
where
    S: PartialEq + Send + Sync + 'static,
    P: Send + 'static,
{
    fn init(&mut self, host: Arc<dyn StoreHost<S>>) -> PluginSetup<S, P> {
        let restored = {
            let mut guard = self.lock();
            guard.host = Some(host.clone());
            let snapshot = guard.load.as_ref().and_then(|load| load());
            match snapshot {
                Some(snapshot) => {
                    guard.next_id = snapshot.past.len() as u64 + 1;
                    guard.past = snapshot.past.into();
                    guard.present = Some(snapshot.present.clone());
                    guard.is_undoing = true; // suppress recording the restore
                    Some(snapshot.present)
                }
                None => {
                    guard.present = Some(host.state());
                    None
                }
            }
        };
        if let Some(present) = restored {
            host.replace_state(present);
            self.lock().is_undoing = false;
        }

        let labels = self.inner.clone();
        let action_sub = host.subscribe_action(Arc::new(move |record: &ActionRecord| {
            let mut guard = labels.lock().unwrap_or_else(|e| e.into_inner());
            guard.last_action = Some(record.ty.clone());
        }));
        if action_sub.is_none() {
            log::debug!("history: host lacks subscribe_action; entries will be unlabeled");
        }

        let recorder = self.clone();
        let state_sub = host.subscribe(Arc::new(move |next: &Arc<S>| recorder.on_state(next)));

        {
            let mut guard = self.lock();
            guard.subs.push(state_sub);
            if let Some(sub) = action_sub {
                guard.subs.push(sub);
            }
        }

        let plugin = self.clone();
        PluginSetup::with_teardown(move || plugin.teardown())
    }
}
