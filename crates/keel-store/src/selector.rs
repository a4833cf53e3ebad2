//! Memoized pure projections of state.
//!
//! Two cache strategies:
//!
//! - [`Selector::new`]: single-entry cache keyed on the identity of the last
//!   seen `Arc<S>`. Same reference twice means one invocation. Two distinct
//!   but deep-equal states recompute; that looseness is deliberate, because
//!   the store's commit path guarantees a fresh `Arc` on any real change, so
//!   identity is an exact staleness test without deep equality on the hot
//!   path.
//! - [`Selector::keyed`]: bounded LRU keyed on the `serde_json`
//!   serialization of the state, with optional custom key equality. Survives
//!   reference churn at the cost of serializing on every call.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;

type KeyEq = Arc<dyn Fn(&str, &str) -> bool + Send + Sync>;
type KeyFn<S> = Arc<dyn Fn(&S) -> Option<String> + Send + Sync>;

enum Cache<S, T> {
    /// Last-seen reference and its projection.
    Identity(Option<(Arc<S>, T)>),
    /// Serialized-state key → projection, most recent first.
    Keyed {
        entries: VecDeque<(String, T)>,
        capacity: usize,
        key_fn: KeyFn<S>,
        key_eq: Option<KeyEq>,
    },
}

struct CacheState<S, T> {
    cache: Cache<S, T>,
    recomputations: u64,
}

/// A memoized projection `S -> T`.
///
/// Cloning a selector shares its cache and recomputation counter, which is
/// what makes the store's registry handles behave like one selector.
pub struct Selector<S, T> {
    f: Arc<dyn Fn(&S) -> T + Send + Sync>,
    state: Arc<Mutex<CacheState<S, T>>>,
}

impl<S, T> std::fmt::Debug for Selector<S, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Selector").finish_non_exhaustive()
    }
}

impl<S, T> Clone for Selector<S, T> {
    fn clone(&self) -> Self {
        Self {
            f: self.f.clone(),
            state: self.state.clone(),
        }
    }
}

impl<S, T> Selector<S, T>
where
    S: Send + Sync + 'static,
    T: Clone + Send + 'static,
{
    /// Reference-identity memoized selector.
    pub fn new(f: impl Fn(&S) -> T + Send + Sync + 'static) -> Self {
        Self {
            f: Arc::new(f),
            state: Arc::new(Mutex::new(CacheState {
                cache: Cache::Identity(None),
                recomputations: 0,
            })),
        }
    }

    /// Bounded LRU selector keyed by the serialized state.
    ///
    /// `capacity` is clamped to at least one entry. States that fail to
    /// serialize are computed but not cached.
    pub fn keyed(f: impl Fn(&S) -> T + Send + Sync + 'static, capacity: usize) -> Self
    where
        S: Serialize,
    {
        Self {
            f: Arc::new(f),
            state: Arc::new(Mutex::new(CacheState {
                cache: Cache::Keyed {
                    entries: VecDeque::new(),
                    capacity: capacity.max(1),
                    key_fn: Arc::new(|s: &S| serde_json::to_string(s).ok()),
                    key_eq: None,
                },
                recomputations: 0,
            })),
        }
    }

    /// Replace key comparison on a keyed selector. No-op for identity
    /// selectors.
    pub fn with_key_eq(self, eq: impl Fn(&str, &str) -> bool + Send + Sync + 'static) -> Self {
        if let Cache::Keyed { key_eq, .. } = &mut self.lock().cache {
            *key_eq = Some(Arc::new(eq));
        }
        self
    }

    /// Project the given state, reusing the cached result when fresh.
    pub fn select(&self, state: &Arc<S>) -> T {
        let mut guard = self.lock();
        match &mut guard.cache {
            Cache::Identity(slot) => {
                if let Some((seen, value)) = slot {
                    if Arc::ptr_eq(seen, state) {
                        return value.clone();
                    }
                }
                let value = (self.f)(state);
                guard.recomputations += 1;
                guard.cache = Cache::Identity(Some((state.clone(), value.clone())));
                value
            }
            Cache::Keyed {
                entries,
                capacity,
                key_fn,
                key_eq,
            } => {
                let Some(key) = key_fn(state) else {
                    // Unserializable state: compute, skip the cache.
                    drop(guard);
                    let value = (self.f)(state);
                    self.lock().recomputations += 1;
                    return value;
                };
                let hit = entries.iter().position(|(k, _)| match key_eq {
                    Some(eq) => eq(k, &key),
                    None => k == &key,
                });
                if let Some(entry) = hit.and_then(|idx| entries.remove(idx)) {
                    let value = entry.1.clone();
                    entries.push_front(entry);
                    return value;
                }
                let capacity = *capacity;
                drop(guard);
                let value = (self.f)(state);
                let mut guard = self.lock();
                guard.recomputations += 1;
                if let Cache::Keyed { entries, .. } = &mut guard.cache {
                    entries.push_front((key, value.clone()));
                    entries.truncate(capacity);
                }
                value
            }
        }
    }

    /// How many times the underlying function has run since construction or
    /// the last [`reset`](Self::reset).
    pub fn recomputations(&self) -> u64 {
        self.lock().recomputations
    }

    /// Empty the cache and zero the recomputation counter.
    pub fn reset(&self) {
        let mut guard = self.lock();
        guard.recomputations = 0;
        match &mut guard.cache {
            Cache::Identity(slot) => *slot = None,
            Cache::Keyed { entries, .. } => entries.clear(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheState<S, T>> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Clone, Serialize)]
    struct Cart {
        items: Vec<u32>,
    }

    #[test]
    fn test_same_reference_computes_once() {
        let selector = Selector::new(|cart: &Cart| cart.items.iter().sum::<u32>());
        let state = Arc::new(Cart { items: vec![1, 2, 3] });

        assert_eq!(selector.select(&state), 6);
        assert_eq!(selector.select(&state), 6);
        assert_eq!(selector.recomputations(), 1);
    }

    #[test]
    fn test_new_reference_recomputes() {
        let selector = Selector::new(|cart: &Cart| cart.items.len());
        let a = Arc::new(Cart { items: vec![1] });
        let b = Arc::new(Cart { items: vec![1] });

        selector.select(&a);
        selector.select(&b);
        // Deep-equal but distinct references: identity caching recomputes.
        assert_eq!(selector.recomputations(), 2);
    }

    #[test]
    fn test_keyed_cache_hits_across_references() {
        let calls = Arc::new(AtomicU32::new(0));
        let counted = calls.clone();
        let selector = Selector::keyed(
            move |cart: &Cart| {
                counted.fetch_add(1, Ordering::SeqCst);
                cart.items.len()
            },
            4,
        );
        let a = Arc::new(Cart { items: vec![1, 2] });
        let b = Arc::new(Cart { items: vec![1, 2] });

        assert_eq!(selector.select(&a), 2);
        assert_eq!(selector.select(&b), 2);
        // Same serialized key: one computation despite two references.
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_keyed_cache_evicts_oldest() {
        let selector = Selector::keyed(|cart: &Cart| cart.items.len(), 2);
        let a = Arc::new(Cart { items: vec![1] });
        let b = Arc::new(Cart { items: vec![1, 2] });
        let c = Arc::new(Cart { items: vec![1, 2, 3] });

        selector.select(&a);
        selector.select(&b);
        selector.select(&c); // evicts `a`
        selector.select(&a); // recompute
        assert_eq!(selector.recomputations(), 4);
        selector.select(&c); // still cached
        assert_eq!(selector.recomputations(), 4);
    }

    #[derive(Clone, Serialize)]
    struct Session {
        user: String,
        last_seen_ms: i64,
    }

    #[test]
    fn test_custom_key_eq_widens_cache_hits() {
        // Key equality that ignores the timestamp field.
        let without_ts = |key: &str| {
            let mut value: serde_json::Value = serde_json::from_str(key).unwrap();
            value.as_object_mut().unwrap().remove("last_seen_ms");
            value
        };
        let selector = Selector::keyed(|s: &Session| s.user.to_uppercase(), 4)
            .with_key_eq(move |a, b| without_ts(a) == without_ts(b));

        let a = Arc::new(Session {
            user: "ada".to_string(),
            last_seen_ms: 1,
        });
        let b = Arc::new(Session {
            user: "ada".to_string(),
            last_seen_ms: 2,
        });
        let c = Arc::new(Session {
            user: "bob".to_string(),
            last_seen_ms: 2,
        });

        assert_eq!(selector.select(&a), "ADA");
        // Different serialized key, equal under the custom comparison.
        assert_eq!(selector.select(&b), "ADA");
        assert_eq!(selector.recomputations(), 1);
        assert_eq!(selector.select(&c), "BOB");
        assert_eq!(selector.recomputations(), 2);
    }

    #[test]
    fn test_reset_clears_cache_and_counter() {
        let selector = Selector::new(|cart: &Cart| cart.items.len());
        let state = Arc::new(Cart { items: vec![1] });

        selector.select(&state);
        selector.reset();
        assert_eq!(selector.recomputations(), 0);
        selector.select(&state);
        assert_eq!(selector.recomputations(), 1);
    }
}
