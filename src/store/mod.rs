//! Keyed in-process state behind one explicit component.
//!
//! Every per-conversation/per-user counter map in the core (rate windows,
//! spam state, bot activity, recent history) goes through a `StateStore`
//! instead of an ambient global. Mutation happens under a single lock per
//! store, which serializes updates for the same key — the one hard
//! correctness requirement here. Capacity is LRU-bounded so a long-running
//! process does not grow without bound as conversations come and go.

use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;

pub struct StateStore<S> {
    inner: Mutex<LruCache<String, S>>,
}

impl<S: Default> StateStore<S> {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Run `f` against the state for `key`, creating it on first sight.
    /// The store lock is held for the duration of `f`, so check-then-act
    /// sequences inside the closure are atomic per key.
    pub fn mutate<R>(&self, key: &str, f: impl FnOnce(&mut S) -> R) -> R {
        let mut inner = self.inner.lock();
        let state = inner.get_or_insert_mut(key.to_string(), S::default);
        f(state)
    }

    /// Read-only peek that does not create missing state.
    pub fn get<R>(&self, key: &str, f: impl FnOnce(&S) -> R) -> Option<R> {
        let mut inner = self.inner.lock();
        inner.get(key).map(f)
    }

    /// Drop every entry `keep` rejects. Used by the periodic state sweep
    /// to evict idle windows and expired cooldowns ahead of LRU pressure.
    pub fn sweep(&self, keep: impl Fn(&S) -> bool) -> usize {
        let mut inner = self.inner.lock();
        let stale: Vec<String> = inner
            .iter()
            .filter(|(_, state)| !keep(state))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &stale {
            inner.pop(key);
        }
        stale.len()
    }

    /// Keys currently tracked, most recently used first.
    pub fn keys(&self) -> Vec<String> {
        self.inner.lock().iter().map(|(k, _)| k.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_state_lazily() {
        let store: StateStore<u32> = StateStore::new(8);
        assert!(store.is_empty());
        let value = store.mutate("a", |n| {
            *n += 1;
            *n
        });
        assert_eq!(value, 1);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn get_does_not_create() {
        let store: StateStore<u32> = StateStore::new(8);
        assert!(store.get("missing", |n| *n).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn capacity_evicts_least_recently_used() {
        let store: StateStore<u32> = StateStore::new(2);
        store.mutate("a", |n| *n = 1);
        store.mutate("b", |n| *n = 2);
        store.mutate("c", |n| *n = 3);
        assert_eq!(store.len(), 2);
        assert!(store.get("a", |n| *n).is_none());
        assert_eq!(store.get("c", |n| *n), Some(3));
    }

    #[test]
    fn sweep_drops_rejected_entries() {
        let store: StateStore<u32> = StateStore::new(8);
        for (key, value) in [("a", 1), ("b", 0), ("c", 5)] {
            store.mutate(key, |n| *n = value);
        }
        let dropped = store.sweep(|n| *n > 0);
        assert_eq!(dropped, 1);
        assert_eq!(store.len(), 2);
        assert!(store.get("b", |n| *n).is_none());
    }

    #[test]
    fn concurrent_mutation_serializes_per_key() {
        let store = std::sync::Arc::new(StateStore::<u64>::new(8));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = std::sync::Arc::clone(&store);
            handles.push(std::thread::spawn(move || {
                for _ in 0..100 {
                    store.mutate("shared", |n| *n += 1);
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(store.get("shared", |n| *n), Some(800));
    }
}
