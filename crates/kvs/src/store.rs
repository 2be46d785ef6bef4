use crate::chain::VersionChain;
use dashmap::DashMap;
use ordo_core::{Error, KeyBound, KvStore, Result, Tid, Timestamp, TransactionObserver, ValueBound};
use parking_lot::RwLock;
use std::sync::Arc;

/// An in-memory, per-key-sharded multi-version store (spec §2 component 3).
///
/// Implements the low-level [`KvStore`] contract directly, and additionally
/// offers `get`/`put`/`delete` wrapper methods that invite a registered
/// [`TransactionObserver`] into the operation exactly as spec §4.1 describes:
/// `before_*` runs first and can veto the operation; `after_*`/`failed_*`
/// run once the outcome is known. Real hosts (e.g. an HBase coprocessor)
/// would implement [`KvStore`] directly against their own storage and do
/// this same wiring themselves; this adapter exists so the engine is
/// exercisable standalone.
pub struct InMemoryKvStore<K, V> {
    table: DashMap<K, VersionChain<V>>,
    observer: RwLock<Option<Arc<dyn TransactionObserver<K>>>>,
}

impl<K: KeyBound, V: ValueBound> Default for InMemoryKvStore<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: KeyBound, V: ValueBound> InMemoryKvStore<K, V> {
    /// An empty store with no observer wired in.
    pub fn new() -> Self {
        InMemoryKvStore {
            table: DashMap::new(),
            observer: RwLock::new(None),
        }
    }

    /// Wire in the Transaction Manager as this store's observer.
    ///
    /// Spec §9: "an interface the KV adapter invokes, wired at construction"
    /// — in practice this means "before the first operation", since the
    /// observer and the store are constructed independently and then linked.
    pub fn register_observer(&self, observer: Arc<dyn TransactionObserver<K>>) {
        *self.observer.write() = Some(observer);
    }

    fn observer(&self) -> Option<Arc<dyn TransactionObserver<K>>> {
        self.observer.read().clone()
    }

    /// Read `keys` as of `bound`, notifying the observer before and after.
    pub fn get(&self, tid: Tid, keys: &[K], bound: Timestamp) -> Result<Vec<(K, Option<(Timestamp, V)>)>> {
        let observer = self.observer();
        if let Some(obs) = &observer {
            obs.before_get(tid, keys)?;
        }

        let mut results = Vec::with_capacity(keys.len());
        for key in keys {
            match self.read(key, bound) {
                Ok(found) => results.push((key.clone(), found)),
                Err(err) => {
                    if let Some(obs) = &observer {
                        obs.failed_get(tid, keys, &err)?;
                    }
                    return Err(err);
                }
            }
        }

        if let Some(obs) = &observer {
            let chosen: Vec<(K, Timestamp)> = results
                .iter()
                .filter_map(|(k, v)| v.as_ref().map(|(ts, _)| (k.clone(), *ts)))
                .collect();
            obs.after_get(tid, &chosen)?;
        }
        Ok(results)
    }

    /// Write `entries` at `ts`, notifying the observer before and after.
    pub fn put(&self, tid: Tid, ts: Timestamp, entries: Vec<(K, V)>) -> Result<()> {
        let observer = self.observer();
        let keys: Vec<K> = entries.iter().map(|(k, _)| k.clone()).collect();
        if let Some(obs) = &observer {
            obs.before_put(tid, &keys)?;
        }

        for (key, value) in entries {
            if let Err(err) = self.write(&key, ts, value) {
                if let Some(obs) = &observer {
                    obs.failed_put(tid, &keys, &err)?;
                }
                return Err(err);
            }
        }

        if let Some(obs) = &observer {
            obs.after_put(tid, &keys)?;
        }
        Ok(())
    }

    /// Delete the version of `keys` at `ts`, notifying the observer before
    /// and after.
    pub fn delete(&self, tid: Tid, ts: Timestamp, keys: &[K]) -> Result<()> {
        let observer = self.observer();
        if let Some(obs) = &observer {
            obs.before_delete(tid, keys)?;
        }

        for key in keys {
            if let Err(err) = self.delete_version(key, ts) {
                if let Some(obs) = &observer {
                    obs.failed_delete(tid, keys, &err)?;
                }
                return Err(err);
            }
        }

        if let Some(obs) = &observer {
            obs.after_delete(tid, keys)?;
        }
        Ok(())
    }

    /// Number of distinct keys currently tracked (including keys whose only
    /// versions are scheduled for GC but not yet pruned).
    pub fn key_count(&self) -> usize {
        self.table.len()
    }
}

impl<K: KeyBound, V: ValueBound> KvStore<K, V> for InMemoryKvStore<K, V> {
    fn write(&self, key: &K, ts: Timestamp, value: V) -> Result<()> {
        self.table
            .entry(key.clone())
            .and_modify(|chain| chain.push(ts, value.clone()))
            .or_insert_with(|| VersionChain::new(ts, value));
        Ok(())
    }

    fn read(&self, key: &K, bound: Timestamp) -> Result<Option<(Timestamp, V)>> {
        Ok(self
            .table
            .get(key)
            .and_then(|chain| chain.get_at_or_below(bound).map(|(ts, v)| (ts, v.clone()))))
    }

    fn delete_version(&self, key: &K, ts: Timestamp) -> Result<()> {
        if let Some(mut chain) = self.table.get_mut(key) {
            chain.remove_exact(ts);
            let drop_entry = chain.is_empty();
            drop(chain);
            if drop_entry {
                self.table.remove(key);
            }
        }
        Ok(())
    }

    fn delete_versions(&self, key: &K, bound: Timestamp) -> Result<()> {
        if let Some(mut chain) = self.table.get_mut(key) {
            chain.prune_at_or_below(bound);
            let drop_entry = chain.is_empty();
            drop(chain);
            if drop_entry {
                self.table.remove(key);
            }
        }
        Ok(())
    }
}

// Held behind `Arc<dyn KvStore<K, V>>` and shared across the observer
// callbacks' calling threads, so it must stay thread-safe for any
// `KeyBound`/`ValueBound` instantiation.
#[cfg(test)]
static_assertions::assert_impl_all!(InMemoryKvStore<String, i64>: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn write_then_read_round_trips() {
        let store: InMemoryKvStore<String, u32> = InMemoryKvStore::new();
        store.write(&"k".to_string(), Timestamp::new(5), 42).unwrap();
        assert_eq!(
            store.read(&"k".to_string(), Timestamp::new(10)).unwrap(),
            Some((Timestamp::new(5), 42))
        );
        assert_eq!(store.read(&"k".to_string(), Timestamp::new(1)).unwrap(), None);
    }

    #[test]
    fn delete_version_is_idempotent() {
        let store: InMemoryKvStore<String, u32> = InMemoryKvStore::new();
        store.write(&"k".to_string(), Timestamp::new(1), 1).unwrap();
        store.delete_version(&"k".to_string(), Timestamp::new(1)).unwrap();
        store.delete_version(&"k".to_string(), Timestamp::new(1)).unwrap();
        assert_eq!(store.read(&"k".to_string(), Timestamp::new(10)).unwrap(), None);
    }

    struct CountingObserver {
        before_get: AtomicUsize,
        after_get: AtomicUsize,
    }

    impl TransactionObserver<String> for CountingObserver {
        fn before_get(&self, _tid: Tid, _keys: &[String]) -> Result<()> {
            self.before_get.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        fn after_get(&self, _tid: Tid, _results: &[(String, Timestamp)]) -> Result<()> {
            self.after_get.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        fn failed_get(&self, _tid: Tid, _keys: &[String], _err: &Error) -> Result<()> {
            Ok(())
        }
        fn before_put(&self, _tid: Tid, _keys: &[String]) -> Result<()> {
            Ok(())
        }
        fn after_put(&self, _tid: Tid, _keys: &[String]) -> Result<()> {
            Ok(())
        }
        fn failed_put(&self, _tid: Tid, _keys: &[String], _err: &Error) -> Result<()> {
            Ok(())
        }
        fn before_delete(&self, _tid: Tid, _keys: &[String]) -> Result<()> {
            Ok(())
        }
        fn after_delete(&self, _tid: Tid, _keys: &[String]) -> Result<()> {
            Ok(())
        }
        fn failed_delete(&self, _tid: Tid, _keys: &[String], _err: &Error) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn get_invokes_observer_before_and_after() {
        let store: InMemoryKvStore<String, u32> = InMemoryKvStore::new();
        store.write(&"k".to_string(), Timestamp::new(1), 9).unwrap();
        let observer = Arc::new(CountingObserver {
            before_get: AtomicUsize::new(0),
            after_get: AtomicUsize::new(0),
        });
        store.register_observer(observer.clone());

        let tid = Timestamp::new(5);
        let out = store.get(tid, &["k".to_string()], Timestamp::new(10)).unwrap();
        assert_eq!(out, vec![("k".to_string(), Some((Timestamp::new(1), 9)))]);
        assert_eq!(observer.before_get.load(Ordering::SeqCst), 1);
        assert_eq!(observer.after_get.load(Ordering::SeqCst), 1);
    }
}
