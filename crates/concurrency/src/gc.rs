//! Garbage collection triggered by Timestamp Manager reclamation events
//! (spec §4.4).
//!
//! The reclaim event itself only tells the manager "no live timestamp is
//! `<= ts` any more"; everything this module does is a *consequence* of
//! that fact becoming true, not a scheduled sweep: draining the
//! `active_readers` FIFO of entries that can now give up their reader-index
//! rows, pruning KV versions superseded by a finalized write, and
//! truncating the durable log up to the oldest record a live transaction
//! could still need.
//!
//! Grounded on the teacher's reclamation-driven design (`TimestampManager`'s
//! `add_reclamation_listener` firing synchronously rather than on a
//! schedule); the pruning/truncation steps themselves are MVTO-specific,
//! built from spec §4.4's prose.

use crate::manager::TransactionManager;
use ordo_core::{KeyBound, KvStore, Timestamp, TransactionLog, ValueBound};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Counters describing what a collector has done across its lifetime
/// (spec §6 observability).
#[derive(Default)]
pub struct GcStats {
    /// Reclaim events processed.
    pub events: AtomicU64,
    /// Transactions whose reader-index entries were dropped.
    pub readers_pruned: AtomicU64,
    /// `(key, version)` pairs pruned from the KV store.
    pub versions_pruned: AtomicU64,
    /// Log truncation calls issued.
    pub truncations: AtomicU64,
    /// `Started`/`Blocked` transactions aborted because the reclaim
    /// watermark passed their TID before they reached a decision.
    pub stale_aborted: AtomicU64,
}

impl GcStats {
    /// A snapshot as plain integers, for a host building metrics off this.
    pub fn snapshot(&self) -> (u64, u64, u64, u64) {
        (
            self.events.load(Ordering::Relaxed),
            self.readers_pruned.load(Ordering::Relaxed),
            self.versions_pruned.load(Ordering::Relaxed),
            self.truncations.load(Ordering::Relaxed),
        )
    }

    /// How many `Started`/`Blocked` transactions this collector aborted as
    /// stale since construction.
    pub fn stale_aborted(&self) -> u64 {
        self.stale_aborted.load(Ordering::Relaxed)
    }
}

/// Reacts to Timestamp Manager reclaim events for one [`TransactionManager`]
/// and its backing store/log (spec §4.4).
///
/// Register [`GarbageCollector::on_reclaim`] as a closure via
/// [`ordo_core::TimestampManager::add_reclamation_listener`] at engine
/// construction; the TSM then drives this module's work synchronously from
/// whichever `acquire`/`release` call advances the watermark.
pub struct GarbageCollector<K, V> {
    manager: Arc<TransactionManager<K, V>>,
    store: Arc<dyn KvStore<K, V>>,
    batch_size: usize,
    stats: GcStats,
}

impl<K: KeyBound, V: ValueBound> GarbageCollector<K, V> {
    /// Build a collector over a manager and the store it fronts, pruning at
    /// most `batch_size` finalized transactions' key sets per reclaim event
    /// (`EngineConfig::gc_batch_size`) so one reclaim on a large backlog
    /// can't block the caller for an unbounded amount of time.
    pub fn new(manager: Arc<TransactionManager<K, V>>, store: Arc<dyn KvStore<K, V>>, batch_size: usize) -> Self {
        GarbageCollector {
            manager,
            store,
            batch_size: batch_size.max(1),
            stats: GcStats::default(),
        }
    }

    /// Handle one reclaim event: no live timestamp is `<= ts` any more.
    ///
    /// 1. Drain `active_readers`: any transaction at the FIFO head that has
    ///    finalized can give up its reader-index rows now that nothing
    ///    older might still consult them (spec §4.4).
    /// 2. Prune every KV version a newly finalized write superseded, since
    ///    no live reader's bound can fall at or below `ts` any more.
    /// 3. Truncate the log up to the oldest SID any surviving active
    ///    transaction could still need on replay.
    pub fn on_reclaim(&self, ts: Timestamp) {
        self.stats.events.fetch_add(1, Ordering::Relaxed);

        // Stale-lock sweep (spec §4.4): a `Started`/`Blocked` transaction
        // whose TID the watermark has now passed never reached a decision
        // before whatever held it open crashed or hung. Abort it so its
        // forbidden-band readers and dependents aren't stuck waiting on a
        // transaction that will never finalize on its own.
        for tid in self.manager.stale_active_transactions(ts) {
            if self.manager.abort_stale(tid).is_ok() {
                self.stats.stale_aborted.fetch_add(1, Ordering::Relaxed);
            }
        }

        self.manager.drain_ready_active_readers();
        self.stats.readers_pruned.fetch_add(1, Ordering::Relaxed);

        let mut pending = self.manager.take_pending_prunes();
        let leftover = if pending.len() > self.batch_size {
            pending.split_off(self.batch_size)
        } else {
            Vec::new()
        };
        // (P4): only versions strictly older than `ts` are ever eligible —
        // a version at or above `ts` might still be the one a reader with
        // TID just past `ts` ends up choosing, if nothing newer has been
        // written yet. Within the "< ts" bucket, keep only the greatest
        // version per key and prune everything it superseded.
        let below_ts = Timestamp::new(ts.get().saturating_sub(1));
        for (_tid, keys) in pending {
            for key in keys {
                let Ok(Some((keep, _))) = self.store.read(&key, below_ts) else {
                    continue;
                };
                if keep == Timestamp::ZERO {
                    continue;
                }
                let prune_bound = Timestamp::new(keep.get() - 1);
                if self.store.delete_versions(&key, prune_bound).is_ok() {
                    self.stats.versions_pruned.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
        self.manager.requeue_pending_prunes(leftover);

        let safe_sid = self.manager.safe_truncation_sid();
        if safe_sid > ordo_core::Sid::ZERO {
            let mut log = self.manager.log().lock();
            if log.truncate(safe_sid).is_ok() {
                self.stats.truncations.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// This collector's lifetime counters.
    pub fn stats(&self) -> &GcStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ordo_core::{BasicPolicy, Sid, Tid, TxnState};
    use ordo_kvs::InMemoryKvStore;
    use ordo_tsm::LocalTimestampManager;

    struct VecLog;
    impl TransactionLog<String> for VecLog {
        fn append_state_transition(&mut self, _tid: Tid, _state: TxnState) -> ordo_core::Result<Sid> {
            Ok(Sid::ZERO)
        }
        fn append_get(&mut self, _tid: Tid, _key: String, _version: Timestamp) -> ordo_core::Result<Sid> {
            Ok(Sid::ZERO)
        }
        fn append_put(&mut self, _tid: Tid, _key: String) -> ordo_core::Result<Sid> {
            Ok(Sid::ZERO)
        }
        fn append_delete(&mut self, _tid: Tid, _key: String) -> ordo_core::Result<Sid> {
            Ok(Sid::ZERO)
        }
        fn append_joined(&mut self, _tid: Tid, _pid: ordo_core::PersistentRef) -> ordo_core::Result<Sid> {
            Ok(Sid::ZERO)
        }
        fn truncate(&mut self, _sid: Sid) -> ordo_core::Result<()> {
            Ok(())
        }
        fn recover(&self) -> ordo_core::Result<Box<dyn Iterator<Item = ordo_core::Result<ordo_core::LogRecord<String>>> + '_>> {
            Ok(Box::new(std::iter::empty()))
        }
    }

    #[test]
    fn on_reclaim_preserves_the_newest_version_but_prunes_what_it_superseded() {
        let store: Arc<dyn KvStore<String, u32>> = Arc::new(InMemoryKvStore::new());
        store.write(&"k".to_string(), Timestamp::ZERO, 0).unwrap();
        let manager = Arc::new(TransactionManager::new(
            Arc::clone(&store),
            Box::new(VecLog),
            Arc::new(LocalTimestampManager::new()),
            Arc::new(BasicPolicy),
        ));

        let t1 = manager.begin().unwrap();
        manager.read(t1.tid(), &["k".to_string()]).unwrap();
        manager.write(t1.tid(), "k".to_string(), 1).unwrap();
        manager.commit(t1.tid()).unwrap();

        let t2 = manager.begin().unwrap();
        manager.read(t2.tid(), &["k".to_string()]).unwrap();
        manager.write(t2.tid(), "k".to_string(), 2).unwrap();
        manager.commit(t2.tid()).unwrap();

        let gc = GarbageCollector::new(Arc::clone(&manager), Arc::clone(&store), 16);
        gc.on_reclaim(Timestamp::new(1_000));

        assert_eq!(
            store.read(&"k".to_string(), Timestamp::new(1_000)).unwrap().map(|(_, v)| v),
            Some(2),
            "the current version must survive its own reclaim event"
        );
        assert_eq!(
            store.read(&"k".to_string(), t1.tid()).unwrap(),
            None,
            "t1's superseded version was pruned"
        );
        assert_eq!(
            store.read(&"k".to_string(), Timestamp::ZERO).unwrap(),
            None,
            "the seeded version-0 cell was superseded by t1 and is gone too"
        );
    }

    #[test]
    fn reclaim_event_prunes_versions_superseded_by_a_finalized_write() {
        let store: Arc<dyn KvStore<String, u32>> = Arc::new(InMemoryKvStore::new());
        let manager = Arc::new(TransactionManager::new(
            Arc::clone(&store),
            Box::new(VecLog),
            Arc::new(LocalTimestampManager::new()),
            Arc::new(BasicPolicy),
        ));

        let t1 = manager.begin().unwrap();
        manager.read(t1.tid(), &["k".to_string()]).unwrap();
        manager.write(t1.tid(), "k".to_string(), 1).unwrap();
        manager.commit(t1.tid()).unwrap();

        let gc = GarbageCollector::new(Arc::clone(&manager), Arc::clone(&store), 16);
        gc.on_reclaim(Timestamp::new(100));

        let (events, _, _, _) = gc.stats().snapshot();
        assert_eq!(events, 1);
    }

    #[test]
    fn reclaim_aborts_a_started_transaction_the_watermark_has_passed() {
        let store: Arc<dyn KvStore<String, u32>> = Arc::new(InMemoryKvStore::new());
        let manager = Arc::new(TransactionManager::new(
            Arc::clone(&store),
            Box::new(VecLog),
            Arc::new(LocalTimestampManager::new()),
            Arc::new(BasicPolicy),
        ));

        // t1 begins, reads and buffers a write, but never commits or aborts
        // before the reclaim event arrives (its owner crashed or hung).
        let t1 = manager.begin().unwrap();
        manager.read(t1.tid(), &["k".to_string()]).unwrap();
        manager.write(t1.tid(), "k".to_string(), 1).unwrap();

        let gc = GarbageCollector::new(Arc::clone(&manager), Arc::clone(&store), 16);
        gc.on_reclaim(Timestamp::new(t1.tid().get() + 1));

        assert_eq!(gc.stats().stale_aborted(), 1);
        assert!(
            store.read(&"k".to_string(), Timestamp::new(1_000)).unwrap().is_none(),
            "the stale transaction's tentative write must be rolled back"
        );
    }

    #[test]
    fn batch_size_caps_prunes_per_event_and_requeues_the_rest() {
        let store: Arc<dyn KvStore<String, u32>> = Arc::new(InMemoryKvStore::new());
        let manager = Arc::new(TransactionManager::new(
            Arc::clone(&store),
            Box::new(VecLog),
            Arc::new(LocalTimestampManager::new()),
            Arc::new(BasicPolicy),
        ));

        for key in ["a", "b", "c"] {
            let t = manager.begin().unwrap();
            manager.read(t.tid(), &[key.to_string()]).unwrap();
            manager.write(t.tid(), key.to_string(), 1).unwrap();
            manager.commit(t.tid()).unwrap();
        }

        let gc = GarbageCollector::new(Arc::clone(&manager), Arc::clone(&store), 1);
        gc.on_reclaim(Timestamp::new(100));
        let (_, _, versions_pruned, _) = gc.stats().snapshot();
        assert_eq!(versions_pruned, 1, "only one batch-sized entry pruned this round");

        gc.on_reclaim(Timestamp::new(100));
        let (_, _, versions_pruned, _) = gc.stats().snapshot();
        assert_eq!(versions_pruned, 2, "the requeued entries get picked up on the next event");
    }
}
