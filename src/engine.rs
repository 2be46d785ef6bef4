//! The engine facade: wires the six components together and owns the
//! process-wide lifecycle lock (spec §5).
//!
//! Grounded on spec §4.1's lifecycle channel
//! (`Starting/Started/Stopping/Stopped/Aborting`) promoted to the engine's
//! own public state machine, and on spec §5's "every entry point acquires
//! the run lock in read mode; `stop` acquires it in write mode" design —
//! the per-transaction blocking the manager itself does (on commit-wait,
//! on the forbidden band) is a different, narrower lock that lives inside
//! `ordo-concurrency`; this one only ever guards "is the engine currently
//! allowed to start new work".

use crate::config::EngineConfig;
use ordo_concurrency::gc::GarbageCollector;
use ordo_concurrency::recovery::RecoveryCoordinator;
use ordo_concurrency::{ManagerStats, Transaction, TransactionManager};
use ordo_core::{
    BasicPolicy, CommitPolicy, Error, KeyBound, KvStore, Result, Tid, TimestampManager, TransactionObserver,
    ValueBound,
};
use ordo_kvs::InMemoryKvStore;
use ordo_log::SegmentedLog;
use ordo_tsm::LocalTimestampManager;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;

/// The engine's own lifecycle, independent of any one transaction's state
/// (spec §4.1's lifecycle channel, promoted to the top level per
/// SPEC_FULL.md §4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Not yet started, or fully stopped. `start` is the only valid call.
    Stopped,
    /// Recovering the durable log and wiring collaborators together.
    Starting,
    /// Accepting transactions.
    Running,
    /// Draining in-flight work; no new transactions are accepted.
    Stopping,
}

/// An MVTO engine over one transaction group: the durable log, the
/// in-memory reference KV adapter, the Timestamp Manager and the
/// Transaction Manager, wired together and given a start/stop lifecycle.
///
/// `K`/`V` are the caller's key/value types; a single-group engine needs
/// no `GroupKey` of its own (spec §3's "implicit" single-group case).
pub struct Engine<K, V> {
    run: RwLock<()>,
    state: Mutex<EngineState>,
    store: Arc<InMemoryKvStore<K, V>>,
    manager: Arc<TransactionManager<K, V>>,
    gc: Arc<GarbageCollector<K, V>>,
    config: EngineConfig,
}

impl<K: KeyBound + serde::Serialize + serde::de::DeserializeOwned, V: ValueBound> Engine<K, V> {
    /// Build and start an engine with the plain MVTO policy (no XA): opens
    /// the durable log, replays it (spec §4.5), seeds a fresh Timestamp
    /// Manager past the highest recovered TID, and registers the garbage
    /// collector as the Timestamp Manager's reclamation listener (spec
    /// §4.4) before returning.
    pub fn start(config: EngineConfig) -> Result<Self> {
        Self::start_with_policy(config, Arc::new(BasicPolicy))
    }

    /// Like [`Engine::start`], but with a caller-supplied [`CommitPolicy`]
    /// — use [`ordo_xa::XaPolicy`] to build an engine whose transactions
    /// can `join`/`prepare` under a 2PC coordinator (spec §4.6).
    pub fn start_with_policy(config: EngineConfig, policy: Arc<dyn CommitPolicy>) -> Result<Self> {
        config.validate().map_err(|e| Error::IllegalState(e.to_string()))?;

        let log = SegmentedLog::<K>::open(config.wal_config().clone())?;
        let recovery_tsm = LocalTimestampManager::new();
        let recovered = RecoveryCoordinator::new(&log, &recovery_tsm).recover()?;
        tracing::info!(
            records = recovered.stats.records_replayed,
            committed = recovered.stats.committed,
            aborted = recovered.stats.aborted,
            stale_aborted = recovered.stats.stale_aborted,
            left_active = recovered.stats.left_active,
            "recovered durable log"
        );
        let max_tid = recovered.stats.max_tid;
        drop(log);

        let log = SegmentedLog::<K>::open(config.wal_config().clone())?;
        let tsm = Arc::new(LocalTimestampManager::resuming_from(max_tid));
        let store = Arc::new(InMemoryKvStore::new());
        let manager = Arc::new(TransactionManager::new(
            Arc::clone(&store) as Arc<dyn KvStore<K, V>>,
            Box::new(log),
            Arc::clone(&tsm) as Arc<dyn ordo_core::TimestampManager>,
            policy,
        ));
        // Reconcile the fresh manager with what recovery found (spec §4.5
        // step 5): transactions left active rejoin the directory, resolved
        // aborts get their tentative mutations rolled back one more time.
        manager.recover_transactions(recovered)?;
        store.register_observer(Arc::clone(&manager) as Arc<dyn TransactionObserver<K>>);

        let gc = Arc::new(GarbageCollector::new(
            Arc::clone(&manager),
            Arc::clone(&store) as Arc<dyn KvStore<K, V>>,
            config.gc_batch_size(),
        ));
        let gc_listener = Arc::clone(&gc);
        tsm.add_reclamation_listener(Box::new(move |ts| gc_listener.on_reclaim(ts)));

        Ok(Engine {
            run: RwLock::new(()),
            state: Mutex::new(EngineState::Running),
            store,
            manager,
            gc,
            config,
        })
    }

    /// The engine's current lifecycle state.
    pub fn state(&self) -> EngineState {
        *self.state.lock()
    }

    /// Begin a new transaction (spec §4.3 `begin`). Blocked entirely by
    /// `stop`: a `start`/`stop` race can never interleave with a live
    /// transaction beginning.
    pub fn begin(&self) -> Result<Arc<Transaction<K>>> {
        let _run = self.run.read();
        self.ensure_running()?;
        self.manager.begin()
    }

    /// Read `keys` as of `tid`'s snapshot (spec §4.3 `beforeGet`/`afterGet`).
    pub fn read(&self, tid: Tid, keys: &[K]) -> Result<Vec<(K, Option<V>)>> {
        let _run = self.run.read();
        self.ensure_running()?;
        self.manager.read(tid, keys)
    }

    /// Write `key = value` under `tid` (spec §4.3 `beforePut`/`afterPut`).
    pub fn write(&self, tid: Tid, key: K, value: V) -> Result<()> {
        let _run = self.run.read();
        self.ensure_running()?;
        self.manager.write(tid, key, value)
    }

    /// Delete `key` under `tid` (spec §4.3 `beforeDelete`/`afterDelete`).
    pub fn delete(&self, tid: Tid, key: K) -> Result<()> {
        let _run = self.run.read();
        self.ensure_running()?;
        self.manager.delete(tid, key)
    }

    /// Commit `tid` (spec §4.3 `commit`).
    pub fn commit(&self, tid: Tid) -> Result<()> {
        let _run = self.run.read();
        self.ensure_running()?;
        self.manager.commit(tid)
    }

    /// Abort `tid` (spec §4.3 `abort`). Always permitted, even mid-`stop`,
    /// since it can only shrink the set of live work.
    pub fn abort(&self, tid: Tid) -> Result<()> {
        let _run = self.run.read();
        self.manager.abort(tid)
    }

    /// The manager's lifetime counters (spec §6 observability).
    pub fn stats(&self) -> ManagerStats {
        self.manager.stats()
    }

    /// This engine's garbage collector, for hosts that want its counters.
    pub fn gc(&self) -> &Arc<GarbageCollector<K, V>> {
        &self.gc
    }

    /// The underlying transaction manager, for a 2PC participant
    /// ([`ordo_xa::XaTransactionManager`]) or other advanced caller that
    /// needs direct access rather than going through the facade.
    pub fn manager(&self) -> &Arc<TransactionManager<K, V>> {
        &self.manager
    }

    fn ensure_running(&self) -> Result<()> {
        if *self.state.lock() != EngineState::Running {
            return Err(Error::EngineStopped);
        }
        Ok(())
    }

    /// Stop the engine (spec §5): wake every blocked transaction so none
    /// can deadlock the stop sequence, wait for any operation already past
    /// the `run` read-lock gate to finish, then mark the engine stopped.
    /// Idempotent.
    pub fn stop(&self) {
        let mut state = self.state.lock();
        if *state == EngineState::Stopped {
            return;
        }
        *state = EngineState::Stopping;
        drop(state);

        self.manager.shutdown();
        let _run = self.run.write();

        *self.state.lock() = EngineState::Stopped;
    }
}
