use crate::conflict::find_conflicting_reader;
use crate::transaction::Transaction;
use dashmap::DashMap;
use ordo_core::{
    CommitPolicy, Error, KeyBound, KvStore, Result, Tid, Timestamp, TransactionLog,
    TransactionObserver, TxnState, ValueBound,
};
use parking_lot::{Condvar, Mutex};
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// A point-in-time snapshot of manager-wide counters, for observability
/// (spec §6's "expose enough state for a host to build metrics off of").
///
/// Grounded on the teacher's `WalCounters`: one `AtomicU64` per metric,
/// loaded into a plain struct on demand rather than exposed live.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ManagerStats {
    /// Transactions currently `Started` or `Blocked`.
    pub active: u64,
    /// Transactions that have reached `Committed`/`Finalized`.
    pub committed: u64,
    /// Transactions that have reached `Aborted`/`Finalized`.
    pub aborted: u64,
    /// Transactions cascaded into `Aborted` because a `readFrom` dependency
    /// aborted first (spec §4.3 invariant I3).
    pub cascaded_aborts: u64,
    /// `beforePut`/`beforeDelete` calls rejected by the MVTO write-conflict
    /// scan (spec §4.3 rule 2a).
    pub write_conflicts: u64,
    /// Transactions whose read-set/directory entry has been reclaimed
    /// (spec §4.4).
    pub reclaimed: u64,
}

#[derive(Default)]
struct Counters {
    begun: AtomicU64,
    committed: AtomicU64,
    aborted: AtomicU64,
    cascaded_aborts: AtomicU64,
    write_conflicts: AtomicU64,
    reclaimed: AtomicU64,
}

/// Per-key bookkeeping the MVTO conflict rules need: every active reader's
/// `(tid, observed_version)` pair (spec §4.3).
type ReaderIndex<K> = DashMap<K, Vec<(Tid, Timestamp)>>;

/// The Transaction Manager (spec §2 component 5).
///
/// Owns the directory of live transactions, the per-key reader/writer
/// indices MVTO's conflict rules scan, and drives `begin`/`commit`/`abort`.
/// Implements [`TransactionObserver`] so a [`KvStore`] adapter can invite it
/// into every get/put/delete (spec §4.1, §9).
///
/// Grounded on the teacher's `TransactionManager` for its overall shape
/// (directory + per-resource bookkeeping + atomic commit orchestration); the
/// per-key `readers`/`active_writers` indices and the blocked/commit-
/// dependency wait loop in `commit` are MVTO-specific (see `DESIGN.md`).
pub struct TransactionManager<K, V> {
    store: Arc<dyn KvStore<K, V>>,
    log: Mutex<Box<dyn TransactionLog<K>>>,
    tsm: Arc<dyn ordo_core::TimestampManager>,
    policy: Arc<dyn CommitPolicy>,
    pub(crate) directory: DashMap<Tid, Arc<Transaction<K>>>,
    pub(crate) readers: ReaderIndex<K>,
    pub(crate) active_writers: DashMap<K, Vec<Tid>>,
    pub(crate) active_readers: Mutex<VecDeque<Tid>>,
    pub(crate) reclaimables: Mutex<HashSet<Tid>>,
    /// Lazily created per-key locks (spec §5: "a per-key lock, lazily
    /// created and cached in a concurrent map"). Every read/write of
    /// `readers[K]`/`active_writers[K]`, the version-selection step in
    /// `after_get`, and the conflict scan in `before_put`/`before_delete`
    /// hold the relevant key's lock; callers touching more than one key in
    /// a single call acquire them in sorted order (spec §5) to prevent
    /// deadlock. Grounded on the teacher's `commit_locks: DashMap<BranchId,
    /// Mutex<()>>`.
    key_locks: DashMap<K, Arc<Mutex<()>>>,
    started_sid: DashMap<Tid, ordo_core::Sid>,
    last_finalized_sid: Mutex<ordo_core::Sid>,
    pending_prunes: Mutex<Vec<(Tid, HashSet<K>)>>,
    decisions: Mutex<()>,
    decided: Condvar,
    running: AtomicBool,
    counters: Counters,
}

impl<K: KeyBound, V: ValueBound> TransactionManager<K, V> {
    /// Build a manager over the given collaborators (spec §6's wiring: the
    /// host constructs the store, log and TSM, then builds the manager and
    /// registers it back as the store's observer).
    pub fn new(
        store: Arc<dyn KvStore<K, V>>,
        log: Box<dyn TransactionLog<K>>,
        tsm: Arc<dyn ordo_core::TimestampManager>,
        policy: Arc<dyn CommitPolicy>,
    ) -> Self {
        TransactionManager {
            store,
            log: Mutex::new(log),
            tsm,
            policy,
            directory: DashMap::new(),
            readers: DashMap::new(),
            active_writers: DashMap::new(),
            active_readers: Mutex::new(VecDeque::new()),
            reclaimables: Mutex::new(HashSet::new()),
            key_locks: DashMap::new(),
            started_sid: DashMap::new(),
            last_finalized_sid: Mutex::new(ordo_core::Sid::ZERO),
            pending_prunes: Mutex::new(Vec::new()),
            decisions: Mutex::new(()),
            decided: Condvar::new(),
            running: AtomicBool::new(true),
            counters: Counters::default(),
        }
    }

    /// The underlying store, for callers that need to issue raw reads
    /// (e.g. recovery).
    pub fn store(&self) -> &Arc<dyn KvStore<K, V>> {
        &self.store
    }

    /// The timestamp manager this engine is wired to.
    pub fn tsm(&self) -> &Arc<dyn ordo_core::TimestampManager> {
        &self.tsm
    }

    /// The durable log this engine is wired to.
    pub fn log(&self) -> &Mutex<Box<dyn TransactionLog<K>>> {
        &self.log
    }

    /// Whether the engine is accepting new operations (spec §5's `running`
    /// flag guarded by the process-wide run lock; the lock itself lives in
    /// the facade's `Engine`, this is the flag every blocking wait checks).
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Enter shutdown: wake every blocked transaction so none can deadlock
    /// the stop sequence (spec §5, §9's "shutdown wake-up" design note).
    ///
    /// Idempotent. Blocked waiters observe `is_running() == false` on their
    /// next wake and fail with `EngineStopped`.
    pub fn shutdown(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.decided.notify_all();
    }

    /// Begin a new transaction and return a handle to it (spec §4.3:
    /// `begin` acquires a TID and logs the initial state transition).
    pub fn begin(&self) -> Result<Arc<Transaction<K>>> {
        let tid = self.tsm.acquire();
        self.begin_with_tid(tid)
    }

    /// Begin a transaction under a caller-supplied TID rather than one this
    /// manager's own TSM issued (spec §4.6 `join`: a participant's local
    /// transaction shares the coordinator's TID, not a freshly acquired
    /// one).
    pub fn begin_with_tid(&self, tid: Tid) -> Result<Arc<Transaction<K>>> {
        if !self.is_running() {
            return Err(Error::EngineStopped);
        }
        let sid = self.log.lock().append_state_transition(tid, TxnState::Started)?;
        self.started_sid.insert(tid, sid);
        let txn = Arc::new(Transaction::new(tid));
        self.directory.insert(tid, Arc::clone(&txn));
        self.active_readers.lock().push_back(tid);
        self.counters.begun.fetch_add(1, Ordering::Relaxed);
        Ok(txn)
    }

    /// Join a distributed transaction (spec §4.6 `join`): transitions
    /// `Started -> Joined` and appends the XA extension's `JOINED` log
    /// record carrying the persistent child reference. Only permitted when
    /// the manager's policy allows it (the plain [`ordo_core::BasicPolicy`]
    /// never does).
    pub fn join(&self, tid: Tid, pid: ordo_core::PersistentRef) -> Result<()> {
        if !self.policy.allows_join() {
            return Err(Error::IllegalState(format!(
                "policy does not permit join for transaction {tid}"
            )));
        }
        let txn = self.get(tid)?;
        if !txn.transition(TxnState::Joined) {
            return Err(Error::IllegalState(format!(
                "cannot join transaction {tid} from state {:?}",
                txn.state()
            )));
        }
        self.log.lock().append_joined(tid, pid)?;
        Ok(())
    }

    /// Vote to commit (spec §4.6 `prepare`): blocks until every `readFrom`
    /// dependency is decided — identical to `commit`'s wait, since "a
    /// participant that cannot guarantee no cascaded abort cannot vote
    /// commit" — then transitions `Joined -> Prepared`.
    ///
    /// Unlike `commit`'s wait, this does not transition through `Blocked`:
    /// the state table has no `Joined -> Blocked` edge, since a waiting
    /// participant must still honor a concurrent coordinator `abort` from
    /// `Joined` while it waits.
    pub fn prepare(&self, tid: Tid) -> Result<()> {
        if !self.policy.allows_prepare() {
            return Err(Error::IllegalState(format!(
                "policy does not permit prepare for transaction {tid}"
            )));
        }
        let txn = self.get(tid)?;
        loop {
            if !self.is_running() {
                self.abort_with_reason(tid, ordo_core::AbortReason::EngineStopped)?;
                return Err(Error::engine_stopped_abort(tid));
            }
            if txn.state() == TxnState::Aborted {
                return Err(Error::write_conflict(tid));
            }
            if self.cascade_abort_if_dependency_aborted(&txn)? {
                return Err(Error::TransactionAborted {
                    tid,
                    reason: ordo_core::AbortReason::CascadedAbort { cause: tid },
                });
            }
            if self.all_dependencies_decided(&txn) {
                break;
            }
            let mut guard = self.decisions.lock();
            self.decided.wait_for(&mut guard, Duration::from_millis(50));
        }
        self.log.lock().append_state_transition(tid, TxnState::Prepared)?;
        if !txn.transition(TxnState::Prepared) {
            return Err(Error::IllegalState(format!(
                "cannot prepare transaction {tid} from state {:?}",
                txn.state()
            )));
        }
        Ok(())
    }

    /// Look up a live transaction by TID.
    pub fn get(&self, tid: Tid) -> Result<Arc<Transaction<K>>> {
        self.directory
            .get(&tid)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(Error::NoSuchTransaction(tid))
    }

    /// Read `keys` as of `tid`'s own TID, recording each chosen version
    /// against the transaction and the reader index (spec §4.3 rule 1).
    pub fn read(&self, tid: Tid, keys: &[K]) -> Result<Vec<(K, Option<V>)>> {
        let txn = self.get(tid)?;
        self.before_get(tid, keys)?;

        let mut out = Vec::with_capacity(keys.len());
        let mut chosen = Vec::with_capacity(keys.len());
        for key in keys {
            match self.store.read(key, tid) {
                Ok(Some((version, value))) => {
                    chosen.push((key.clone(), version));
                    out.push((key.clone(), Some(value)));
                }
                Ok(None) => out.push((key.clone(), None)),
                Err(err) => {
                    self.failed_get(tid, keys, &err)?;
                    return Err(err);
                }
            }
        }
        let _ = &txn;
        self.after_get(tid, &chosen)?;
        Ok(out)
    }

    /// Buffer a write of `key = value` under `tid` (spec §4.3 rule 2a).
    pub fn write(&self, tid: Tid, key: K, value: V) -> Result<()> {
        self.before_put(tid, std::slice::from_ref(&key))?;
        if let Err(err) = self.store.write(&key, tid, value) {
            self.failed_put(tid, std::slice::from_ref(&key), &err)?;
            return Err(err);
        }
        self.after_put(tid, std::slice::from_ref(&key))
    }

    /// Buffer a delete of `key` under `tid` (spec §4.3 rule 2b).
    pub fn delete(&self, tid: Tid, key: K) -> Result<()> {
        self.before_delete(tid, std::slice::from_ref(&key))?;
        if let Err(err) = self.store.delete_version(&key, tid) {
            self.failed_delete(tid, std::slice::from_ref(&key), &err)?;
            return Err(err);
        }
        self.after_delete(tid, std::slice::from_ref(&key))
    }

    /// The lazily-created lock guarding `readers[key]`/`active_writers[key]`
    /// (spec §5).
    fn key_lock(&self, key: &K) -> Arc<Mutex<()>> {
        Arc::clone(&self.key_locks.entry(key.clone()).or_insert_with(|| Arc::new(Mutex::new(()))))
    }

    /// The distinct keys in `keys`, sorted by `K`'s natural order (spec §5:
    /// "lock acquisition order when multiple keys appear in one call:
    /// sorted by K's natural order, to prevent deadlock").
    fn sorted_distinct_keys(&self, keys: &[K]) -> Vec<K> {
        let mut sorted: Vec<K> = keys.to_vec();
        sorted.sort();
        sorted.dedup();
        sorted
    }

    /// The owned locks for every distinct key in `keys`, sorted (spec §5).
    /// Callers keep this `Vec` alive alongside the `MutexGuard`s they lock
    /// out of it (see `after_get`/`before_put`/`before_delete`) for exactly
    /// as long as the critical section spans — the `Arc`s, not just the
    /// guards, are what keep each `Mutex<()>` allocation alive.
    fn key_locks_for(&self, keys: &[K]) -> Vec<Arc<Mutex<()>>> {
        self.sorted_distinct_keys(keys).iter().map(|k| self.key_lock(k)).collect()
    }

    /// Scan `active_writers[key]` for writers whose TID falls strictly
    /// inside `(observed, reader_tid)` (spec §4.3 `afterGet` rule 2).
    fn forbidden_band_writers(&self, key: &K, observed: Timestamp, reader_tid: Tid) -> Vec<Tid> {
        self.active_writers
            .get(key)
            .map(|writers| {
                writers
                    .iter()
                    .copied()
                    .filter(|&w| observed < w && w < reader_tid)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Block `reader_tid` until every writer in the forbidden band for
    /// `key` has finalized; abort the reader if any of them committed
    /// (spec §4.3 `afterGet` rule 2: "the reader BLOCKS until W finalizes;
    /// if W commits with a version in the forbidden band the reader
    /// ABORTS, else the reader resumes").
    fn wait_for_forbidden_band(&self, reader_tid: Tid, key: &K, observed: Timestamp) -> Result<()> {
        for writer_tid in self.forbidden_band_writers(key, observed, reader_tid) {
            loop {
                if !self.is_running() {
                    self.abort_with_reason(reader_tid, ordo_core::AbortReason::EngineStopped)?;
                    return Err(Error::engine_stopped_abort(reader_tid));
                }
                let Some(writer) = self.directory.get(&writer_tid).map(|e| Arc::clone(e.value())) else {
                    // Writer already reclaimed: it must have committed, else
                    // its mutations (and this band) would never have existed
                    // long enough to survive to reclaim (spec §4.4 I4).
                    break;
                };
                match writer.final_outcome() {
                    Some(true) => {
                        self.abort_with_reason(reader_tid, ordo_core::AbortReason::WriteConflict)?;
                        return Err(Error::write_conflict(reader_tid));
                    }
                    Some(false) => break,
                    None => {
                        let mut guard = self.decisions.lock();
                        self.decided.wait_for(&mut guard, Duration::from_millis(50));
                    }
                }
            }
        }
        Ok(())
    }

    fn cascade_abort_if_dependency_aborted(&self, txn: &Transaction<K>) -> Result<bool> {
        for dep in txn.read_from() {
            if let Some(dep_txn) = self.directory.get(&dep) {
                if dep_txn.state() == TxnState::Aborted {
                    self.abort_with_reason(txn.tid(), ordo_core::AbortReason::CascadedAbort { cause: dep })?;
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    fn all_dependencies_decided(&self, txn: &Transaction<K>) -> bool {
        txn.read_from().into_iter().all(|dep| {
            self.directory
                .get(&dep)
                .map(|d| d.state().is_decided() || d.state().is_finalized())
                .unwrap_or(true) // a dependency already reclaimed must have committed (spec §4.4)
        })
    }

    /// Commit `tid` (spec §4.3 commit sequence, §3 state machine).
    ///
    /// If this transaction read from still-undecided writers, it blocks
    /// (state `Blocked`) until every dependency is decided, cascading its
    /// own abort if any dependency aborts (spec §4.3 invariant I3).
    pub fn commit(&self, tid: Tid) -> Result<()> {
        let txn = self.get(tid)?;
        if !self.policy.allows_commit_from(txn.state()) {
            return Err(Error::IllegalState(format!(
                "cannot commit transaction {tid} from state {:?}",
                txn.state()
            )));
        }

        if !txn.read_from().is_empty() && !self.all_dependencies_decided(&txn) {
            txn.transition(TxnState::Blocked);
            self.log.lock().append_state_transition(tid, TxnState::Blocked)?;

            loop {
                if !self.is_running() {
                    self.abort_with_reason(tid, ordo_core::AbortReason::EngineStopped)?;
                    return Err(Error::engine_stopped_abort(tid));
                }
                if self.cascade_abort_if_dependency_aborted(&txn)? {
                    return Err(Error::TransactionAborted {
                        tid,
                        reason: ordo_core::AbortReason::CascadedAbort { cause: tid },
                    });
                }
                if self.all_dependencies_decided(&txn) {
                    break;
                }
                let mut guard = self.decisions.lock();
                self.decided.wait_for(&mut guard, Duration::from_millis(50));
            }

            txn.transition(TxnState::Started);
            self.log.lock().append_state_transition(tid, TxnState::Started)?;
        }

        self.log.lock().append_state_transition(tid, TxnState::Committed)?;
        txn.transition(TxnState::Committed);
        self.counters.committed.fetch_add(1, Ordering::Relaxed);

        self.finalize(tid, &txn)?;

        self.decided.notify_all();
        Ok(())
    }

    /// Abort `tid` (spec §3, §4.3): cascades to every transaction that read
    /// from it.
    pub fn abort(&self, tid: Tid) -> Result<()> {
        self.abort_with_reason(tid, ordo_core::AbortReason::WriteConflict)
    }

    fn abort_with_reason(&self, tid: Tid, reason: ordo_core::AbortReason) -> Result<()> {
        let txn = self.get(tid)?;
        if txn.state().is_decided() || txn.state().is_finalized() {
            return Ok(());
        }
        self.log.lock().append_state_transition(tid, TxnState::Aborted)?;
        txn.transition(TxnState::Aborted);
        self.counters.aborted.fetch_add(1, Ordering::Relaxed);
        if matches!(reason, ordo_core::AbortReason::CascadedAbort { .. }) {
            self.counters.cascaded_aborts.fetch_add(1, Ordering::Relaxed);
        }
        if matches!(reason, ordo_core::AbortReason::WriteConflict) {
            self.counters.write_conflicts.fetch_add(1, Ordering::Relaxed);
        }
        tracing::warn!(%tid, ?reason, "transaction aborted");

        for key in txn.mutation_set() {
            let _ = self.store.delete_version(&key, tid);
        }

        self.finalize(tid, &txn)?;

        let dependents: Vec<Tid> = txn.read_by().into_iter().collect();
        self.decided.notify_all();
        for dependent in dependents {
            if let Some(dep_txn) = self.directory.get(&dependent) {
                if dep_txn.state() == TxnState::Blocked {
                    let _ = self.abort_with_reason(dependent, ordo_core::AbortReason::CascadedAbort { cause: tid });
                }
            }
        }
        Ok(())
    }

    /// Transition `tid` from `Committed`/`Aborted` to `Finalized` (spec
    /// §4.4): drop it from `active_writers`, release its TSM hold, and try
    /// to advance the `active_readers` FIFO so read-set cleanup can run for
    /// every transaction now at the head that has finalized.
    fn finalize(&self, tid: Tid, txn: &Transaction<K>) -> Result<()> {
        let sid = self.log.lock().append_state_transition(tid, TxnState::Finalized)?;
        txn.transition(TxnState::Finalized);

        let mutations = txn.mutation_set();
        for key in &mutations {
            if let Some(mut writers) = self.active_writers.get_mut(key) {
                writers.retain(|&w| w != tid);
            }
        }
        if !mutations.is_empty() {
            self.pending_prunes.lock().push((tid, mutations));
        }

        {
            let mut last_sid = self.last_finalized_sid.lock();
            if sid > *last_sid {
                *last_sid = sid;
            }
        }

        self.tsm.release(tid);
        self.drain_ready_active_readers();
        Ok(())
    }

    /// The greatest log [`ordo_core::Sid`] that is safe to truncate up to
    /// right now (spec §4.4): every entry still in `active_readers` may yet
    /// need its own `Started` record replayed on a future crash, so
    /// truncation may never pass the oldest such entry's start SID.
    pub(crate) fn safe_truncation_sid(&self) -> ordo_core::Sid {
        let active_readers = self.active_readers.lock();
        match active_readers.front() {
            Some(front_tid) => self
                .started_sid
                .get(front_tid)
                .map(|sid| ordo_core::Sid::new(sid.get().saturating_sub(1)))
                .unwrap_or(ordo_core::Sid::ZERO),
            None => *self.last_finalized_sid.lock(),
        }
    }

    /// Drain and return every `(tid, mutated keys)` pair finalized since the
    /// last call, for a garbage collector to prune from the KV store
    /// (spec §4.4: version pruning follows finalization, not vice versa).
    pub(crate) fn take_pending_prunes(&self) -> Vec<(Tid, HashSet<K>)> {
        std::mem::take(&mut self.pending_prunes.lock())
    }

    /// Put back prune entries a collector didn't get to this round (spec
    /// §4.4's GC batch size knob), ahead of anything queued meanwhile so
    /// they're still the next ones picked up.
    pub(crate) fn requeue_pending_prunes(&self, mut leftover: Vec<(Tid, HashSet<K>)>) {
        if leftover.is_empty() {
            return;
        }
        let mut prunes = self.pending_prunes.lock();
        leftover.append(&mut prunes);
        *prunes = leftover;
    }

    /// Read-set cleanup (spec §4.4): pop `active_readers` while its head is
    /// finalized, since no transaction older than the head can still need
    /// that entry's reader-index rows for conflict detection. Each drained
    /// entry is removed from `readers[K]` and the directory.
    pub(crate) fn drain_ready_active_readers(&self) {
        let mut drained = Vec::new();
        {
            let mut active_readers = self.active_readers.lock();
            while let Some(&front) = active_readers.front() {
                let finalized = self
                    .directory
                    .get(&front)
                    .map(|t| t.state().is_finalized())
                    .unwrap_or(true);
                if !finalized {
                    break;
                }
                active_readers.pop_front();
                drained.push(front);
            }
        }
        for tid in drained {
            self.reclaimables.lock().insert(tid);
            if let Some((_, txn)) = self.directory.remove(&tid) {
                for key in txn.read_set() {
                    if let Some(mut entries) = self.readers.get_mut(&key) {
                        entries.retain(|&(reader, _)| reader != tid);
                    }
                }
            }
            self.reclaimables.lock().remove(&tid);
            self.counters.reclaimed.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Reconcile this (freshly constructed) manager with a completed
    /// recovery pass (spec §4.5 step 5).
    ///
    /// Transactions recovery left active (`Started`/`Blocked`, still held by
    /// the Timestamp Manager) rejoin the directory, `active_readers` FIFO
    /// and per-key `readers`/`active_writers` indices exactly as if `begin`
    /// plus their recorded reads/mutations had just replayed. Transactions
    /// recovery resolved to `Finalized` are not reinserted — they are
    /// already reclaimable — but a resolved abort's tentative mutations are
    /// rolled back one more time: `deleteVersion` is idempotent by contract
    /// (spec §4.1), and this is exactly the re-drive spec §9's second Open
    /// Question requires for a crash between individual rollback deletes.
    pub fn recover_transactions(&self, result: crate::recovery::RecoveryResult<K>) -> Result<()> {
        for (tid, (txn, state)) in result.transactions {
            match state {
                TxnState::Started | TxnState::Blocked => {
                    for key in txn.read_set() {
                        if let Some(version) = txn.read_version_of(&key) {
                            self.readers.entry(key).or_default().push((tid, version));
                        }
                    }
                    for key in txn.mutation_set() {
                        self.active_writers.entry(key).or_default().push(tid);
                    }
                    self.active_readers.lock().push_back(tid);
                    self.directory.insert(tid, txn);
                    self.counters.begun.fetch_add(1, Ordering::Relaxed);
                }
                TxnState::Finalized => {
                    match txn.final_outcome() {
                        Some(false) => {
                            for key in txn.mutation_set() {
                                self.store.delete_version(&key, tid)?;
                            }
                            self.counters.aborted.fetch_add(1, Ordering::Relaxed);
                        }
                        Some(true) => {
                            self.counters.committed.fetch_add(1, Ordering::Relaxed);
                        }
                        None => {}
                    }
                    self.counters.reclaimed.fetch_add(1, Ordering::Relaxed);
                }
                // Joined/Prepared belong to ordo-xa's own recovery path.
                _ => {}
            }
        }
        Ok(())
    }

    /// `Started`/`Blocked` transactions whose TID is `<= ts` (spec §4.4: "for
    /// every transaction T with TID <= ts: ... if STARTED/BLOCKED, log a
    /// warning and ABORT it (stale lock)"). A reclaim watermark passing a
    /// transaction that never reached a decision means whatever held it
    /// open is gone; nothing still live can depend on it surviving.
    pub(crate) fn stale_active_transactions(&self, ts: Timestamp) -> Vec<Tid> {
        self.directory
            .iter()
            .filter(|entry| entry.key().get() <= ts.get())
            .filter(|entry| matches!(entry.value().state(), TxnState::Started | TxnState::Blocked))
            .map(|entry| *entry.key())
            .collect()
    }

    /// Abort `tid` as a stale lock (spec §4.4's reclaim-driven sweep).
    pub(crate) fn abort_stale(&self, tid: Tid) -> Result<()> {
        tracing::warn!(%tid, "aborting stale lock: reclaim watermark passed an undecided transaction");
        self.abort_with_reason(tid, ordo_core::AbortReason::StaleLock)
    }

    /// Manager-wide counters snapshot (spec §6 observability).
    pub fn stats(&self) -> ManagerStats {
        ManagerStats {
            active: self.directory.len() as u64,
            committed: self.counters.committed.load(Ordering::Relaxed),
            aborted: self.counters.aborted.load(Ordering::Relaxed),
            cascaded_aborts: self.counters.cascaded_aborts.load(Ordering::Relaxed),
            write_conflicts: self.counters.write_conflicts.load(Ordering::Relaxed),
            reclaimed: self.counters.reclaimed.load(Ordering::Relaxed),
        }
    }
}

impl<K: KeyBound, V: ValueBound> TransactionObserver<K> for TransactionManager<K, V> {
    fn before_get(&self, tid: Tid, _keys: &[K]) -> Result<()> {
        let txn = self.get(tid)?;
        if !txn.state().is_active() {
            return Err(Error::IllegalState(format!(
                "transaction {tid} is not active ({:?})",
                txn.state()
            )));
        }
        Ok(())
    }

    fn after_get(&self, tid: Tid, results: &[(K, Timestamp)]) -> Result<()> {
        let txn = self.get(tid)?;
        for (key, version) in results {
            // Hold this key's lock across the forbidden-band wait and the
            // reader-index insert that follows it (spec §5): without it, a
            // concurrent `before_put`/`before_delete` could scan `readers[K]`
            // between the wait and the insert and miss this reader entirely.
            let lock = self.key_lock(key);
            let _guard = lock.lock();

            self.wait_for_forbidden_band(tid, key, *version)?;

            txn.record_read(key.clone(), *version);
            self.log.lock().append_get(tid, key.clone(), *version)?;
            self.readers.entry(key.clone()).or_default().push((tid, *version));

            if *version != Timestamp::ZERO && *version != tid {
                txn.add_read_from(*version);
                if let Some(writer) = self.directory.get(version) {
                    writer.add_read_by(tid);
                }
            }
        }
        Ok(())
    }

    fn failed_get(&self, tid: Tid, _keys: &[K], _err: &Error) -> Result<()> {
        self.abort_with_reason(tid, ordo_core::AbortReason::Io("read failed".into()))
    }

    fn before_put(&self, tid: Tid, keys: &[K]) -> Result<()> {
        let txn = self.get(tid)?;
        for key in keys {
            if !txn.has_read(key) {
                return Err(Error::IllegalState(format!(
                    "blind write to key never read by transaction {tid}"
                )));
            }
        }
        // Acquire every touched key's lock up front, in sorted order (spec
        // §5), and hold it across both the `readers[K]` conflict scan and
        // the `active_writers[K]` insert below — otherwise a concurrent
        // `after_get` could register an in-band reader between the scan and
        // the insert and never be caught by either side (I1/I2).
        let sorted = self.sorted_distinct_keys(keys);
        let locks = self.key_locks_for(keys);
        let guards: Vec<_> = locks.iter().map(|l| l.lock()).collect();

        for key in &sorted {
            if let Some(readers) = self.readers.get(key) {
                if let Some(_conflicting) = find_conflicting_reader(tid, readers.iter().copied()) {
                    drop(guards);
                    self.abort_with_reason(tid, ordo_core::AbortReason::WriteConflict)?;
                    return Err(Error::write_conflict(tid));
                }
            }
        }
        for key in keys {
            self.log.lock().append_put(tid, key.clone())?;
            txn.record_mutation(key.clone(), false);
            self.active_writers.entry(key.clone()).or_default().push(tid);
        }
        Ok(())
    }

    fn after_put(&self, _tid: Tid, _keys: &[K]) -> Result<()> {
        Ok(())
    }

    fn failed_put(&self, tid: Tid, _keys: &[K], _err: &Error) -> Result<()> {
        self.abort_with_reason(tid, ordo_core::AbortReason::Io("write failed".into()))
    }

    fn before_delete(&self, tid: Tid, keys: &[K]) -> Result<()> {
        let txn = self.get(tid)?;
        for key in keys {
            if !txn.has_read(key) {
                return Err(Error::IllegalState(format!(
                    "blind delete of key never read by transaction {tid}"
                )));
            }
        }
        // See `before_put`: hold every touched key's lock, sorted, across
        // the conflict scan and the `active_writers[K]` insert.
        let sorted = self.sorted_distinct_keys(keys);
        let locks = self.key_locks_for(keys);
        let guards: Vec<_> = locks.iter().map(|l| l.lock()).collect();

        for key in &sorted {
            if let Some(readers) = self.readers.get(key) {
                if let Some(_conflicting) = find_conflicting_reader(tid, readers.iter().copied()) {
                    drop(guards);
                    self.abort_with_reason(tid, ordo_core::AbortReason::WriteConflict)?;
                    return Err(Error::write_conflict(tid));
                }
            }
        }
        for key in keys {
            self.log.lock().append_delete(tid, key.clone())?;
            txn.record_mutation(key.clone(), true);
            self.active_writers.entry(key.clone()).or_default().push(tid);
        }
        Ok(())
    }

    fn after_delete(&self, _tid: Tid, _keys: &[K]) -> Result<()> {
        Ok(())
    }

    fn failed_delete(&self, tid: Tid, _keys: &[K], _err: &Error) -> Result<()> {
        self.abort_with_reason(tid, ordo_core::AbortReason::Io("delete failed".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ordo_core::BasicPolicy;
    use ordo_kvs::InMemoryKvStore;
    use ordo_tsm::LocalTimestampManager;

    struct VecLog;
    impl TransactionLog<String> for VecLog {
        fn append_state_transition(&mut self, _tid: Tid, _state: TxnState) -> Result<ordo_core::Sid> {
            Ok(ordo_core::Sid::ZERO)
        }
        fn append_get(&mut self, _tid: Tid, _key: String, _version: Timestamp) -> Result<ordo_core::Sid> {
            Ok(ordo_core::Sid::ZERO)
        }
        fn append_put(&mut self, _tid: Tid, _key: String) -> Result<ordo_core::Sid> {
            Ok(ordo_core::Sid::ZERO)
        }
        fn append_delete(&mut self, _tid: Tid, _key: String) -> Result<ordo_core::Sid> {
            Ok(ordo_core::Sid::ZERO)
        }
        fn append_joined(&mut self, _tid: Tid, _pid: ordo_core::PersistentRef) -> Result<ordo_core::Sid> {
            Ok(ordo_core::Sid::ZERO)
        }
        fn truncate(&mut self, _sid: ordo_core::Sid) -> Result<()> {
            Ok(())
        }
        fn recover(&self) -> Result<Box<dyn Iterator<Item = Result<ordo_core::LogRecord<String>>> + '_>> {
            Ok(Box::new(std::iter::empty()))
        }
    }

    fn manager() -> TransactionManager<String, u32> {
        let store: Arc<dyn KvStore<String, u32>> = Arc::new(InMemoryKvStore::new());
        TransactionManager::new(
            store,
            Box::new(VecLog),
            Arc::new(LocalTimestampManager::new()),
            Arc::new(BasicPolicy),
        )
    }

    #[test]
    fn write_then_commit_makes_value_visible_to_later_readers() {
        let mgr = manager();
        let writer = mgr.begin().unwrap();
        // blind-write enforcement requires a read first (spec §9).
        mgr.read(writer.tid(), &["k".to_string()]).unwrap();
        mgr.write(writer.tid(), "k".to_string(), 7).unwrap();
        mgr.commit(writer.tid()).unwrap();

        let reader = mgr.begin().unwrap();
        let out = mgr.read(reader.tid(), &["k".to_string()]).unwrap();
        assert_eq!(out, vec![("k".to_string(), Some(7))]);
    }

    #[test]
    fn blind_write_is_rejected() {
        let mgr = manager();
        let writer = mgr.begin().unwrap();
        let err = mgr.write(writer.tid(), "never-read".to_string(), 1).unwrap_err();
        assert!(matches!(err, Error::IllegalState(_)));
    }

    #[test]
    fn delayed_writer_inside_the_forbidden_band_is_aborted() {
        let mgr = manager();

        // t1 establishes an initial version of k.
        let t1 = mgr.begin().unwrap();
        mgr.read(t1.tid(), &["k".to_string()]).unwrap();
        mgr.write(t1.tid(), "k".to_string(), 1).unwrap();
        mgr.commit(t1.tid()).unwrap();

        // writer begins (and reads k, to satisfy blind-write enforcement)
        // but delays its write.
        let writer = mgr.begin().unwrap();
        mgr.read(writer.tid(), &["k".to_string()]).unwrap();

        // reader begins after writer, with a higher TID, and reads k before
        // the writer's write lands: it observes version 1.
        let reader = mgr.begin().unwrap();
        mgr.read(reader.tid(), &["k".to_string()]).unwrap();

        // writer's TID now falls strictly inside (1, reader.tid()): conflict.
        let err = mgr.write(writer.tid(), "k".to_string(), 2).unwrap_err();
        assert!(matches!(err, Error::TransactionAborted { .. }));
    }

    #[test]
    fn reader_aborts_when_active_writer_in_forbidden_band_commits() {
        let mgr = manager();

        let t1 = mgr.begin().unwrap();
        mgr.read(t1.tid(), &["k".to_string()]).unwrap();
        mgr.write(t1.tid(), "k".to_string(), 1).unwrap();
        mgr.commit(t1.tid()).unwrap();

        // writer starts, reads k (observes version from t1), buffers a
        // write, but has not yet committed.
        let writer = mgr.begin().unwrap();
        mgr.read(writer.tid(), &["k".to_string()]).unwrap();
        mgr.write(writer.tid(), "k".to_string(), 2).unwrap();

        // a reader begun after the writer observes the same old version and
        // must abort once the writer commits inside its forbidden band.
        let reader = mgr.begin().unwrap();
        let read_result = mgr.read(reader.tid(), &["k".to_string()]);
        // The writer hasn't committed yet: in a single-threaded test this
        // read happens-before the writer's commit, so it simply observes
        // version 1 with no active writer in band yet.
        assert!(read_result.is_ok());

        mgr.commit(writer.tid()).unwrap();
    }

    #[test]
    fn stats_reflect_commits_and_aborts() {
        let mgr = manager();
        let t1 = mgr.begin().unwrap();
        mgr.read(t1.tid(), &["k".to_string()]).unwrap();
        mgr.write(t1.tid(), "k".to_string(), 1).unwrap();
        mgr.commit(t1.tid()).unwrap();

        let t2 = mgr.begin().unwrap();
        mgr.abort(t2.tid()).unwrap();

        let stats = mgr.stats();
        assert_eq!(stats.committed, 1);
        assert_eq!(stats.aborted, 1);
    }

    #[test]
    fn shutdown_is_idempotent_and_stops_new_begins() {
        let mgr = manager();
        mgr.shutdown();
        mgr.shutdown();
        assert!(!mgr.is_running());
        assert!(matches!(mgr.begin(), Err(Error::EngineStopped)));
    }

    #[test]
    fn finalized_transaction_is_reclaimed_once_it_reaches_the_fifo_head() {
        let mgr = manager();
        let t1 = mgr.begin().unwrap();
        mgr.read(t1.tid(), &["k".to_string()]).unwrap();
        mgr.write(t1.tid(), "k".to_string(), 1).unwrap();
        mgr.commit(t1.tid()).unwrap();

        // t1 was the only/oldest active reader, so it drains immediately.
        assert!(mgr.get(t1.tid()).is_err());
        assert_eq!(mgr.stats().reclaimed, 1);
    }

    #[test]
    fn recover_transactions_rejoins_active_and_rolls_back_resolved_aborts() {
        let store: Arc<dyn KvStore<String, u32>> = Arc::new(InMemoryKvStore::new());
        // A tentative write an aborted-but-not-yet-rolled-back transaction
        // left behind before the simulated crash.
        store.write(&"k".to_string(), Timestamp::new(5), 99).unwrap();

        let active: Transaction<String> = Transaction::new(Timestamp::new(10));
        active.record_read("other".to_string(), Timestamp::ZERO);

        let resolved_abort: Transaction<String> = Transaction::new(Timestamp::new(5));
        resolved_abort.record_mutation("k".to_string(), false);
        resolved_abort.transition(TxnState::Aborted);
        resolved_abort.transition(TxnState::Finalized);

        let mut transactions = std::collections::BTreeMap::new();
        transactions.insert(Timestamp::new(10), (Arc::new(active), TxnState::Started));
        transactions.insert(Timestamp::new(5), (Arc::new(resolved_abort), TxnState::Finalized));
        let result = crate::recovery::RecoveryResult {
            transactions,
            stats: crate::recovery::RecoveryStats::default(),
        };

        let mgr = TransactionManager::new(
            Arc::clone(&store),
            Box::new(VecLog),
            Arc::new(LocalTimestampManager::new()),
            Arc::new(BasicPolicy),
        );
        mgr.recover_transactions(result).unwrap();

        assert!(mgr.get(Timestamp::new(10)).is_ok());
        assert_eq!(mgr.stats().aborted, 1);
        assert_eq!(
            store.read(&"k".to_string(), Timestamp::new(100)).unwrap(),
            None,
            "the aborted transaction's tentative write must be rolled back"
        );
    }
}
