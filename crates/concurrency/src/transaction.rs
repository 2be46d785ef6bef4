use ordo_core::{Tid, Timestamp, TxnState};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::hash::Hash;

/// Per-transaction bookkeeping (spec §2 component 4, §3).
///
/// Tracks the read/write sets MVTO's conflict rules need plus the
/// commit-dependency edges (`read_from`/`read_by`) that implement spec
/// §4.3's "a reader depends on the writer of the version it chose" rule and
/// §4.3's cascading-abort invariant (I3).
///
/// Grounded on the teacher's `TransactionContext`: identity, tracking sets,
/// state and an `ensure_active`-style guard live in the same places; the
/// tracking sets themselves (`read_from`/`read_by`) are MVTO-specific and
/// have no OCC counterpart (see `DESIGN.md`).
pub struct Transaction<K> {
    tid: Tid,
    state: Mutex<TxnState>,
    reads: Mutex<HashSet<K>>,
    read_versions: Mutex<HashMap<K, Timestamp>>,
    /// Ordered `(key, is_delete)` pairs, program order, at most one entry
    /// per key (spec §3: "ordered list of (K, isDelete); invariant: at most
    /// one mutation per key").
    mutations: Mutex<Vec<(K, bool)>>,
    read_from: Mutex<HashSet<Tid>>,
    read_by: Mutex<HashSet<Tid>>,
    /// `Some(true)` once this transaction has durably committed, `Some(false)`
    /// once it has aborted. Survives the `Committed/Aborted -> Finalized`
    /// transition so a blocked reader waiting on this writer (spec §4.3
    /// `afterGet` rule 2) can still learn the outcome after finalization,
    /// even though `state()` alone no longer distinguishes the two.
    final_outcome: Mutex<Option<bool>>,
}

impl<K: Eq + Hash + Clone> Transaction<K> {
    /// A freshly begun transaction in the `Started` state.
    pub fn new(tid: Tid) -> Self {
        Transaction {
            tid,
            state: Mutex::new(TxnState::Started),
            reads: Mutex::new(HashSet::new()),
            read_versions: Mutex::new(HashMap::new()),
            mutations: Mutex::new(Vec::new()),
            read_from: Mutex::new(HashSet::new()),
            read_by: Mutex::new(HashSet::new()),
            final_outcome: Mutex::new(None),
        }
    }

    /// This transaction's identifier (and TID — spec §3).
    pub fn tid(&self) -> Tid {
        self.tid
    }

    /// Current lifecycle state.
    pub fn state(&self) -> TxnState {
        *self.state.lock()
    }

    /// Attempt `current -> next`; returns `false` if the transition is
    /// illegal per [`TxnState::can_transition_to`], leaving state unchanged.
    pub fn transition(&self, next: TxnState) -> bool {
        let mut state = self.state.lock();
        if !state.can_transition_to(next) {
            return false;
        }
        match next {
            TxnState::Committed => *self.final_outcome.lock() = Some(true),
            TxnState::Aborted => *self.final_outcome.lock() = Some(false),
            _ => {}
        }
        *state = next;
        true
    }

    /// `Some(true)` if this transaction committed, `Some(false)` if it
    /// aborted, `None` if its outcome is not yet decided.
    pub fn final_outcome(&self) -> Option<bool> {
        *self.final_outcome.lock()
    }

    /// Record that `key` was read at `version`.
    pub fn record_read(&self, key: K, version: Timestamp) {
        self.reads.lock().insert(key.clone());
        self.read_versions.lock().insert(key, version);
    }

    /// Whether this transaction has read `key` (spec §9 blind-write check).
    pub fn has_read(&self, key: &K) -> bool {
        self.reads.lock().contains(key)
    }

    /// The version this transaction observed for `key`, if it read it.
    pub fn read_version_of(&self, key: &K) -> Option<Timestamp> {
        self.read_versions.lock().get(key).copied()
    }

    /// Record that `key` was buffered for write (`is_delete = false`) or
    /// delete (`is_delete = true`), in program order. A key already mutated
    /// keeps its first recorded entry (at most one mutation per key, spec
    /// §3) — the read-before-write precondition means a second `before_put`/
    /// `before_delete` on the same key never reaches here anyway, but the
    /// invariant is enforced here too rather than assumed.
    pub fn record_mutation(&self, key: K, is_delete: bool) {
        let mut mutations = self.mutations.lock();
        if !mutations.iter().any(|(k, _)| *k == key) {
            mutations.push((key, is_delete));
        }
    }

    /// Every key read so far.
    pub fn read_set(&self) -> HashSet<K> {
        self.reads.lock().clone()
    }

    /// Every key written or deleted so far, order and `is_delete` discarded
    /// (spec §4.4's rollback/pruning paths only need the key set).
    pub fn mutation_set(&self) -> HashSet<K> {
        self.mutations.lock().iter().map(|(k, _)| k.clone()).collect()
    }

    /// Every `(key, is_delete)` mutation in program order (spec §3's data
    /// model verbatim).
    pub fn mutations_ordered(&self) -> Vec<(K, bool)> {
        self.mutations.lock().clone()
    }

    /// Record a commit dependency: this transaction read a version written
    /// by `writer` (spec §4.3).
    pub fn add_read_from(&self, writer: Tid) {
        self.read_from.lock().insert(writer);
    }

    /// The set of transactions this one depends on.
    pub fn read_from(&self) -> HashSet<Tid> {
        self.read_from.lock().clone()
    }

    /// Record that `reader` depends on this transaction (the inverse edge,
    /// used to notify dependents on abort/commit).
    pub fn add_read_by(&self, reader: Tid) {
        self.read_by.lock().insert(reader);
    }

    /// Every transaction that depends on this one.
    pub fn read_by(&self) -> HashSet<Tid> {
        self.read_by.lock().clone()
    }

    /// Whether this transaction is read-only (no buffered mutations).
    pub fn is_read_only(&self) -> bool {
        self.mutations.lock().is_empty()
    }
}

// Always held behind `Arc<Transaction<K>>` in the manager's directory and
// touched from whichever thread is driving that transaction's calls, so it
// must stay thread-safe for any `KeyBound` key type.
#[cfg(test)]
static_assertions::assert_impl_all!(Transaction<String>: Send, Sync);
