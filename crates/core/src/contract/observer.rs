//! The transaction-operation observer contract (spec §4.1, §4.3, §9)
//!
//! The hosting KV layer invites the Transaction Manager into every
//! get/put/delete, both before and after the underlying store acts, plus a
//! `failed*` callback when the store's own I/O fails. Spec §9 asks that this
//! be "an interface the KV adapter invokes. No global registries; wire at
//! construction" — so this is a plain trait, not an event bus.

use crate::error::{Error, Result};
use crate::key::KeyBound;
use crate::timestamp::{Tid, Timestamp};

/// Implemented by the Transaction Manager; invoked by a [`crate::contract::KvStore`]
/// adapter around each operation it serves.
///
/// Errors from `before*` hooks MUST prevent the underlying KV action (spec
/// §7): the adapter should propagate the error and never call the store.
/// Errors that occur *after* a `before*` hook has succeeded are reported via
/// the matching `failed*` hook so the Transaction Manager can unwind its
/// bookkeeping (spec §7).
pub trait TransactionObserver<K: KeyBound>: Send + Sync {
    /// About to serve reads for `keys`. No MVTO state change (spec §4.3):
    /// the real work happens once the chosen version is known, in `after_get`.
    fn before_get(&self, tid: Tid, keys: &[K]) -> Result<()>;

    /// The store served `results`, each the version it chose for that key.
    ///
    /// This is where MVTO enforces rule 2: blocking or aborting the reader
    /// if a concurrent writer's TID falls in the forbidden band (spec §4.3).
    fn after_get(&self, tid: Tid, results: &[(K, Timestamp)]) -> Result<()>;

    /// The read for `keys` failed at the store. Spec §7: a failed read
    /// aborts the transaction (it cannot be retried because the engine
    /// cannot know which version would have been chosen).
    fn failed_get(&self, tid: Tid, keys: &[K], err: &Error) -> Result<()>;

    /// About to write `keys`. MVTO's write-conflict scan runs here (spec
    /// §4.3): an error return means the write must not happen and `tid` is
    /// now aborted.
    fn before_put(&self, tid: Tid, keys: &[K]) -> Result<()>;

    /// The store durably wrote `keys`. Spec §4.3: confirms a log record
    /// already written in `before_put` is durable; no further bookkeeping.
    fn after_put(&self, tid: Tid, keys: &[K]) -> Result<()>;

    /// The write for `keys` failed at the store. Spec §7: a failed write
    /// aborts the transaction.
    fn failed_put(&self, tid: Tid, keys: &[K], err: &Error) -> Result<()>;

    /// About to delete `keys`. Same conflict scan as `before_put` (spec §4.3).
    fn before_delete(&self, tid: Tid, keys: &[K]) -> Result<()>;

    /// The store durably deleted `keys`.
    fn after_delete(&self, tid: Tid, keys: &[K]) -> Result<()>;

    /// The delete for `keys` failed at the store; aborts the transaction.
    fn failed_delete(&self, tid: Tid, keys: &[K], err: &Error) -> Result<()>;
}
