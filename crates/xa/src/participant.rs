//! The protocol surface a [`crate::Coordinator`] drives (spec §4.6).
//!
//! One group's local 2PC participant implements this; the coordinator
//! holds a heterogeneous set of them (one per enlisted group) without
//! needing to know each group's key/value types.

use ordo_core::{Result, Tid, Xid};

/// A single group's local half of a distributed transaction.
///
/// Implemented by [`crate::XaTransactionManager`]; kept as a trait so a
/// [`crate::Coordinator`] can enlist participants across groups with
/// different key/value types behind one `Vec<Arc<dyn Participant>>`.
pub trait Participant: Send + Sync {
    /// Enlist under the coordinator's shared `tid` (spec §4.6 `join`).
    fn join(&self, tid: Tid) -> Result<Xid>;

    /// Vote to commit (spec §4.6 `prepare`).
    fn prepare(&self, xid: Xid) -> Result<()>;

    /// Commit. `one_phase` signals the degenerate single-participant case
    /// where the coordinator skipped `prepare` entirely (spec §4.6
    /// `commit(xid, onePhase)`).
    fn commit(&self, xid: Xid, one_phase: bool) -> Result<()>;

    /// Abort (spec §4.6 `abort`): valid whether this participant is
    /// `Joined`, `Prepared`, `Started` or `Blocked`.
    fn abort(&self, xid: Xid) -> Result<()>;
}
