//! The Timestamp Manager contract (spec §4.3 intro via §2, §6)

use crate::error::Result;
use crate::timestamp::{PersistentRef, Timestamp};

/// Monotonic timestamp oracle plus liveness tracking (spec §2 component 1,
/// §6).
///
/// A timestamp is *live* while some holder retains a reference acquired via
/// [`TimestampManager::acquire`]. When the oldest live timestamp advances,
/// implementors fire a *reclamation* event to every registered listener.
pub trait TimestampManager: Send + Sync {
    /// Issue a new, monotone, unique timestamp and mark it live.
    fn acquire(&self) -> Timestamp;

    /// Release the caller's hold on `ts`.
    ///
    /// Releasing an unknown or already-released timestamp is a no-op
    /// (spec §7: `NoSuchTimestamp` is swallowed as idempotent).
    fn release(&self, ts: Timestamp);

    /// Whether `ts` is still held live by some caller.
    ///
    /// Used during recovery (spec §4.5) to decide whether a `STARTED`/
    /// `BLOCKED` transaction found in the log is still legitimately live or
    /// must be aborted as stale.
    fn is_held_by_caller(&self, ts: Timestamp) -> bool;

    /// Register a listener fired with the largest `ts` such that no live
    /// timestamp is `<= ts` (a reclamation event).
    ///
    /// Firing happens synchronously inside `acquire`/`release` calls that
    /// advance the watermark — the manager does not run its own scheduler
    /// (spec's Non-goals extended to "does not schedule physical I/O").
    fn add_reclamation_listener(&self, listener: Box<dyn Fn(Timestamp) + Send + Sync>);
}

/// Extension of [`TimestampManager`] for distributed (XA) transactions
/// (spec §4.6, §6).
///
/// Issues one shared timestamp per distributed transaction plus a
/// persistent child reference per participant, and holds the durable 2PC
/// decision record (`persistReferences`), which is the point of no return.
pub trait SharedTimestampManager: TimestampManager {
    /// Issue the one shared TID for a new distributed transaction.
    fn acquire_shared(&self) -> Timestamp;

    /// Release the coordinator's hold on a shared TID.
    fn release_shared(&self, ts: Timestamp);

    /// Acquire a persistent child reference for participant enlistment
    /// under the shared timestamp `ts` (spec §4.6 `join`).
    fn acquire_reference(&self, ts: Timestamp) -> Result<PersistentRef>;

    /// Release a previously acquired persistent child reference.
    ///
    /// Releasing an unknown reference is a no-op (spec §7).
    fn release_reference(&self, ts: Timestamp, pid: PersistentRef);

    /// Atomically and durably record the coordinator's commit decision for
    /// `ts` across all participant references `pids`.
    ///
    /// This is the **point of no return** (spec §4.6): once it returns
    /// `Ok`, every participant must eventually reach `COMMITTED` regardless
    /// of coordinator or participant crashes (spec §8 property P6).
    fn persist_references(&self, ts: Timestamp, pids: &[PersistentRef]) -> Result<()>;

    /// Register a one-shot listener fired if `ts` is released before the
    /// participant holding it calls `prepare` (spec §4.6: "If the
    /// coordinator's TID is released before prepare, the TSM fires
    /// `released(tid)`").
    fn add_timestamp_listener(&self, ts: Timestamp, listener: Box<dyn FnOnce() + Send>);
}
