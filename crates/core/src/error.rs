//! Unified error type crossing the engine's external boundary
//!
//! Spec §6 enumerates the errors a caller of the Transaction Manager can
//! observe: `TransactionAborted{WriteConflict|CascadedAbort|EngineStopped|
//! Deadline|Io(inner)}`, `NoSuchTransaction`, `IllegalState`, `Io`. Spec §7
//! assigns each a retry policy; that policy lives as doc comments here so a
//! caller reading this type also reads the contract.

use crate::timestamp::Tid;
use thiserror::Error;

/// Result alias used throughout the Ordo crates.
pub type Result<T> = std::result::Result<T, Error>;

/// Why a transaction was aborted.
///
/// Carried inside [`Error::TransactionAborted`] rather than flattened into
/// top-level `Error` variants, since all four reasons share the same
/// "this transaction is done, nothing you do will un-abort it" semantics
/// (spec §7) and differ only in cause.
#[derive(Debug, Clone, Error)]
pub enum AbortReason {
    /// MVTO rule 2a triggered: a reader observed a version that a later
    /// writer's timestamp falls strictly between (spec §4.3 beforePut/beforeDelete).
    #[error("write conflict")]
    WriteConflict,

    /// A `readFrom` dependency aborted, so this transaction must cascade
    /// (spec §4.3 commit step 2, invariant I3).
    #[error("cascaded abort: dependency {cause} aborted")]
    CascadedAbort {
        /// The dependency transaction whose abort triggered this one.
        cause: Tid,
    },

    /// The engine entered shutdown while this transaction was blocked
    /// (spec §5's suspension-point rule).
    #[error("engine stopped")]
    EngineStopped,

    /// A caller-imposed deadline elapsed. The core itself exposes no
    /// timeout (spec §5); this variant exists for hosts that layer one on
    /// top and still want to funnel the abort through this type.
    #[error("deadline exceeded")]
    Deadline,

    /// The underlying log or KV store failed I/O during a step that left
    /// the transaction's outcome unresolvable from the caller's point of
    /// view (spec §7's `Io` during `append(COMMITTED)` case).
    #[error("I/O error: {0}")]
    Io(String),

    /// A reclaim event's watermark passed this transaction's TID while it
    /// was still `Started`/`Blocked` (spec §4.4): whatever held it open
    /// crashed or hung, and no live timestamp can still need it to survive.
    #[error("stale lock: reclaimed past TID while still active")]
    StaleLock,
}

/// The error type surfaced across the Transaction Manager's API boundary.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// The transaction was aborted; see [`AbortReason`] for why.
    ///
    /// Non-recoverable for that transaction; other transactions are
    /// unaffected (spec §7).
    #[error("transaction {tid} aborted: {reason}")]
    TransactionAborted {
        /// The aborted transaction's id.
        tid: Tid,
        /// Why it was aborted.
        reason: AbortReason,
    },

    /// No transaction with this id is known to the manager.
    #[error("no such transaction: {0}")]
    NoSuchTransaction(Tid),

    /// The caller violated the API protocol (e.g. committing a transaction
    /// that is not in `Started` state). Bug-class: never retry (spec §7).
    #[error("illegal state: {0}")]
    IllegalState(String),

    /// The engine has entered shutdown and rejects new operations.
    #[error("engine stopped")]
    EngineStopped,

    /// Log or KV-store I/O failure that does not by itself determine the
    /// transaction's outcome.
    #[error("I/O error: {0}")]
    Io(String),
}

impl Error {
    /// Build a [`Error::TransactionAborted`] for a write conflict.
    pub fn write_conflict(tid: Tid) -> Self {
        Error::TransactionAborted {
            tid,
            reason: AbortReason::WriteConflict,
        }
    }

    /// Build a [`Error::TransactionAborted`] for a cascaded abort.
    pub fn cascaded_abort(tid: Tid, cause: Tid) -> Self {
        Error::TransactionAborted {
            tid,
            reason: AbortReason::CascadedAbort { cause },
        }
    }

    /// Build a [`Error::TransactionAborted`] for an engine-stopped abort.
    pub fn engine_stopped_abort(tid: Tid) -> Self {
        Error::TransactionAborted {
            tid,
            reason: AbortReason::EngineStopped,
        }
    }

    /// Build a [`Error::TransactionAborted`] for a GC stale-lock abort.
    pub fn stale_lock_abort(tid: Tid) -> Self {
        Error::TransactionAborted {
            tid,
            reason: AbortReason::StaleLock,
        }
    }

    /// Whether this error class is retryable by the caller (spec §7).
    ///
    /// `IllegalState` is bug-class and never retryable. Conflicts are
    /// retryable by re-running the transaction from scratch (not by
    /// retrying the same `TransactionContext`, which is now terminal).
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Error::IllegalState(_))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}
