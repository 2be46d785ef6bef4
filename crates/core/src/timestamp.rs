//! Timestamps, transaction identifiers and XA identifiers
//!
//! A [`Timestamp`] is a monotonically increasing integer handed out by the
//! Timestamp Manager. The identifier assigned at `begin` (the [`Tid`]) *is*
//! a timestamp, and orders transactions in the serializability relation `<`
//! (spec §3). For XA a participant's local slice of a distributed
//! transaction is identified by an [`Xid`], pairing the coordinator's TID
//! with a persistent child id issued by the Shared Timestamp Manager.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A monotonically increasing, totally ordered timestamp.
///
/// Timestamps are issued by a Timestamp Manager and compared only against
/// other timestamps from the same manager lineage (spec §3, §6).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct Timestamp(u64);

impl Timestamp {
    /// The smallest possible timestamp. Never issued by a real manager; used
    /// as a sentinel for "no version" / "key did not exist".
    pub const ZERO: Timestamp = Timestamp(0);

    /// Wrap a raw integer timestamp.
    ///
    /// Exposed so adapters that observe timestamps "from the wire" (e.g. log
    /// replay) can reconstruct them without depending on how the TSM issues
    /// them.
    pub const fn new(value: u64) -> Self {
        Timestamp(value)
    }

    /// The raw integer value.
    pub const fn get(self) -> u64 {
        self.0
    }

    /// The next timestamp after this one. Used by timestamp managers to
    /// advance their monotonic counter.
    pub fn next(self) -> Self {
        Timestamp(self.0 + 1)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Timestamp {
    fn from(value: u64) -> Self {
        Timestamp(value)
    }
}

/// Transaction identifier: the timestamp issued at `begin` (spec §3).
///
/// `Tid` is a type alias rather than a distinct newtype because spec §3 is
/// explicit that "The TID orders transactions in the serializability
/// relation `<`" using plain timestamp order — keeping them the same type
/// means a `Tid` can be used anywhere a read bound or version timestamp is
/// expected, exactly as the spec's algorithms do (e.g. `chosen-version ≤ TID`).
pub type Tid = Timestamp;

/// Opaque persistent child id issued by `acquireReference` on the Shared
/// Timestamp Manager (spec §4.6, §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PersistentRef(u64);

impl PersistentRef {
    /// Wrap a raw reference id.
    pub const fn new(value: u64) -> Self {
        PersistentRef(value)
    }

    /// The raw integer value.
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for PersistentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Distributed transaction identifier: `(TID, persistent-child-id)` (spec §3, §6).
///
/// Identifies a single participant's local slice of a transaction that spans
/// multiple groups via 2PC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Xid {
    /// The coordinator-issued shared TID.
    pub tid: Tid,
    /// This participant's persistent child reference.
    pub pid: PersistentRef,
}

impl Xid {
    /// Build an XID from its parts.
    pub const fn new(tid: Tid, pid: PersistentRef) -> Self {
        Xid { tid, pid }
    }
}

impl fmt::Display for Xid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.tid, self.pid)
    }
}

// Every identifier type is handed across thread boundaries (read/write sets,
// the directory, the reader/writer indices) and stored by value rather than
// behind a lock, so all three must stay cheap to copy and safe to share.
#[cfg(test)]
static_assertions::assert_impl_all!(Timestamp: Copy, Send, Sync, Ord);
#[cfg(test)]
static_assertions::assert_impl_all!(PersistentRef: Copy, Send, Sync, Ord);
#[cfg(test)]
static_assertions::assert_impl_all!(Xid: Copy, Send, Sync, Ord);
