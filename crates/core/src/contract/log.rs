//! The Transaction Log contract (spec §4.2, §6)

use crate::error::Result;
use crate::key::KeyBound;
use crate::state::TxnState;
use crate::timestamp::{PersistentRef, Tid, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Log sequence identifier.
///
/// SIDs impose a total replay order that respects the program order of each
/// transaction's operations (spec §4.2). Every successfully appended record
/// is assigned one, and `append*` returns it as the durability witness.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct Sid(u64);

impl Sid {
    /// The sequence id before any record has been appended.
    pub const ZERO: Sid = Sid(0);

    /// Wrap a raw sequence number (used when decoding a record from disk).
    pub const fn new(value: u64) -> Self {
        Sid(value)
    }

    /// The raw integer value.
    pub const fn get(self) -> u64 {
        self.0
    }

    /// The next sequence id after this one.
    pub fn next(self) -> Self {
        Sid(self.0 + 1)
    }
}

impl fmt::Display for Sid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The body of a single durable log record (spec §4.2, §6).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogRecordBody<K> {
    /// The transaction moved to a new state.
    StateTransition {
        /// The new state.
        state: TxnState,
    },
    /// The transaction observed `version` of `key` (an `afterGet` hook).
    Get {
        /// The key read.
        key: K,
        /// The version chosen by the KV store.
        version: Timestamp,
    },
    /// The transaction buffered a write to `key`.
    Put {
        /// The key written.
        key: K,
    },
    /// The transaction buffered a delete of `key`.
    Delete {
        /// The key deleted.
        key: K,
    },
    /// XA extension: the transaction joined a distributed transaction under
    /// persistent child reference `pid` (spec §4.6).
    Joined {
        /// The persistent child reference acquired from the Shared TSM.
        pid: PersistentRef,
    },
}

/// A single durable record, replayed from the log in SID order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord<K> {
    /// This record's position in the total replay order.
    pub sid: Sid,
    /// The transaction this record belongs to.
    pub tid: Tid,
    /// The record payload.
    pub body: LogRecordBody<K>,
}

/// Append-only, durable, per-group record of transaction state transitions
/// and operations (spec §4.2).
///
/// `append*` methods durably write before returning; the returned [`Sid`] is
/// the durability witness (spec §4.2: "durable before return").
pub trait TransactionLog<K: KeyBound>: Send + Sync {
    /// Append a `STATE_TRANSITION` record.
    fn append_state_transition(&mut self, tid: Tid, state: TxnState) -> Result<Sid>;

    /// Append a `GET` record.
    fn append_get(&mut self, tid: Tid, key: K, version: Timestamp) -> Result<Sid>;

    /// Append a `PUT` record.
    fn append_put(&mut self, tid: Tid, key: K) -> Result<Sid>;

    /// Append a `DELETE` record.
    fn append_delete(&mut self, tid: Tid, key: K) -> Result<Sid>;

    /// Append a `JOINED` record (XA extension, spec §4.6).
    fn append_joined(&mut self, tid: Tid, pid: PersistentRef) -> Result<Sid>;

    /// Physically discard all records with `sid <= sid` (spec §4.2).
    ///
    /// Called by GC once a contiguous prefix of the TID order has been
    /// deleted (spec §4.4).
    fn truncate(&mut self, sid: Sid) -> Result<()>;

    /// A lazy, ordered sequence of all surviving records, oldest first
    /// (spec §4.2).
    fn recover(&self) -> Result<Box<dyn Iterator<Item = Result<LogRecord<K>>> + '_>>;
}
