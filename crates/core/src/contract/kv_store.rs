//! The Key/Value Store Adapter contract (spec §4.1, §6)

use crate::error::Result;
use crate::key::{KeyBound, ValueBound};
use crate::timestamp::Timestamp;

/// Capability to read, write and version-delete cells in a multi-version
/// key/value store.
///
/// The engine never implements the underlying store itself (spec §1
/// Non-goals); it is handed a `KvStore` capability by the host. Methods take
/// `&self` rather than `&mut self` because real hosts (e.g. an HBase
/// coprocessor) expose concurrent, lock-free access to the underlying store;
/// implementors are responsible for their own interior mutability.
pub trait KvStore<K: KeyBound, V: ValueBound>: Send + Sync {
    /// Write a cell version tagged with `ts`.
    ///
    /// Spec §4.1: the adapter is not responsible for choosing `ts` — the
    /// caller (the Transaction Manager) already holds the transaction's TID.
    fn write(&self, key: &K, ts: Timestamp, value: V) -> Result<()>;

    /// Read the greatest version of `key` with timestamp `<= bound`.
    ///
    /// Returns `None` if no such version exists (the key never existed, or
    /// every version is newer than `bound`).
    fn read(&self, key: &K, bound: Timestamp) -> Result<Option<(Timestamp, V)>>;

    /// Delete the exact version `(key, ts)`.
    ///
    /// MUST be idempotent (spec §4.1): deleting an already-deleted or
    /// never-written version is a no-op, not an error.
    fn delete_version(&self, key: &K, ts: Timestamp) -> Result<()>;

    /// Delete all versions of `key` with timestamp `<= bound`, keeping any
    /// version with timestamp `> bound`.
    ///
    /// MUST be idempotent and, when not atomic, MUST delete oldest-first
    /// (spec §4.1) so a crash between individual deletions never removes a
    /// version still needed to answer a read for a still-live older
    /// transaction (spec §9's second Open Question).
    fn delete_versions(&self, key: &K, bound: Timestamp) -> Result<()>;
}
