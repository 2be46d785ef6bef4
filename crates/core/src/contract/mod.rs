//! The six components wired together as traits
//!
//! Spec §9's design notes call for "an interface the KV adapter invokes. No
//! global registries; wire at construction" and for XA to be modeled as "a
//! sum-type on transaction state plus a policy object", rather than the
//! source's inheritance. Both instructions land here: every cross-crate
//! collaboration is a trait, constructed and handed to its user explicitly.

mod kv_store;
mod log;
mod observer;
mod policy;
mod tsm;

pub use kv_store::KvStore;
pub use log::{LogRecord, LogRecordBody, Sid, TransactionLog};
pub use observer::TransactionObserver;
pub use policy::{BasicPolicy, CommitPolicy};
pub use tsm::{SharedTimestampManager, TimestampManager};
