//! Core types and contract traits for the Ordo MVTO engine
//!
//! This crate defines the foundational vocabulary shared by every other
//! `ordo-*` crate:
//! - [`Timestamp`] / [`Tid`] / [`Xid`]: the timestamp-ordering identifiers
//! - [`TxnState`]: the transaction state machine of the spec
//! - [`KeyBound`] / [`GroupBound`]: the opaque key/group bounds other crates
//!   generalize over
//! - [`Error`] / [`Result`]: the unified error type crossing crate boundaries
//! - `contract`: the traits ([`contract::KvStore`], [`contract::TransactionLog`],
//!   [`contract::TimestampManager`], [`contract::SharedTimestampManager`],
//!   [`contract::TransactionObserver`], [`contract::CommitPolicy`]) that wire
//!   the six components together without any crate depending on another's
//!   concrete implementation.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod contract;
pub mod error;
pub mod key;
pub mod state;
pub mod timestamp;

pub use contract::{
    BasicPolicy, CommitPolicy, KvStore, LogRecord, LogRecordBody, SharedTimestampManager, Sid,
    TransactionLog, TransactionObserver, TimestampManager,
};
pub use error::{AbortReason, Error, Result};
pub use key::{GroupBound, KeyBound, ValueBound};
pub use state::TxnState;
pub use timestamp::{PersistentRef, Timestamp, Tid, Xid};
