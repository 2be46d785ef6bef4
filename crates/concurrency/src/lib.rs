//! The Transaction Manager (spec §2 component 5, §4.3–§4.5, §6).
//!
//! [`Transaction`] is the per-TID bookkeeping object (read/write sets, the
//! commit-dependency edges, its state). [`TransactionManager`] owns the
//! per-key indices MVTO's conflict rules need, implements
//! [`ordo_core::TransactionObserver`] so the KV adapter can invite it into
//! every operation, and drives `begin`/`commit`/`abort`. [`conflict`] holds
//! the pure MVTO rule checks; [`recovery`] rebuilds this state from the log
//! after a restart; [`gc`] reclaims versions once the timestamp watermark
//! advances past them.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod conflict;
pub mod gc;
pub mod manager;
pub mod recovery;
pub mod transaction;

pub use manager::{ManagerStats, TransactionManager};
pub use transaction::Transaction;
