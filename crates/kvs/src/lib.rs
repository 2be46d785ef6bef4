//! The KV Store Adapter (spec §2 component 3, §4.1, §6).
//!
//! [`InMemoryKvStore`] holds every version of every key, sharded per key via
//! `DashMap` (grounded on the teacher's `ShardedStore`/`VersionChain`
//! design), and wires an [`ordo_core::TransactionObserver`] around each
//! operation exactly as spec §4.1 describes: `before*` hooks run before the
//! store acts, `after*`/`failed*` run once the outcome is known.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod chain;
mod store;

pub use chain::VersionChain;
pub use store::InMemoryKvStore;
