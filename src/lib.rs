//! # Ordo
//!
//! A multi-version timestamp-ordering (MVTO) concurrency-control engine,
//! with an optional XA/2PC extension for cross-group transactions.
//!
//! Ordo gives a key-value storage adapter serializable, snapshot-isolated
//! transactions without locking readers against writers: every reader sees
//! the greatest version at or before its own timestamp, and a writer is
//! only blocked or aborted when its write would fall strictly between a
//! reader's observed version and that reader's own timestamp (the
//! "forbidden band").
//!
//! # Quick start
//!
//! ```no_run
//! use ordo::{Engine, EngineConfig};
//!
//! fn main() -> ordo_core::Result<()> {
//!     let engine: Engine<String, String> =
//!         Engine::start(EngineConfig::for_testing().with_log_directory("./ordo-data"))?;
//!
//!     let txn = engine.begin()?;
//!     engine.read(txn.tid(), &["k".to_string()])?;
//!     engine.write(txn.tid(), "k".to_string(), "v".to_string())?;
//!     engine.commit(txn.tid())?;
//!
//!     engine.stop();
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! [`Engine`] is the facade: it wires together the durable log
//! ([`ordo_log`]), the timestamp oracle ([`ordo_tsm`]), the in-memory
//! reference KV adapter ([`ordo_kvs`]) and the transaction manager
//! ([`ordo_concurrency`]) behind a single start/stop lifecycle. A host that
//! wants its own storage backend implements [`ordo_core::KvStore`]
//! directly and drives [`ordo_concurrency::TransactionManager`] itself
//! rather than going through [`Engine`]. Cross-group transactions use
//! [`ordo_xa`]'s [`ordo_xa::Coordinator`] over one [`ordo_xa::XaTransactionManager`]
//! per participating group.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod engine;
pub mod logging;

pub use config::{EngineConfig, EngineConfigError};
pub use engine::{Engine, EngineState};

pub use ordo_core::{Error, Result, Tid, Timestamp, TxnState};
