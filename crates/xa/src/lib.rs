//! The 2PC/XA extension (spec §4.6).
//!
//! Adds two transaction states (`Joined`, `Prepared`) and a coordinator
//! protocol on top of the plain MVTO engine, without the base
//! `ordo_concurrency::TransactionManager` needing to know XA exists: the
//! extension is entirely a policy object ([`XaPolicy`]) plus two manager
//! methods ([`ordo_concurrency::TransactionManager::join`]/`prepare`) gated
//! by that policy (spec §9's "sum-type on transaction state plus a policy
//! object" design note).
//!
//! [`XaTransactionManager`] wraps one group's local manager with the
//! [`ordo_core::SharedTimestampManager`] bookkeeping a participant needs;
//! [`Coordinator`] drives a set of them (implemented via the [`Participant`]
//! trait) through `join`/`prepare`/`commit`/`abort`.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod coordinator;
mod participant;
mod policy;
mod xa_manager;

pub use coordinator::Coordinator;
pub use participant::Participant;
pub use policy::XaPolicy;
pub use xa_manager::XaTransactionManager;
