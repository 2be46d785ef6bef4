//! Timestamp Manager (spec §2 component 1, §4.3 intro, §6).
//!
//! [`LocalTimestampManager`] issues the monotone timestamp order the whole
//! engine relies on and tracks which timestamps are still *live* (held by
//! some in-flight reader or writer), firing a reclamation event whenever the
//! oldest live timestamp advances. [`SharedTimestampManager`] is the XA
//! extension: it layers persistent child references and the durable 2PC
//! decision record on top of the same live-set machinery.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod local;
mod shared;

pub use local::LocalTimestampManager;
pub use shared::SharedTimestampManagerImpl;
