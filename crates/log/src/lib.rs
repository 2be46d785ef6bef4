//! The durable Transaction Log (spec §2 component 2, §4.2, §6).
//!
//! [`SegmentedLog`] is a per-group, append-only, segmented write-ahead log:
//! every `append_*` call fsyncs before returning the [`ordo_core::Sid`] that
//! durability witness, and [`SegmentedLog::recover`] replays every surviving
//! record in SID order. [`config::WalConfig`] governs segment sizing and the
//! fsync policy; [`LogSet`] keeps one `SegmentedLog` per transaction group.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod config;
mod format;
mod segment;
mod set;
mod writer;

pub use config::{DurabilityMode, WalConfig, WalConfigError};
pub use format::{SEGMENT_FORMAT_VERSION, SEGMENT_HEADER_SIZE, SEGMENT_MAGIC};
pub use set::LogSet;
pub use writer::{SegmentedLog, WalCounters};
