//! Pure MVTO conflict rules (spec §4.3).
//!
//! Kept free of any manager state so the rules themselves are easy to read
//! and to exercise with property tests, independent of how the manager
//! stores its per-key reader index.

use ordo_core::{Tid, Timestamp};

/// MVTO rule 2: a writer with timestamp `writer_ts` conflicts with an
/// already-recorded reader if the reader's own TID is greater than
/// `writer_ts` (the reader is "from the future" relative to this write) but
/// the version it actually observed is older than `writer_ts` (had this
/// write already existed, the reader should have seen it instead).
///
/// That is: the writer's TID falls strictly inside the forbidden band
/// `(observed_version, reader_tid]`.
pub fn writer_conflicts_with_reader(writer_ts: Timestamp, reader_tid: Tid, observed_version: Timestamp) -> bool {
    observed_version < writer_ts && writer_ts < reader_tid
}

/// Scan every recorded `(reader_tid, observed_version)` pair for a key and
/// return the first reader the writer conflicts with, if any.
///
/// Used identically by `before_put` and `before_delete` (spec §4.3: the
/// write-conflict scan is the same rule for both kinds of mutation).
pub fn find_conflicting_reader(
    writer_ts: Timestamp,
    readers: impl IntoIterator<Item = (Tid, Timestamp)>,
) -> Option<Tid> {
    readers
        .into_iter()
        .find(|&(reader_tid, observed_version)| {
            writer_conflicts_with_reader(writer_ts, reader_tid, observed_version)
        })
        .map(|(reader_tid, _)| reader_tid)
}
