use ordo_core::{Timestamp, ValueBound};
use std::collections::VecDeque;

/// A single key's version history, newest first (spec §4.1: a key maps to a
/// set of versioned cells; deleting a version physically removes its entry
/// rather than leaving an MVCC tombstone — the adapter has no notion of
/// "deleted but still visible to older readers" beyond what remains in the
/// chain).
///
/// Grounded on the teacher's `VersionChain`: a `VecDeque` in newest-first
/// order gives O(1) insertion of the common case (a new write is always the
/// newest version) and an early-exit linear scan for `get_at_or_below`.
#[derive(Debug, Clone)]
pub struct VersionChain<V> {
    versions: VecDeque<(Timestamp, V)>,
}

impl<V: ValueBound> VersionChain<V> {
    /// A chain holding a single version.
    pub fn new(ts: Timestamp, value: V) -> Self {
        let mut versions = VecDeque::with_capacity(4);
        versions.push_front((ts, value));
        VersionChain { versions }
    }

    /// Record a new version. Callers must only ever push a `ts` newer than
    /// every version already present (spec §4.1: writes are monotone in TID).
    pub fn push(&mut self, ts: Timestamp, value: V) {
        self.versions.push_front((ts, value));
    }

    /// The newest version with `version <= bound`, if any (spec §4.3 rule 1:
    /// "a reader sees the greatest version at or below its TID").
    pub fn get_at_or_below(&self, bound: Timestamp) -> Option<(Timestamp, &V)> {
        self.versions.iter().find(|(ts, _)| *ts <= bound).map(|(ts, v)| (*ts, v))
    }

    /// Remove every version with `version <= bound`, oldest-first (spec
    /// §4.1, §4.4).
    ///
    /// Returns the number of versions actually removed.
    pub fn prune_at_or_below(&mut self, bound: Timestamp) -> usize {
        let mut removed = 0;
        while let Some((ts, _)) = self.versions.back() {
            if *ts > bound {
                break;
            }
            self.versions.pop_back();
            removed += 1;
        }
        removed
    }

    /// Remove one exact version, regardless of position. Idempotent: a
    /// missing version is not an error (spec §4.1, §7).
    pub fn remove_exact(&mut self, ts: Timestamp) {
        self.versions.retain(|(v, _)| *v != ts);
    }

    /// Whether this chain has no versions left (safe to drop the key entry).
    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_at_or_below_returns_newest_matching() {
        let mut chain = VersionChain::new(Timestamp::new(1), 10u32);
        chain.push(Timestamp::new(5), 20);
        chain.push(Timestamp::new(9), 30);

        assert_eq!(chain.get_at_or_below(Timestamp::new(7)), Some((Timestamp::new(5), &20)));
        assert_eq!(chain.get_at_or_below(Timestamp::new(0)), None);
    }

    #[test]
    fn prune_removes_oldest_first_up_to_bound() {
        let mut chain = VersionChain::new(Timestamp::new(1), 1u32);
        chain.push(Timestamp::new(2), 2);
        chain.push(Timestamp::new(3), 3);

        let removed = chain.prune_at_or_below(Timestamp::new(2));
        assert_eq!(removed, 2);
        assert_eq!(chain.get_at_or_below(Timestamp::new(10)), Some((Timestamp::new(3), &3)));
    }

    #[test]
    fn remove_exact_is_idempotent() {
        let mut chain = VersionChain::new(Timestamp::new(1), 1u32);
        chain.remove_exact(Timestamp::new(99));
        chain.remove_exact(Timestamp::new(1));
        chain.remove_exact(Timestamp::new(1));
        assert!(chain.is_empty());
    }
}
