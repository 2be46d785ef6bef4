//! Bounds generalizing over the opaque key and group-key types
//!
//! Spec §3 describes `Key` as "opaque, comparable, hashable" and `Group Key`
//! as a locality scope that is implicit for a single-group engine. Rather
//! than fixing a concrete key type, every `ordo-*` crate is generic over any
//! type satisfying [`KeyBound`] / [`GroupBound`]; hosts plug in their own key
//! representation (an HBase row key, a byte string, ...).

use std::fmt::Debug;
use std::hash::Hash;

/// Bound satisfied by any type usable as a key in the engine.
///
/// Blanket-implemented for every type that is already `Clone + Eq + Hash +
/// Ord + Debug + Send + Sync + 'static` — callers never need to implement it
/// by hand.
pub trait KeyBound: Clone + Eq + Hash + Ord + Debug + Send + Sync + 'static {}

impl<T> KeyBound for T where T: Clone + Eq + Hash + Ord + Debug + Send + Sync + 'static {}

/// Bound satisfied by any type usable as a locality-group scope.
///
/// A single-group engine instance uses `()` as its `GroupBound`, matching
/// spec §3's "within a single-group engine instance, Group Key is implicit".
pub trait GroupBound: Clone + Eq + Hash + Ord + Debug + Send + Sync + 'static {}

impl<T> GroupBound for T where T: Clone + Eq + Hash + Ord + Debug + Send + Sync + 'static {}

/// Bound satisfied by any type usable as a cell value.
///
/// The engine treats cell values as opaque payloads (spec §1: "it does not
/// deliver SQL semantics"); it never inspects or compares them.
pub trait ValueBound: Clone + Debug + Send + Sync + 'static {}

impl<T> ValueBound for T where T: Clone + Debug + Send + Sync + 'static {}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_key_bound<T: KeyBound>() {}
    fn assert_group_bound<T: GroupBound>() {}
    fn assert_value_bound<T: ValueBound>() {}

    #[test]
    fn common_types_satisfy_bounds() {
        assert_key_bound::<String>();
        assert_key_bound::<Vec<u8>>();
        assert_group_bound::<()>();
        assert_group_bound::<u64>();
        assert_value_bound::<Vec<u8>>();
    }
}
