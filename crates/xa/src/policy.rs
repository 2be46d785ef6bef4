//! The XA commit policy (spec §4.6, §9).
//!
//! Spec §9: "model as a sum-type on transaction state plus a policy object
//! ... The base policy rejects `prepare`; the XA policy provides it."
//! [`XaPolicy`] is that policy object, plugged into an
//! `ordo_concurrency::TransactionManager` the same way `BasicPolicy` is,
//! so the manager's `commit` path needs no XA-specific branching of its
//! own — only `allows_commit_from` changes shape.

use ordo_core::{CommitPolicy, TxnState};

/// Commit policy for transactions that may join a distributed 2PC
/// (spec §4.6): `commit` is legal from `Prepared` (normal 2PC) as well as
/// from `Started` (the `onePhase` degenerate case, spec §4.6 `commit`).
#[derive(Debug, Clone, Copy, Default)]
pub struct XaPolicy;

impl CommitPolicy for XaPolicy {
    fn allows_commit_from(&self, state: TxnState) -> bool {
        matches!(state, TxnState::Started | TxnState::Prepared)
    }

    fn allows_join(&self) -> bool {
        true
    }

    fn allows_prepare(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn xa_policy_allows_join_and_prepare() {
        let policy = XaPolicy;
        assert!(policy.allows_join());
        assert!(policy.allows_prepare());
    }

    #[test]
    fn xa_policy_allows_commit_from_started_or_prepared() {
        let policy = XaPolicy;
        assert!(policy.allows_commit_from(TxnState::Started));
        assert!(policy.allows_commit_from(TxnState::Prepared));
        assert!(!policy.allows_commit_from(TxnState::Joined));
    }
}
