//! The transaction state machine (spec §3)
//!
//! ```text
//! CREATED -> STARTED -> BLOCKED -> STARTED
//!         \          \-> COMMITTED -> FINALIZED
//!          \          \-> ABORTED  -> FINALIZED
//!           \-> (XA) JOINED -> PREPARED -> COMMITTED -> FINALIZED
//!                           \-> ABORTED -> FINALIZED
//! ```

use serde::{Deserialize, Serialize};

/// A transaction's position in its lifecycle (spec §3's state table).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TxnState {
    /// Allocated, not yet assigned a TID.
    Created,
    /// Active, holds a TID, may read/write.
    Started,
    /// Waiting for a read dependency (`readFrom`) to commit.
    Blocked,
    /// XA only: attached to a distributed TID.
    Joined,
    /// XA only: durably voted commit.
    Prepared,
    /// Wrote the log commit record; cleanup pending.
    Committed,
    /// Wrote the log abort record; versions being rolled back.
    Aborted,
    /// All mutations made visible or cleaned up; awaiting GC.
    Finalized,
}

impl TxnState {
    /// Whether `self -> next` is a legal transition per the spec §3 table.
    pub fn can_transition_to(self, next: TxnState) -> bool {
        use TxnState::*;
        matches!(
            (self, next),
            (Created, Started)
                | (Started, Blocked)
                | (Started, Committed)
                | (Started, Aborted)
                | (Started, Joined)
                | (Blocked, Started)
                | (Blocked, Aborted)
                | (Joined, Prepared)
                | (Joined, Aborted)
                | (Prepared, Committed)
                | (Prepared, Aborted)
                | (Committed, Finalized)
                | (Aborted, Finalized)
        )
    }

    /// Whether this is one of the two states a transaction's outcome is
    /// durably decided in (spec §3 invariant I1/I3 territory).
    pub fn is_decided(self) -> bool {
        matches!(self, TxnState::Committed | TxnState::Aborted)
    }

    /// Whether the transaction is still live and capable of reading/writing
    /// (spec §5's "active" notion).
    pub fn is_active(self) -> bool {
        matches!(self, TxnState::Started | TxnState::Blocked)
    }

    /// Whether the transaction is in a terminal-until-reclaim state.
    pub fn is_finalized(self) -> bool {
        matches!(self, TxnState::Finalized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use TxnState::*;

    #[test]
    fn legal_transitions_accepted() {
        assert!(Created.can_transition_to(Started));
        assert!(Started.can_transition_to(Blocked));
        assert!(Blocked.can_transition_to(Started));
        assert!(Started.can_transition_to(Committed));
        assert!(Started.can_transition_to(Aborted));
        assert!(Committed.can_transition_to(Finalized));
        assert!(Aborted.can_transition_to(Finalized));
        assert!(Started.can_transition_to(Joined));
        assert!(Joined.can_transition_to(Prepared));
        assert!(Prepared.can_transition_to(Committed));
        assert!(Joined.can_transition_to(Aborted));
        assert!(Prepared.can_transition_to(Aborted));
    }

    #[test]
    fn illegal_transitions_rejected() {
        assert!(!Created.can_transition_to(Committed));
        assert!(!Finalized.can_transition_to(Started));
        assert!(!Committed.can_transition_to(Aborted));
        assert!(!Aborted.can_transition_to(Committed));
    }

    #[test]
    fn helper_predicates() {
        assert!(Started.is_active());
        assert!(Blocked.is_active());
        assert!(!Committed.is_active());
        assert!(Committed.is_decided());
        assert!(Aborted.is_decided());
        assert!(!Started.is_decided());
        assert!(Finalized.is_finalized());
    }
}
