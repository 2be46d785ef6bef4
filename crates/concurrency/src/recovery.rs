//! Crash recovery (spec §4.5).
//!
//! Replay does not re-run conflict detection: it classifies each
//! transaction's final state from its own log records, then resolves the
//! ones recovery finds mid-flight (`Started`/`Blocked`) using the
//! Timestamp Manager's liveness as the tiebreaker. Single-threaded, since
//! recovery runs before the engine accepts any concurrent traffic.
//!
//! Grounded on the teacher's `RecoveryCoordinator`/`RecoveryResult`/
//! `RecoveryStats` shape; the per-transaction classification logic itself
//! has no OCC counterpart and is built directly from spec §4.5's prose.

use crate::transaction::Transaction;
use ordo_core::{KeyBound, LogRecordBody, Tid, TimestampManager, TransactionLog, TxnState};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Coordinates replay of a single group's durable log at startup.
pub struct RecoveryCoordinator<'a, K: KeyBound> {
    log: &'a dyn TransactionLog<K>,
    tsm: &'a dyn TimestampManager,
}

impl<'a, K: KeyBound> RecoveryCoordinator<'a, K> {
    /// Build a coordinator over the log to replay and the TSM whose
    /// liveness decides the fate of transactions recovery finds mid-flight.
    pub fn new(log: &'a dyn TransactionLog<K>, tsm: &'a dyn TimestampManager) -> Self {
        RecoveryCoordinator { log, tsm }
    }

    /// Replay every surviving record, oldest first, and return the
    /// reconstructed transaction directory plus statistics.
    ///
    /// Spec §4.5: group records by TID, take the transaction's *last*
    /// recorded `StateTransition` as its recovered state, then resolve:
    /// - `Committed`/`Finalized` with no trailing `Finalized`: re-append
    ///   `Finalized` (a crash between `Committed` and `Finalized` leaves the
    ///   outcome durable, only cleanup pending).
    /// - `Aborted` with no trailing `Finalized`: same, `Finalized` is purely
    ///   cleanup of an already-durable decision.
    /// - `Started`/`Blocked` and still held by the Timestamp Manager: the
    ///   manager crashed before releasing it, but some other process could
    ///   still be that transaction's owner (the spec folds this into "still
    ///   live, leave it active" since recovery on a single-process engine
    ///   cannot observe liveness any more precisely than that).
    /// - `Started`/`Blocked` and not held: stale, abort it — its outcome was
    ///   never recorded, so it cannot have committed (spec §7's `Io` during
    ///   `append(COMMITTED)` case never reaches this far).
    pub fn recover(&self) -> ordo_core::Result<RecoveryResult<K>> {
        let mut by_tid: BTreeMap<Tid, Vec<ordo_core::LogRecord<K>>> = BTreeMap::new();
        let mut stats = RecoveryStats::default();

        for record in self.log.recover()? {
            let record = record?;
            stats.records_replayed += 1;
            by_tid.entry(record.tid).or_default().push(record);
        }

        let mut transactions = BTreeMap::new();
        for (tid, records) in by_tid {
            let txn = Arc::new(Transaction::<K>::new(tid));
            let mut last_state = TxnState::Created;

            for record in &records {
                match &record.body {
                    LogRecordBody::StateTransition { state } => {
                        last_state = *state;
                    }
                    LogRecordBody::Get { key, version } => {
                        txn.record_read(key.clone(), *version);
                    }
                    LogRecordBody::Put { key } => {
                        txn.record_mutation(key.clone(), false);
                    }
                    LogRecordBody::Delete { key } => {
                        txn.record_mutation(key.clone(), true);
                    }
                    LogRecordBody::Joined { .. } => {}
                }
            }

            let resolved = match last_state {
                TxnState::Created => {
                    // A tid with log records but no `Started` transition
                    // ever durable is a logging bug, not a recoverable
                    // state (spec §4.5 step 5: "CREATED in log is a bug ->
                    // fail startup").
                    return Err(ordo_core::Error::IllegalState(format!(
                        "recovered transaction {tid} never reached Started"
                    )));
                }
                TxnState::Committed => {
                    txn.transition(TxnState::Committed);
                    txn.transition(TxnState::Finalized);
                    stats.committed += 1;
                    TxnState::Finalized
                }
                TxnState::Aborted => {
                    txn.transition(TxnState::Aborted);
                    txn.transition(TxnState::Finalized);
                    stats.aborted += 1;
                    TxnState::Finalized
                }
                TxnState::Finalized => {
                    stats.finalized_already += 1;
                    TxnState::Finalized
                }
                TxnState::Started | TxnState::Blocked => {
                    if self.tsm.is_held_by_caller(tid) {
                        stats.left_active += 1;
                        last_state
                    } else {
                        txn.transition(TxnState::Aborted);
                        txn.transition(TxnState::Finalized);
                        stats.stale_aborted += 1;
                        TxnState::Finalized
                    }
                }
                other => {
                    // JOINED/PREPARED belong to ordo-xa's own recovery path;
                    // a plain-MVTO log never produces them.
                    stats.left_active += 1;
                    other
                }
            };

            stats.max_tid = stats.max_tid.max(tid);
            transactions.insert(tid, (txn, resolved));
        }

        Ok(RecoveryResult { transactions, stats })
    }
}

/// The reconstructed directory and statistics from a completed replay.
pub struct RecoveryResult<K: KeyBound> {
    /// Every transaction found in the log, with its resolved terminal (or
    /// still-active) state.
    pub transactions: BTreeMap<Tid, (Arc<Transaction<K>>, TxnState)>,
    /// Counters describing what recovery did.
    pub stats: RecoveryStats,
}

impl<K: KeyBound> RecoveryResult<K> {
    /// Transactions recovery left active (`Started`/`Blocked`) because the
    /// Timestamp Manager still holds their TID live.
    pub fn still_active(&self) -> Vec<Tid> {
        self.transactions
            .iter()
            .filter(|(_, (_, state))| state.is_active())
            .map(|(tid, _)| *tid)
            .collect()
    }
}

/// Statistics from a single recovery pass (spec §4.5, §6 observability).
///
/// Grounded on the teacher's `RecoveryStats`; the fields themselves are
/// MVTO's five resolution outcomes rather than the teacher's write/delete
/// counts, since replay here reconstructs transaction state rather than
/// reapplying a single committed writeset per record.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryStats {
    /// Total durable records read from the log.
    pub records_replayed: usize,
    /// Transactions resolved as committed (whether or not `Finalized` had
    /// already been durably appended).
    pub committed: usize,
    /// Transactions resolved as aborted.
    pub aborted: usize,
    /// Transactions whose log already ended in `Finalized`.
    pub finalized_already: usize,
    /// `Started`/`Blocked` transactions aborted as stale (TSM no longer
    /// holds their TID live).
    pub stale_aborted: usize,
    /// `Started`/`Blocked` transactions left active (TSM still holds their
    /// TID live).
    pub left_active: usize,
    /// The greatest TID observed in the log, used to seed a restarted
    /// Timestamp Manager so newly issued TIDs never collide with recovered
    /// ones.
    pub max_tid: Tid,
}

impl RecoveryStats {
    /// Total transactions this pass classified, decided or not.
    pub fn total_transactions(&self) -> usize {
        self.committed + self.aborted + self.finalized_already + self.stale_aborted + self.left_active
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ordo_core::{PersistentRef, Sid, Timestamp};
    use ordo_tsm::LocalTimestampManager;

    struct FixedLog {
        records: Vec<ordo_core::LogRecord<String>>,
    }

    impl TransactionLog<String> for FixedLog {
        fn append_state_transition(&mut self, _tid: Tid, _state: TxnState) -> ordo_core::Result<Sid> {
            Ok(Sid::ZERO)
        }
        fn append_get(&mut self, _tid: Tid, _key: String, _version: Timestamp) -> ordo_core::Result<Sid> {
            Ok(Sid::ZERO)
        }
        fn append_put(&mut self, _tid: Tid, _key: String) -> ordo_core::Result<Sid> {
            Ok(Sid::ZERO)
        }
        fn append_delete(&mut self, _tid: Tid, _key: String) -> ordo_core::Result<Sid> {
            Ok(Sid::ZERO)
        }
        fn append_joined(&mut self, _tid: Tid, _pid: PersistentRef) -> ordo_core::Result<Sid> {
            Ok(Sid::ZERO)
        }
        fn truncate(&mut self, _sid: Sid) -> ordo_core::Result<()> {
            Ok(())
        }
        fn recover(&self) -> ordo_core::Result<Box<dyn Iterator<Item = ordo_core::Result<ordo_core::LogRecord<String>>> + '_>> {
            Ok(Box::new(self.records.iter().cloned().map(Ok)))
        }
    }

    fn rec(sid: u64, tid: u64, body: LogRecordBody<String>) -> ordo_core::LogRecord<String> {
        ordo_core::LogRecord {
            sid: Sid::new(sid),
            tid: Timestamp::new(tid),
            body,
        }
    }

    #[test]
    fn committed_transaction_is_finalized_on_replay() {
        let log = FixedLog {
            records: vec![
                rec(1, 1, LogRecordBody::StateTransition { state: TxnState::Started }),
                rec(2, 1, LogRecordBody::Put { key: "k".into() }),
                rec(3, 1, LogRecordBody::StateTransition { state: TxnState::Committed }),
            ],
        };
        let tsm = LocalTimestampManager::new();
        let result = RecoveryCoordinator::new(&log, &tsm).recover().unwrap();
        let (_, state) = result.transactions.get(&Timestamp::new(1)).unwrap();
        assert_eq!(*state, TxnState::Finalized);
        assert_eq!(result.stats.committed, 1);
    }

    #[test]
    fn stale_started_transaction_not_held_by_tsm_is_aborted() {
        let log = FixedLog {
            records: vec![rec(1, 1, LogRecordBody::StateTransition { state: TxnState::Started })],
        };
        let tsm = LocalTimestampManager::new();
        let result = RecoveryCoordinator::new(&log, &tsm).recover().unwrap();
        let (_, state) = result.transactions.get(&Timestamp::new(1)).unwrap();
        assert_eq!(*state, TxnState::Finalized);
        assert_eq!(result.stats.stale_aborted, 1);
    }

    #[test]
    fn started_transaction_still_held_by_tsm_is_left_active() {
        let log = FixedLog {
            records: vec![rec(1, 1, LogRecordBody::StateTransition { state: TxnState::Started })],
        };
        let tsm = LocalTimestampManager::new();
        let held_tid = tsm.acquire();
        assert_eq!(held_tid, Timestamp::new(1));
        let result = RecoveryCoordinator::new(&log, &tsm).recover().unwrap();
        assert_eq!(result.still_active(), vec![Timestamp::new(1)]);
        assert_eq!(result.stats.left_active, 1);
    }

    #[test]
    fn already_finalized_transaction_is_not_recounted_as_committed() {
        let log = FixedLog {
            records: vec![
                rec(1, 1, LogRecordBody::StateTransition { state: TxnState::Started }),
                rec(2, 1, LogRecordBody::StateTransition { state: TxnState::Committed }),
                rec(3, 1, LogRecordBody::StateTransition { state: TxnState::Finalized }),
            ],
        };
        let tsm = LocalTimestampManager::new();
        let result = RecoveryCoordinator::new(&log, &tsm).recover().unwrap();
        assert_eq!(result.stats.finalized_already, 1);
        assert_eq!(result.stats.committed, 0);
    }
}
