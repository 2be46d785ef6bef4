//! Property-based coverage for the 2PC atomicity property spec §8 names
//! (P6): once `persist_references` has succeeded, every enlisted
//! participant must eventually commit, no matter how many times its
//! acknowledgement is transiently lost along the way.

use ordo_core::{KvStore, PersistentRef, Result, Sid, Tid, Timestamp, TransactionLog, TxnState, Xid};
use ordo_kvs::InMemoryKvStore;
use ordo_tsm::SharedTimestampManagerImpl;
use ordo_xa::{Coordinator, Participant, XaPolicy, XaTransactionManager};
use proptest::prelude::*;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

struct VecLog;
impl TransactionLog<String> for VecLog {
    fn append_state_transition(&mut self, _tid: Tid, _state: TxnState) -> Result<Sid> {
        Ok(Sid::ZERO)
    }
    fn append_get(&mut self, _tid: Tid, _key: String, _version: Timestamp) -> Result<Sid> {
        Ok(Sid::ZERO)
    }
    fn append_put(&mut self, _tid: Tid, _key: String) -> Result<Sid> {
        Ok(Sid::ZERO)
    }
    fn append_delete(&mut self, _tid: Tid, _key: String) -> Result<Sid> {
        Ok(Sid::ZERO)
    }
    fn append_joined(&mut self, _tid: Tid, _pid: PersistentRef) -> Result<Sid> {
        Ok(Sid::ZERO)
    }
    fn truncate(&mut self, _sid: Sid) -> Result<()> {
        Ok(())
    }
    fn recover(&self) -> Result<Box<dyn Iterator<Item = Result<ordo_core::LogRecord<String>>> + '_>> {
        Ok(Box::new(std::iter::empty()))
    }
}

fn participant(shared_tsm: &Arc<dyn ordo_core::SharedTimestampManager>) -> Arc<XaTransactionManager<String, u32>> {
    let store: Arc<dyn KvStore<String, u32>> = Arc::new(InMemoryKvStore::new());
    let manager = Arc::new(ordo_concurrency::TransactionManager::new(
        store,
        Box::new(VecLog),
        Arc::clone(shared_tsm) as Arc<dyn ordo_core::TimestampManager>,
        Arc::new(XaPolicy),
    ));
    Arc::new(XaTransactionManager::new(manager, Arc::clone(shared_tsm)))
}

/// Wraps a real participant and drops its first `fail_count` `commit` calls
/// with a transient error before delegating, modeling a flaky acknowledgement
/// channel the coordinator's `commit_all` retry loop must ride out.
struct FlakyParticipant {
    inner: Arc<XaTransactionManager<String, u32>>,
    remaining_failures: AtomicU32,
}

impl FlakyParticipant {
    fn new(inner: Arc<XaTransactionManager<String, u32>>, fail_count: u32) -> Self {
        FlakyParticipant {
            inner,
            remaining_failures: AtomicU32::new(fail_count),
        }
    }
}

impl Participant for FlakyParticipant {
    fn join(&self, tid: Tid) -> Result<Xid> {
        self.inner.join(tid)
    }

    fn prepare(&self, xid: Xid) -> Result<()> {
        self.inner.prepare(xid)
    }

    fn commit(&self, xid: Xid, one_phase: bool) -> Result<()> {
        if self.remaining_failures.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| (n > 0).then_some(n - 1)).is_ok() {
            return Err(ordo_core::Error::IllegalState("transient commit ack loss".to_string()));
        }
        self.inner.commit(xid, one_phase)
    }

    fn abort(&self, xid: Xid) -> Result<()> {
        self.inner.abort(xid)
    }
}

proptest! {
    /// (P6) As long as a participant's commit acknowledgement fails fewer
    /// times than the coordinator's retry budget, `commit_all` still drives
    /// every participant to `Committed` — the point of no return, once
    /// crossed by `persist_references`, cannot leave a participant stranded
    /// by a merely transient failure.
    #[test]
    fn commit_all_rides_out_transient_ack_failures_under_the_retry_budget(fail_count in 0u32..7) {
        let shared_tsm: Arc<dyn ordo_core::SharedTimestampManager> = Arc::new(SharedTimestampManagerImpl::new());
        let p1 = participant(&shared_tsm);
        let p2 = participant(&shared_tsm);
        let flaky = Arc::new(FlakyParticipant::new(Arc::clone(&p2), fail_count));

        let mut coordinator = Coordinator::begin(Arc::clone(&shared_tsm));
        let xid1 = coordinator.enlist(p1.clone()).unwrap();
        let xid2 = coordinator.enlist(flaky.clone()).unwrap();

        p1.manager().read(xid1.tid, &["k".to_string()]).unwrap();
        p1.manager().write(xid1.tid, "k".to_string(), 1).unwrap();
        p2.manager().read(xid2.tid, &["k".to_string()]).unwrap();
        p2.manager().write(xid2.tid, "k".to_string(), 2).unwrap();

        coordinator.prepare_all().unwrap();
        coordinator.commit_all().unwrap();

        prop_assert_eq!(p1.manager().get(xid1.tid).unwrap().state(), TxnState::Committed);
        prop_assert_eq!(p2.manager().get(xid2.tid).unwrap().state(), TxnState::Committed);
    }
}
