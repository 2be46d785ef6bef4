//! A single group's local 2PC participant (spec §4.6).
//!
//! Wraps an `ordo_concurrency::TransactionManager` (constructed with
//! [`crate::XaPolicy`]) and a [`SharedTimestampManager`], adding exactly
//! the bookkeeping the base manager cannot do on its own: acquiring and
//! releasing the persistent child reference, and reacting to the TSM's
//! `released` signal by aborting unilaterally while still `Joined`.

use crate::participant::Participant;
use ordo_concurrency::TransactionManager;
use ordo_core::{Error, KeyBound, Result, SharedTimestampManager, Tid, TxnState, ValueBound, Xid};
use std::sync::Arc;

/// One group's local participant in a distributed transaction.
pub struct XaTransactionManager<K, V> {
    manager: Arc<TransactionManager<K, V>>,
    shared_tsm: Arc<dyn SharedTimestampManager>,
}

impl<K: KeyBound, V: ValueBound> XaTransactionManager<K, V> {
    /// Wrap `manager` (built with [`crate::XaPolicy`]) and `shared_tsm` into
    /// a 2PC participant.
    pub fn new(manager: Arc<TransactionManager<K, V>>, shared_tsm: Arc<dyn SharedTimestampManager>) -> Self {
        XaTransactionManager { manager, shared_tsm }
    }

    /// The wrapped local transaction manager, for issuing ordinary
    /// reads/writes/deletes against a joined transaction's TID exactly as
    /// a non-distributed caller would.
    pub fn manager(&self) -> &Arc<TransactionManager<K, V>> {
        &self.manager
    }
}

impl<K: KeyBound, V: ValueBound> Participant for XaTransactionManager<K, V> {
    fn join(&self, tid: Tid) -> Result<Xid> {
        self.manager.begin_with_tid(tid)?;
        let pid = self.shared_tsm.acquire_reference(tid)?;
        if let Err(err) = self.manager.join(tid, pid) {
            self.shared_tsm.release_reference(tid, pid);
            return Err(err);
        }

        let manager = Arc::clone(&self.manager);
        self.shared_tsm.add_timestamp_listener(
            tid,
            Box::new(move || {
                if let Ok(txn) = manager.get(tid) {
                    if txn.state() == TxnState::Joined {
                        tracing::warn!(%tid, "coordinator's TID released before prepare; aborting unilaterally");
                        let _ = manager.abort(tid);
                    }
                }
            }),
        );

        Ok(Xid::new(tid, pid))
    }

    fn prepare(&self, xid: Xid) -> Result<()> {
        self.manager.prepare(xid.tid)
    }

    fn commit(&self, xid: Xid, one_phase: bool) -> Result<()> {
        let txn = self.manager.get(xid.tid)?;
        let expected = if one_phase { TxnState::Started } else { TxnState::Prepared };
        if txn.state() != expected {
            return Err(Error::IllegalState(format!(
                "commit(one_phase={one_phase}) on {} requires state {expected:?}, found {:?}",
                xid,
                txn.state()
            )));
        }
        self.manager.commit(xid.tid)?;
        self.shared_tsm.release_reference(xid.tid, xid.pid);
        Ok(())
    }

    fn abort(&self, xid: Xid) -> Result<()> {
        self.manager.abort(xid.tid)?;
        self.shared_tsm.release_reference(xid.tid, xid.pid);
        Ok(())
    }
}
