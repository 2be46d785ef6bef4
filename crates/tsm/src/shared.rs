use crate::local::LocalTimestampManager;
use dashmap::DashMap;
use ordo_core::{Error, PersistentRef, Result, SharedTimestampManager, Timestamp, TimestampManager};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

/// XA extension of [`LocalTimestampManager`] (spec §4.6, §6).
///
/// Adds persistent child references (one per enlisted participant) and the
/// durable 2PC decision record (`persist_references`), the protocol's point
/// of no return. Both are layered on top of the same live-set the base
/// manager already tracks: a shared TID is just a timestamp like any other
/// as far as reclamation is concerned.
pub struct SharedTimestampManagerImpl {
    inner: LocalTimestampManager,
    next_ref: AtomicU64,
    /// Live (unreleased) references per shared timestamp.
    references: DashMap<Timestamp, Vec<PersistentRef>>,
    /// Durable decision records: once a `ts` appears here, `persist_references`
    /// has returned `Ok` for it and the decision cannot be undone.
    persisted: DashMap<Timestamp, Vec<PersistentRef>>,
    /// One-shot `released` listeners, keyed by the shared TID they watch.
    timestamp_listeners: Mutex<DashMap<Timestamp, Vec<Box<dyn FnOnce() + Send>>>>,
}

impl Default for SharedTimestampManagerImpl {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedTimestampManagerImpl {
    /// An empty manager with no live shared transactions.
    pub fn new() -> Self {
        SharedTimestampManagerImpl {
            inner: LocalTimestampManager::new(),
            next_ref: AtomicU64::new(1),
            references: DashMap::new(),
            persisted: DashMap::new(),
            timestamp_listeners: Mutex::new(DashMap::new()),
        }
    }

    fn fire_released(&self, ts: Timestamp) {
        if let Some((_, listeners)) = self.timestamp_listeners.lock().remove(&ts) {
            for listener in listeners {
                listener();
            }
        }
    }
}

impl TimestampManager for SharedTimestampManagerImpl {
    fn acquire(&self) -> Timestamp {
        self.inner.acquire()
    }

    fn release(&self, ts: Timestamp) {
        self.inner.release(ts);
    }

    fn is_held_by_caller(&self, ts: Timestamp) -> bool {
        self.inner.is_held_by_caller(ts)
    }

    fn add_reclamation_listener(&self, listener: Box<dyn Fn(Timestamp) + Send + Sync>) {
        self.inner.add_reclamation_listener(listener);
    }
}

impl SharedTimestampManager for SharedTimestampManagerImpl {
    fn acquire_shared(&self) -> Timestamp {
        let ts = self.inner.acquire();
        self.references.insert(ts, Vec::new());
        ts
    }

    fn release_shared(&self, ts: Timestamp) {
        self.references.remove(&ts);
        self.persisted.remove(&ts);
        self.fire_released(ts);
        self.inner.release(ts);
    }

    fn acquire_reference(&self, ts: Timestamp) -> Result<PersistentRef> {
        if !self.inner.is_held_by_caller(ts) {
            return Err(Error::IllegalState(format!(
                "cannot join released shared timestamp {ts}"
            )));
        }
        let raw = self.next_ref.fetch_add(1, Ordering::SeqCst);
        let pid = PersistentRef::new(raw);
        self.references.entry(ts).or_default().push(pid);
        Ok(pid)
    }

    fn release_reference(&self, ts: Timestamp, pid: PersistentRef) {
        if let Some(mut refs) = self.references.get_mut(&ts) {
            refs.retain(|&held| held != pid);
        }
    }

    fn persist_references(&self, ts: Timestamp, pids: &[PersistentRef]) -> Result<()> {
        if !self.inner.is_held_by_caller(ts) {
            return Err(Error::IllegalState(format!(
                "cannot persist decision for released shared timestamp {ts}"
            )));
        }
        tracing::info!(%ts, count = pids.len(), "persisting 2PC decision (point of no return)");
        self.persisted.insert(ts, pids.to_vec());
        Ok(())
    }

    fn add_timestamp_listener(&self, ts: Timestamp, listener: Box<dyn FnOnce() + Send>) {
        self.timestamp_listeners
            .lock()
            .entry(ts)
            .or_default()
            .push(listener);
    }
}

// Held behind `Arc<dyn SharedTimestampManager>` and shared between the
// coordinator thread and every enlisted participant's thread.
#[cfg(test)]
static_assertions::assert_impl_all!(SharedTimestampManagerImpl: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    #[test]
    fn acquire_reference_requires_a_live_shared_timestamp() {
        let tsm = SharedTimestampManagerImpl::new();
        let ts = tsm.acquire_shared();
        let pid = tsm.acquire_reference(ts).expect("live ts accepts joins");
        assert_ne!(pid, PersistentRef::new(0));
    }

    #[test]
    fn acquire_reference_rejects_released_timestamp() {
        let tsm = SharedTimestampManagerImpl::new();
        let ts = tsm.acquire_shared();
        tsm.release_shared(ts);
        assert!(tsm.acquire_reference(ts).is_err());
    }

    #[test]
    fn released_listener_fires_on_release_shared() {
        let tsm = SharedTimestampManagerImpl::new();
        let ts = tsm.acquire_shared();
        let fired = Arc::new(AtomicBool::new(false));
        let fired2 = Arc::clone(&fired);
        tsm.add_timestamp_listener(ts, Box::new(move || fired2.store(true, Ordering::SeqCst)));
        tsm.release_shared(ts);
        assert!(fired.load(Ordering::SeqCst));
    }

    #[test]
    fn persist_references_is_the_point_of_no_return() {
        let tsm = SharedTimestampManagerImpl::new();
        let ts = tsm.acquire_shared();
        let pid = tsm.acquire_reference(ts).unwrap();
        tsm.persist_references(ts, &[pid]).unwrap();
        assert!(tsm.persisted.contains_key(&ts));
    }

    #[test]
    fn persist_references_rejects_released_timestamp() {
        let tsm = SharedTimestampManagerImpl::new();
        let ts = tsm.acquire_shared();
        tsm.release_shared(ts);
        assert!(tsm.persist_references(ts, &[]).is_err());
    }
}
