use ordo_core::{Timestamp, TimestampManager};
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};

/// Reference-counted, monotonic timestamp oracle (spec §2 component 1).
///
/// Timestamps are a plain counter; liveness is tracked separately in a
/// `BTreeSet` so the oldest live timestamp (the reclamation watermark) is a
/// cheap `first()` lookup. There is no background thread: reclamation
/// listeners fire synchronously from whichever `acquire`/`release` call
/// actually moves the watermark (spec's non-goal: "does not schedule
/// physical I/O").
pub struct LocalTimestampManager {
    next: AtomicU64,
    live: Mutex<BTreeSet<Timestamp>>,
    listeners: RwLock<Vec<Box<dyn Fn(Timestamp) + Send + Sync>>>,
    watermark: Mutex<Option<Timestamp>>,
}

impl Default for LocalTimestampManager {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalTimestampManager {
    /// An empty manager whose first issued timestamp is `1`.
    pub fn new() -> Self {
        LocalTimestampManager {
            next: AtomicU64::new(1),
            live: Mutex::new(BTreeSet::new()),
            listeners: RwLock::new(Vec::new()),
            watermark: Mutex::new(None),
        }
    }

    /// An empty manager whose first issued timestamp is one past
    /// `max_recovered`, so ids replayed from the durable log on restart
    /// can never collide with a freshly issued one.
    pub fn resuming_from(max_recovered: Timestamp) -> Self {
        LocalTimestampManager {
            next: AtomicU64::new(max_recovered.get() + 1),
            live: Mutex::new(BTreeSet::new()),
            listeners: RwLock::new(Vec::new()),
            watermark: Mutex::new(None),
        }
    }

    fn insert_live(&self, ts: Timestamp) {
        self.live.lock().insert(ts);
    }

    /// Recompute the oldest-live watermark and fire listeners if it advanced.
    ///
    /// The watermark is the greatest timestamp `w` such that no live
    /// timestamp is `<= w`: either one less than the oldest survivor, or (if
    /// nothing is live) the last timestamp ever issued.
    fn poll_reclaim(&self) {
        let live = self.live.lock();
        let candidate = match live.iter().next() {
            Some(oldest) if oldest.get() > 0 => Timestamp::new(oldest.get() - 1),
            Some(_) => return,
            None => {
                let issued = self.next.load(Ordering::SeqCst);
                if issued == 0 {
                    return;
                }
                Timestamp::new(issued - 1)
            }
        };
        drop(live);

        let mut watermark = self.watermark.lock();
        let advanced = match *watermark {
            Some(prev) => candidate > prev,
            None => true,
        };
        if !advanced {
            return;
        }
        *watermark = Some(candidate);
        drop(watermark);

        for listener in self.listeners.read().iter() {
            listener(candidate);
        }
    }
}

impl TimestampManager for LocalTimestampManager {
    fn acquire(&self) -> Timestamp {
        let raw = self.next.fetch_add(1, Ordering::SeqCst);
        let ts = Timestamp::new(raw);
        self.insert_live(ts);
        ts
    }

    fn release(&self, ts: Timestamp) {
        let removed = self.live.lock().remove(&ts);
        if !removed {
            tracing::trace!(?ts, "release of unknown or already-released timestamp ignored");
            return;
        }
        self.poll_reclaim();
    }

    fn is_held_by_caller(&self, ts: Timestamp) -> bool {
        self.live.lock().contains(&ts)
    }

    fn add_reclamation_listener(&self, listener: Box<dyn Fn(Timestamp) + Send + Sync>) {
        self.listeners.write().push(listener);
    }
}

// Held behind `Arc<dyn TimestampManager>` and called concurrently from
// every transaction thread, so it must stay thread-safe.
#[cfg(test)]
static_assertions::assert_impl_all!(LocalTimestampManager: Send, Sync);
