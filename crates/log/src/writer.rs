use crate::config::WalConfig;
use crate::segment::{list_segment_numbers, read_segment_records, WalSegment};
use ordo_core::{
    Error, KeyBound, LogRecord, LogRecordBody, PersistentRef, Result, Sid, Tid, Timestamp,
    TransactionLog, TxnState,
};
use serde::de::DeserializeOwned;
use std::collections::VecDeque;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};

/// Append/sync counters exposed for observability, grounded on the
/// teacher's `WalCounters` (itself an `AtomicU64`-per-metric struct handed
/// out alongside the writer).
#[derive(Debug, Default)]
pub struct WalCounters {
    /// Total records appended since this log was opened.
    pub appended: AtomicU64,
    /// Total fsync calls issued since this log was opened.
    pub synced: AtomicU64,
    /// Total segment rotations since this log was opened.
    pub rotations: AtomicU64,
}

impl WalCounters {
    fn bump_appended(&self) {
        self.appended.fetch_add(1, Ordering::Relaxed);
    }
    fn bump_synced(&self) {
        self.synced.fetch_add(1, Ordering::Relaxed);
    }
    fn bump_rotations(&self) {
        self.rotations.fetch_add(1, Ordering::Relaxed);
    }
}

struct SegmentSpan {
    number: u64,
    max_sid: Sid,
}

/// A durable, segmented, per-group [`TransactionLog`] (spec §2 component 2,
/// §4.2).
///
/// Every `append_*` call fsyncs the active segment before returning;
/// `truncate` deletes whole segment files once every record in them has a
/// `sid <= sid`, and `recover` replays every surviving record, oldest first,
/// across every remaining segment in order.
pub struct SegmentedLog<K> {
    config: WalConfig,
    active: WalSegment,
    spans: VecDeque<SegmentSpan>,
    next_sid: u64,
    counters: WalCounters,
    _key: PhantomData<fn(K)>,
}

impl<K> SegmentedLog<K>
where
    K: KeyBound + serde::Serialize + DeserializeOwned,
{
    /// Open (or create) the segmented log at `config`'s directory.
    pub fn open(config: WalConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| Error::IllegalState(e.to_string()))?;
        std::fs::create_dir_all(config.directory())?;

        let numbers = list_segment_numbers(config.directory())?;
        let mut spans = VecDeque::new();
        let mut next_sid = 0u64;

        for &number in &numbers {
            let file = WalSegment::open_read(config.directory(), number)?;
            let records = read_segment_records(file)?;
            let mut max_sid = Sid::ZERO;
            for raw in &records {
                if let Ok(record) = rmp_serde::from_slice::<LogRecord<K>>(raw) {
                    if record.sid.get() + 1 > next_sid {
                        next_sid = record.sid.get() + 1;
                    }
                    max_sid = max_sid.max(record.sid);
                }
            }
            spans.push_back(SegmentSpan { number, max_sid });
        }

        let active = match numbers.last() {
            Some(&number) => match WalSegment::open_append(config.directory(), number) {
                Ok(seg) => seg,
                Err(_) => {
                    let new_number = number + 1;
                    spans.push_back(SegmentSpan {
                        number: new_number,
                        max_sid: Sid::ZERO,
                    });
                    WalSegment::create(config.directory(), new_number)?
                }
            },
            None => {
                spans.push_back(SegmentSpan {
                    number: 1,
                    max_sid: Sid::ZERO,
                });
                WalSegment::create(config.directory(), 1)?
            }
        };

        Ok(SegmentedLog {
            config,
            active,
            spans,
            next_sid,
            counters: WalCounters::default(),
            _key: PhantomData,
        })
    }

    /// Append/sync counters for this log instance.
    pub fn counters(&self) -> &WalCounters {
        &self.counters
    }

    fn next_sid(&mut self) -> Sid {
        let sid = Sid::new(self.next_sid);
        self.next_sid += 1;
        sid
    }

    fn rotate_if_needed(&mut self, incoming_len: u64) -> Result<()> {
        if self.active.size() + incoming_len <= self.config.segment_size_bytes() {
            return Ok(());
        }
        let next_number = self.active.number() + 1;
        let new_segment = WalSegment::create(self.config.directory(), next_number)?;
        self.active = new_segment;
        self.spans.push_back(SegmentSpan {
            number: next_number,
            max_sid: Sid::ZERO,
        });
        self.counters.bump_rotations();
        Ok(())
    }

    fn append(&mut self, record: LogRecord<K>) -> Result<Sid> {
        let sid = record.sid;
        let payload = rmp_serde::to_vec(&record).map_err(|e| Error::IllegalState(e.to_string()))?;
        self.rotate_if_needed(payload.len() as u64 + 8)?;
        self.active.append(&payload)?;
        self.active.sync()?;
        self.counters.bump_appended();
        self.counters.bump_synced();
        if let Some(span) = self.spans.back_mut() {
            span.max_sid = span.max_sid.max(sid);
        }
        Ok(sid)
    }
}

impl<K> TransactionLog<K> for SegmentedLog<K>
where
    K: KeyBound + serde::Serialize + DeserializeOwned,
{
    fn append_state_transition(&mut self, tid: Tid, state: TxnState) -> Result<Sid> {
        let sid = self.next_sid();
        self.append(LogRecord {
            sid,
            tid,
            body: LogRecordBody::StateTransition { state },
        })
    }

    fn append_get(&mut self, tid: Tid, key: K, version: Timestamp) -> Result<Sid> {
        let sid = self.next_sid();
        self.append(LogRecord {
            sid,
            tid,
            body: LogRecordBody::Get { key, version },
        })
    }

    fn append_put(&mut self, tid: Tid, key: K) -> Result<Sid> {
        let sid = self.next_sid();
        self.append(LogRecord {
            sid,
            tid,
            body: LogRecordBody::Put { key },
        })
    }

    fn append_delete(&mut self, tid: Tid, key: K) -> Result<Sid> {
        let sid = self.next_sid();
        self.append(LogRecord {
            sid,
            tid,
            body: LogRecordBody::Delete { key },
        })
    }

    fn append_joined(&mut self, tid: Tid, pid: PersistentRef) -> Result<Sid> {
        let sid = self.next_sid();
        self.append(LogRecord {
            sid,
            tid,
            body: LogRecordBody::Joined { pid },
        })
    }

    fn truncate(&mut self, sid: Sid) -> Result<()> {
        while let Some(span) = self.spans.front() {
            if span.max_sid > sid || self.spans.len() == 1 {
                break;
            }
            let number = span.number;
            self.spans.pop_front();
            let file_path = self.config.directory().join(format!("log-{number:020}.seg"));
            if file_path.exists() {
                std::fs::remove_file(&file_path)?;
            }
            tracing::debug!(segment = number, "truncated log segment");
        }
        Ok(())
    }

    fn recover(&self) -> Result<Box<dyn Iterator<Item = Result<LogRecord<K>>> + '_>> {
        let mut numbers = list_segment_numbers(self.config.directory())?;
        numbers.sort_unstable();
        let dir = self.config.directory().to_path_buf();

        let mut all_records = Vec::new();
        for number in numbers {
            let file = WalSegment::open_read(&dir, number)?;
            let raws = read_segment_records(file)?;
            for raw in raws {
                let record = rmp_serde::from_slice::<LogRecord<K>>(&raw)
                    .map_err(|e| Error::IllegalState(e.to_string()));
                all_records.push(record);
            }
        }
        all_records.sort_by(|a, b| match (a, b) {
            (Ok(a), Ok(b)) => a.sid.cmp(&b.sid),
            _ => std::cmp::Ordering::Equal,
        });
        Ok(Box::new(all_records.into_iter()))
    }
}
