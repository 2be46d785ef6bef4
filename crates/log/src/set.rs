use crate::config::WalConfig;
use crate::writer::SegmentedLog;
use ordo_core::{Error, GroupBound, KeyBound, Result};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::path::PathBuf;

/// One [`SegmentedLog`] per transaction group (spec §4.2: "one log per
/// group; cross-group transactions write to each participant's own log").
///
/// Groups are opened lazily on first use and cached for the lifetime of the
/// `LogSet`.
pub struct LogSet<G, K> {
    root: PathBuf,
    segment_size_bytes: u64,
    logs: Mutex<HashMap<G, SegmentedLog<K>>>,
}

impl<G, K> LogSet<G, K>
where
    G: GroupBound,
    K: KeyBound + serde::Serialize + DeserializeOwned,
{
    /// A log set rooted at `root`, one subdirectory per group.
    pub fn new(root: impl Into<PathBuf>, segment_size_bytes: u64) -> Self {
        LogSet {
            root: root.into(),
            segment_size_bytes,
            logs: Mutex::new(HashMap::new()),
        }
    }

    /// Run `f` against the log for `group`, opening it on first use.
    pub fn with_log<R>(
        &self,
        group: &G,
        f: impl FnOnce(&mut SegmentedLog<K>) -> Result<R>,
    ) -> Result<R> {
        let mut logs = self.logs.lock();
        if !logs.contains_key(group) {
            let dir = self.root.join(format!("{group:?}"));
            let config = WalConfig::new()
                .with_directory(dir)
                .with_segment_size_bytes(self.segment_size_bytes);
            let log = SegmentedLog::open(config).map_err(|e| match e {
                Error::Io(msg) => Error::Io(msg),
                other => other,
            })?;
            logs.insert(group.clone(), log);
        }
        let log = logs.get_mut(group).expect("just inserted");
        f(log)
    }

    /// The set of groups opened so far.
    pub fn known_groups(&self) -> Vec<G> {
        self.logs.lock().keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ordo_core::Timestamp;
    use tempfile::tempdir;

    #[test]
    fn lazily_opens_one_log_per_group() {
        let dir = tempdir().unwrap();
        let set: LogSet<String, String> = LogSet::new(dir.path(), 1024 * 1024);

        set.with_log(&"shard-a".to_string(), |log| {
            log.append_put(Timestamp::new(1), "k".to_string()).map(|_| ())
        })
        .unwrap();
        set.with_log(&"shard-b".to_string(), |log| {
            log.append_put(Timestamp::new(2), "k".to_string()).map(|_| ())
        })
        .unwrap();

        let mut groups = set.known_groups();
        groups.sort();
        assert_eq!(groups, vec!["shard-a".to_string(), "shard-b".to_string()]);
    }
}
