//! Log configuration: segment sizing and fsync policy.
//!
//! Grounded on the teacher's `WalConfig` builder-plus-`validate()` pattern:
//! fields are set via chained setters, and nothing is checked until
//! `validate()` is called, so a caller can assemble a config across several
//! call sites before committing to it.

use std::path::PathBuf;
use std::time::Duration;

/// How aggressively the log fsyncs appended records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DurabilityMode {
    /// fsync after every append. Slowest, strongest guarantee: matches
    /// spec §4.2's "durable before return" for every `append_*` call.
    Strict,
    /// fsync after `batch_size` appends or `interval_ms` elapsed, whichever
    /// comes first. Used only when a caller has explicitly opted out of
    /// per-record durability; the default is `Strict`.
    Batched {
        /// Maximum records buffered before a forced fsync.
        batch_size: usize,
        /// Maximum time buffered before a forced fsync.
        interval_ms: u64,
    },
}

impl DurabilityMode {
    /// Whether this mode ever needs the underlying file open for writing.
    pub fn requires_log(&self) -> bool {
        true
    }
}

/// Validation failures for [`WalConfig`].
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum WalConfigError {
    /// `segment_size_bytes` was zero.
    #[error("segment_size_bytes must be greater than zero")]
    ZeroSegmentSize,
    /// `directory` was empty.
    #[error("log directory must not be empty")]
    EmptyDirectory,
    /// A `Batched` mode had a zero batch size.
    #[error("batched durability mode requires a non-zero batch_size")]
    ZeroBatchSize,
}

/// Segment sizing and fsync policy for a [`crate::SegmentedLog`].
#[derive(Debug, Clone)]
pub struct WalConfig {
    directory: PathBuf,
    segment_size_bytes: u64,
    durability: DurabilityMode,
}

impl Default for WalConfig {
    fn default() -> Self {
        WalConfig {
            directory: PathBuf::from("."),
            segment_size_bytes: 64 * 1024 * 1024,
            durability: DurabilityMode::Strict,
        }
    }
}

impl WalConfig {
    /// Start from the defaults: 64 MiB segments, strict fsync, current dir.
    pub fn new() -> Self {
        Self::default()
    }

    /// Small segments and strict fsync, for fast iteration in tests.
    pub fn for_testing() -> Self {
        WalConfig {
            directory: PathBuf::from("."),
            segment_size_bytes: 64 * 1024,
            durability: DurabilityMode::Strict,
        }
    }

    /// Set the directory segment files are stored under.
    pub fn with_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.directory = directory.into();
        self
    }

    /// Set the maximum size a segment grows to before rotation.
    pub fn with_segment_size_bytes(mut self, bytes: u64) -> Self {
        self.segment_size_bytes = bytes;
        self
    }

    /// Set the fsync policy.
    pub fn with_durability(mut self, mode: DurabilityMode) -> Self {
        self.durability = mode;
        self
    }

    /// Check the config is internally consistent.
    pub fn validate(&self) -> Result<(), WalConfigError> {
        if self.segment_size_bytes == 0 {
            return Err(WalConfigError::ZeroSegmentSize);
        }
        if self.directory.as_os_str().is_empty() {
            return Err(WalConfigError::EmptyDirectory);
        }
        if let DurabilityMode::Batched { batch_size, .. } = self.durability {
            if batch_size == 0 {
                return Err(WalConfigError::ZeroBatchSize);
            }
        }
        Ok(())
    }

    /// The configured directory.
    pub fn directory(&self) -> &std::path::Path {
        &self.directory
    }

    /// The configured segment size cap, in bytes.
    pub fn segment_size_bytes(&self) -> u64 {
        self.segment_size_bytes
    }

    /// The configured fsync policy.
    pub fn durability(&self) -> DurabilityMode {
        self.durability
    }

    /// The batching interval as a [`Duration`], if this config is `Batched`.
    pub fn batch_interval(&self) -> Option<Duration> {
        match self.durability {
            DurabilityMode::Batched { interval_ms, .. } => Some(Duration::from_millis(interval_ms)),
            DurabilityMode::Strict => None,
        }
    }
}
