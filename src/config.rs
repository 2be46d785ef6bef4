//! Engine-wide configuration.
//!
//! Follows the same builder-plus-`validate()` shape as
//! [`ordo_log::WalConfig`]: setters are chained, nothing is checked until
//! [`EngineConfig::validate`] is called, and [`EngineConfig::for_testing`]
//! gives small, fast-fsyncing defaults for tests (the teacher's
//! `WalConfig::for_testing`/`DatabaseConfig::for_testing` pattern).

use ordo_log::{DurabilityMode, WalConfig, WalConfigError};
use std::path::PathBuf;

/// Validation failures for [`EngineConfig`].
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum EngineConfigError {
    /// The wrapped [`WalConfig`] failed its own validation.
    #[error("log config invalid: {0}")]
    Log(#[from] WalConfigError),
    /// `gc_batch_size` was zero.
    #[error("gc_batch_size must be greater than zero")]
    ZeroGcBatchSize,
}

/// Top-level configuration for an [`crate::Engine`].
///
/// Wraps the durable log's [`WalConfig`] (directory, segment size, fsync
/// policy) plus the one engine-level knob spec §4.4's GC needs: how many
/// finalized transactions' key sets one reclaim event prunes before
/// yielding (SPEC_FULL.md §3.3/§4).
#[derive(Debug, Clone)]
pub struct EngineConfig {
    wal: WalConfig,
    gc_batch_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            wal: WalConfig::new(),
            gc_batch_size: 256,
        }
    }
}

impl EngineConfig {
    /// Defaults: a 64 MiB segment log in the current directory, strict
    /// fsync, a GC batch size of 256.
    pub fn new() -> Self {
        Self::default()
    }

    /// Small segments, strict fsync, a tiny GC batch size — fast iteration
    /// in tests, matching the teacher's `*Config::for_testing()` pattern.
    pub fn for_testing() -> Self {
        EngineConfig {
            wal: WalConfig::for_testing(),
            gc_batch_size: 4,
        }
    }

    /// Set the directory the durable log is stored under.
    pub fn with_log_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.wal = self.wal.with_directory(directory);
        self
    }

    /// Set the maximum size a log segment grows to before rotation.
    pub fn with_segment_size_bytes(mut self, bytes: u64) -> Self {
        self.wal = self.wal.with_segment_size_bytes(bytes);
        self
    }

    /// Set the log's fsync policy.
    pub fn with_durability(mut self, mode: DurabilityMode) -> Self {
        self.wal = self.wal.with_durability(mode);
        self
    }

    /// Set how many finalized transactions' key sets one reclaim event
    /// prunes before yielding (spec §4.4).
    pub fn with_gc_batch_size(mut self, batch_size: usize) -> Self {
        self.gc_batch_size = batch_size;
        self
    }

    /// Check the config is internally consistent.
    pub fn validate(&self) -> Result<(), EngineConfigError> {
        self.wal.validate()?;
        if self.gc_batch_size == 0 {
            return Err(EngineConfigError::ZeroGcBatchSize);
        }
        Ok(())
    }

    /// The wrapped durable-log configuration.
    pub fn wal_config(&self) -> &WalConfig {
        &self.wal
    }

    /// The configured GC batch size.
    pub fn gc_batch_size(&self) -> usize {
        self.gc_batch_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(EngineConfig::new().with_log_directory("/tmp/ordo").validate().is_ok());
    }

    #[test]
    fn for_testing_config_validates() {
        assert!(EngineConfig::for_testing().with_log_directory("/tmp/ordo").validate().is_ok());
    }

    #[test]
    fn zero_gc_batch_size_is_rejected() {
        let cfg = EngineConfig::new().with_log_directory("/tmp/ordo").with_gc_batch_size(0);
        assert_eq!(cfg.validate(), Err(EngineConfigError::ZeroGcBatchSize));
    }

    #[test]
    fn invalid_log_config_surfaces_through_engine_config() {
        let cfg = EngineConfig::new().with_log_directory("/tmp/ordo").with_segment_size_bytes(0);
        assert!(matches!(cfg.validate(), Err(EngineConfigError::Log(_))));
    }
}
