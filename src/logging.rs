//! Convenience `tracing_subscriber` initialization for binaries built on
//! top of this library.
//!
//! Not required by library consumers — every `ordo-*` crate emits
//! `tracing` events on its own — this is just the standard env-filtered
//! `fmt` subscriber wiring, provided the way `sub-tracing`-style crates do
//! for binaries in this corpus.

use tracing_subscriber::EnvFilter;

/// Install a `tracing_subscriber::fmt` subscriber honoring `RUST_LOG`,
/// defaulting to `info` when unset.
///
/// Safe to call more than once; later calls are no-ops (`try_init`
/// silently ignores an already-installed global subscriber).
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
