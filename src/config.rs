//! Configuration for the MPM front-end.
//!
//! Tuning knobs for the build-phase registry and the process-wide database
//! cache. The defaults are sized for rule sets in the hundreds to low
//! thousands of patterns; packet-path deployments with very large rule sets
//! may want a larger bucket table.

/// Configuration consumed by [`crate::MpmService`] and new contexts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MpmConfig {
    /// Number of buckets in the build-phase pattern dedup table.
    ///
    /// The bucket hash is a cheap prefix hash, so this only needs to spread
    /// insert-time lookups; it does not affect scan performance.
    pub registry_buckets: usize,

    /// Initial capacity hint for the compiled-database cache table.
    pub cache_capacity: usize,
}

impl Default for MpmConfig {
    fn default() -> Self {
        Self {
            registry_buckets: 8192,
            cache_capacity: 1000,
        }
    }
}

impl MpmConfig {
    /// Configuration for tests and small embedded uses: a tiny bucket table
    /// keeps per-context build memory negligible.
    pub fn small() -> Self {
        Self {
            registry_buckets: 64,
            cache_capacity: 16,
        }
    }
}
