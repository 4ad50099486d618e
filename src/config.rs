//! Runtime tunables, threaded explicitly through constructors.

use serde::{Deserialize, Serialize};

/// Number of weighted-sampling trials when the GC draws a random term.
pub const GC_TERM_SAMPLE_TRIALS: usize = 20;

/// Initial capacity of the per-field numeric GC state array.
pub const NUMERIC_GC_INITIAL_CAPACITY: usize = 4;

/// Immutable configuration for the indexing core.
///
/// One value is built at startup and cloned into the ingest pipeline and
/// every garbage collector; nothing reads configuration from globals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexingConfig {
    /// Inverted-index blocks repaired per GC batch before yielding.
    pub gc_scan_size: usize,
    /// Lower bound of the adaptive GC frequency (Hz).
    pub gc_min_hz: f32,
    /// Upper bound of the adaptive GC frequency (Hz).
    pub gc_max_hz: f32,
    /// GC frequency at collector creation, clamped into `[min, max]`.
    pub gc_initial_hz: f32,
    /// Documents whose text/tag payload is at least this many bytes are
    /// preprocessed on the worker pool instead of the calling thread.
    pub self_exec_threshold: usize,
    /// Worker threads in the ingest preprocessing pool.
    pub index_pool_threads: usize,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            gc_scan_size: 100,
            gc_min_hz: 1.0,
            gc_max_hz: 100.0,
            gc_initial_hz: 10.0,
            self_exec_threshold: 1024,
            index_pool_threads: 4,
        }
    }
}

impl IndexingConfig {
    /// Clamp an arbitrary frequency into the configured GC band.
    pub fn clamp_hz(&self, hz: f32) -> f32 {
        hz.clamp(self.gc_min_hz, self.gc_max_hz)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = IndexingConfig::default();
        assert_eq!(config.gc_scan_size, 100);
        assert_eq!(config.self_exec_threshold, 1024);
        assert!(config.gc_min_hz <= config.gc_initial_hz);
        assert!(config.gc_initial_hz <= config.gc_max_hz);
    }

    #[test]
    fn test_clamp_hz() {
        let config = IndexingConfig::default();
        assert_eq!(config.clamp_hz(0.01), config.gc_min_hz);
        assert_eq!(config.clamp_hz(1e6), config.gc_max_hz);
        assert_eq!(config.clamp_hz(50.0), 50.0);
    }
}
