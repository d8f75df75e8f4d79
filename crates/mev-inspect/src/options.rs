//! Per-analysis knobs.

use mev_data::cache::CacheSizes;
use mev_detect::{DEFAULT_EPSILON, DEFAULT_MIN_CONFIDENCE};

#[derive(Clone, Debug)]
pub struct InspectOptions {
    /// Also simulate missed opportunities (slower; off by default).
    pub what_if: bool,
    /// Confidence floor for swap records.
    pub min_confidence: f64,
    /// Minimum round-trip gain for an arbitrage.
    pub arb_epsilon: f64,
    /// DFS bound for what-if path search.
    pub whatif_max_depth: usize,
    /// LRU capacities for the per-block state cache.
    pub cache_sizes: CacheSizes,
}

impl Default for InspectOptions {
    fn default() -> Self {
        Self {
            what_if: false,
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            arb_epsilon: DEFAULT_EPSILON,
            whatif_max_depth: mev_detect::whatif::DEFAULT_MAX_DEPTH,
            cache_sizes: CacheSizes::default(),
        }
    }
}
