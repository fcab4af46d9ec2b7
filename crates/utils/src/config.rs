//! Typed configuration surface. Loading (file/env) is an external concern;
//! this module only defines the struct and its defaults, mirroring the
//! layered-defaults style of the teacher's own config services.

use std::time::Duration;

/// Well-known priority bands (spec §4.1). Higher is more urgent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PriorityBand {
    Background,
    Normal,
    UserInitiated,
}

impl PriorityBand {
    pub const fn value(self) -> i64 {
        match self {
            PriorityBand::Background => 100,
            PriorityBand::Normal => 200,
            PriorityBand::UserInitiated => 300,
        }
    }
}

impl From<PriorityBand> for i64 {
    fn from(band: PriorityBand) -> Self {
        band.value()
    }
}

/// The Reciprocal Rank Fusion constant and default result size used by the
/// hybrid search engine (spec §4.8).
#[derive(Debug, Clone, Copy)]
pub struct SearchConfig {
    pub rrf_k: f64,
    pub default_top_k: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            rrf_k: 60.0,
            default_top_k: 10,
        }
    }
}

/// Worker runtime configuration (spec §4.2).
#[derive(Debug, Clone, Copy)]
pub struct WorkerConfig {
    pub poll_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Config {
    pub search: SearchConfig,
    pub worker: WorkerConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_bands_match_spec_values() {
        assert_eq!(PriorityBand::UserInitiated.value(), 300);
        assert_eq!(PriorityBand::Normal.value(), 200);
        assert_eq!(PriorityBand::Background.value(), 100);
    }

    #[test]
    fn defaults_match_spec() {
        let cfg = Config::default();
        assert_eq!(cfg.search.rrf_k, 60.0);
        assert_eq!(cfg.search.default_top_k, 10);
        assert_eq!(cfg.worker.poll_interval, Duration::from_secs(1));
    }
}
