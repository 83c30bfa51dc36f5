use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;
use serde::{Deserialize, Serialize};

// Documented total-failure rates of the mock sources
pub const CLIMATE_FAILURE_PROBABILITY: f64 = 0.03;
pub const AIR_QUALITY_FAILURE_PROBABILITY: f64 = 0.05;

/// Failure injection statistics, reported alongside source status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct FailureInjectionStats {
    pub draws: u64,
    pub failures: u64,
}

impl FailureInjectionStats {
    pub fn failure_rate(&self) -> f64 {
        if self.draws == 0 {
            return 0.0;
        }
        self.failures as f64 / self.draws as f64
    }
}

/// Configuration for failure injection behavior
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct FailureInjectionConfig {
    pub enabled: bool,
    pub probability: f64,
}

impl FailureInjectionConfig {
    pub fn with_probability(probability: f64) -> Self {
        Self {
            enabled: true,
            probability,
        }
    }
}

/// Probabilistic total-failure switch for synthetic sources.
///
/// Seeded PCG so test runs are reproducible.
#[derive(Debug)]
pub struct FailureInjector {
    config: FailureInjectionConfig,
    stats: FailureInjectionStats,
    rng: Pcg32,
}

impl FailureInjector {
    pub fn new(config: FailureInjectionConfig, seed: u64) -> Self {
        debug_assert!(
            (0.0..=1.0).contains(&config.probability),
            "Failure probability {} outside [0, 1]",
            config.probability
        );

        Self {
            config,
            stats: FailureInjectionStats::default(),
            rng: Pcg32::seed_from_u64(seed),
        }
    }

    /// Draw once; `true` means the caller must report a total failure.
    pub fn should_fail(&mut self) -> bool {
        if !self.config.enabled {
            return false;
        }

        self.stats.draws += 1;
        let failed = self.rng.gen::<f64>() < self.config.probability;
        if failed {
            self.stats.failures += 1;
        }
        failed
    }

    pub fn get_stats(&self) -> &FailureInjectionStats {
        &self.stats
    }

    pub fn get_config(&self) -> &FailureInjectionConfig {
        &self.config
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.config.enabled = enabled;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_injector_never_fails() {
        let mut injector = FailureInjector::new(FailureInjectionConfig::with_probability(1.0), 7);
        injector.set_enabled(false);

        assert!((0..100).all(|_| !injector.should_fail()));
        assert_eq!(injector.get_stats().draws, 0);
    }

    #[test]
    fn test_certain_failure() {
        let mut injector = FailureInjector::new(FailureInjectionConfig::with_probability(1.0), 7);
        assert!((0..100).all(|_| injector.should_fail()));
        assert_eq!(injector.get_stats().failure_rate(), 1.0);
    }

    #[test]
    fn test_same_seed_same_sequence() {
        let config = FailureInjectionConfig::with_probability(0.5);
        let mut a = FailureInjector::new(config, 42);
        let mut b = FailureInjector::new(config, 42);

        for _ in 0..64 {
            assert_eq!(a.should_fail(), b.should_fail());
        }
    }
}
