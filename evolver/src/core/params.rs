//! Fixed run parameters and their validation.

use std::time::Duration;

use crate::error::ConfigError;

/// Parameters supplied once at run start and never mutated mid-run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunParams {
    pub population_size: usize,
    pub max_generations: u32,
    /// Upper bound on concurrently evaluated candidates.
    pub workers: usize,
    /// Wall-clock limit for one candidate on one test input.
    pub test_timeout: Duration,
    /// Wall-clock limit for one mutation oracle call.
    pub oracle_timeout: Duration,
}

impl Default for RunParams {
    fn default() -> Self {
        Self {
            population_size: 3,
            max_generations: 5,
            workers: 4,
            test_timeout: Duration::from_secs(1),
            oracle_timeout: Duration::from_secs(120),
        }
    }
}

impl RunParams {
    /// Check the parameters against the problem they will run on.
    pub fn validate(&self, test_count: usize, seed_count: usize) -> Result<(), ConfigError> {
        if self.population_size == 0 {
            return Err(ConfigError::new("population_size must be > 0"));
        }
        if self.max_generations == 0 {
            return Err(ConfigError::new("max_generations must be > 0"));
        }
        if self.workers == 0 {
            return Err(ConfigError::new("workers must be > 0"));
        }
        if self.test_timeout.is_zero() {
            return Err(ConfigError::new("test timeout must be > 0"));
        }
        if self.oracle_timeout.is_zero() {
            return Err(ConfigError::new("oracle timeout must be > 0"));
        }
        if test_count == 0 {
            return Err(ConfigError::new("test vector set must be non-empty"));
        }
        if seed_count == 0 {
            return Err(ConfigError::new("seed population must be non-empty"));
        }
        if seed_count > self.population_size {
            return Err(ConfigError::new(format!(
                "{seed_count} seeds exceed population_size {}",
                self.population_size
            )));
        }
        Ok(())
    }

    /// Upper bound on wall-clock time for a whole run, ignoring process spawn overhead.
    ///
    /// Every generation evaluates at most `population_size` candidates against every
    /// test, and every generation but the last makes `population_size - 1` oracle calls.
    pub fn worst_case_duration(&self, test_count: usize) -> Duration {
        let generations = self.max_generations;
        let evaluations = saturating_u32(self.population_size.saturating_mul(test_count));
        let mutations = saturating_u32(self.population_size.saturating_sub(1));
        let per_generation = self
            .test_timeout
            .saturating_mul(evaluations)
            .saturating_add(self.oracle_timeout.saturating_mul(mutations));
        per_generation.saturating_mul(generations)
    }
}

fn saturating_u32(value: usize) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}
