//! Configuration types for the recurrence search engine.

use serde::{Deserialize, Serialize};

fn default_population_size() -> usize {
    5_000
}

fn default_offspring_size() -> usize {
    5_000
}

fn default_survivors_size() -> usize {
    5_000
}

fn default_max_generations() -> u64 {
    25
}

/// Top-level search configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Candidates alive per generation.
    #[serde(default = "default_population_size")]
    pub population_size: usize,
    /// Offspring bred per generation.
    #[serde(default = "default_offspring_size")]
    pub offspring_size: usize,
    /// Candidates carried into the next generation, best first.
    #[serde(default = "default_survivors_size")]
    pub survivors_size: usize,
    /// Generation cap for a single search run.
    #[serde(default = "default_max_generations")]
    pub max_generations: u64,
    /// Seed for the search RNG. `None` seeds from entropy.
    #[serde(default)]
    pub random_seed: Option<u64>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            population_size: default_population_size(),
            offspring_size: default_offspring_size(),
            survivors_size: default_survivors_size(),
            max_generations: default_max_generations(),
            random_seed: None,
        }
    }
}

impl SearchConfig {
    /// Validate configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.population_size == 0 {
            return Err(ConfigError::InvalidPopulationSize);
        }
        if self.offspring_size == 0 {
            return Err(ConfigError::InvalidOffspringSize);
        }
        if self.survivors_size == 0 {
            return Err(ConfigError::InvalidSurvivorsSize);
        }
        if self.max_generations == 0 {
            return Err(ConfigError::InvalidGenerationCap);
        }
        Ok(())
    }
}

/// Configuration validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Population size must be non-zero")]
    InvalidPopulationSize,
    #[error("Offspring size must be non-zero")]
    InvalidOffspringSize,
    #[error("Survivors size must be non-zero")]
    InvalidSurvivorsSize,
    #[error("Generation cap must be non-zero")]
    InvalidGenerationCap,
}
