//! The generational search loop.
//!
//! The engine seeds a population of single-set candidates, then per
//! generation records every fitness on the recombiner's leaderboards, ages
//! the population one series position, breeds offspring from leaderboard
//! and population parents, and keeps the best survivors. Evaluation runs in
//! parallel; the coordinator stays sequential so seeded runs reproduce.

use std::sync::Arc;

use log::{info, trace};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use thiserror::Error;

use crate::compute::evolution::fitness::FitnessScore;
use crate::compute::evolution::mutate;
use crate::compute::evolution::recombine::Recombiner;
use crate::compute::series::TimeSeries;
use crate::schema::{CalendarUnit, Candidate, ConfigError, ModelError, SearchConfig};

/// Errors from running a search.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error("search produced no candidates")]
    NoSolution,
}

/// The recurrence search engine.
pub struct SearchEngine {
    config: SearchConfig,
    series: Arc<TimeSeries>,
}

impl SearchEngine {
    pub fn new(config: SearchConfig, series: Arc<TimeSeries>) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config, series })
    }

    /// An engine with the default configuration.
    pub fn default_engine(series: Arc<TimeSeries>) -> Self {
        Self {
            config: SearchConfig::default(),
            series,
        }
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub fn series(&self) -> &Arc<TimeSeries> {
        &self.series
    }

    /// Begin an analysis. Sub-day units are disabled up front and have to
    /// be deliberately re-enabled through the precision toggles.
    pub fn analyze(self) -> Analysis {
        for unit in [
            CalendarUnit::Nanos,
            CalendarUnit::Micros,
            CalendarUnit::Millis,
            CalendarUnit::Seconds,
            CalendarUnit::Minutes,
            CalendarUnit::Hours,
        ] {
            self.series.scale().disable(unit);
        }
        Analysis { engine: self }
    }

    fn run(&self) -> Result<Vec<FitnessScore>, SearchError> {
        let series = &*self.series;
        let mut rng = match self.config.random_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        info!(
            "analyzing {} events spanning {} to {}",
            series.len(),
            series.begin_date_time(),
            series.end_date_time()
        );

        let mut population = Vec::with_capacity(self.config.population_size);
        for _ in 0..self.config.population_size {
            population.push(mutate::seed_candidate(&mut rng, series)?);
        }
        let mut scored = evaluate(population, series);

        let mut recombiner = Recombiner::new();
        for generation in 1..=self.config.max_generations {
            for fitness in &scored {
                recombiner.record(fitness);
            }

            let mut pool = Vec::with_capacity(scored.len() + self.config.offspring_size);
            for fitness in &scored {
                pool.push(mutate::age_candidate(fitness.candidate(), series)?);
            }
            let aged = pool.len();

            let shared = (self.config.offspring_size / 10) * 2;
            for _ in 0..self.config.offspring_size - shared {
                let parent_a = self.parent(&recombiner, &mut rng, &scored);
                let parent_b = self.parent(&recombiner, &mut rng, &scored);
                pool.push(recombiner.breed(&mut rng, &parent_a, &parent_b, series)?);
            }
            for _ in 0..shared {
                let parent_a = pool[rng.gen_range(0..aged)].clone();
                let parent_b = pool[rng.gen_range(0..aged)].clone();
                pool.push(recombiner.breed(&mut rng, &parent_a, &parent_b, series)?);
            }

            let mut next = evaluate(pool, series);
            next.sort_by(|a, b| b.cmp(a));
            next.truncate(self.config.survivors_size);

            let valid = next.iter().filter(|f| f.is_valid_fitness()).count();
            info!(
                "generation {generation}: population {}, valid {valid}",
                next.len()
            );
            if let Some(best) = next.first() {
                trace!("best candidate: {:?}", best.candidate());
            }
            scored = next;
        }

        Ok(scored)
    }

    /// A leaderboard parent, falling back to a uniform population member
    /// while the boards are still empty.
    fn parent(
        &self,
        recombiner: &Recombiner,
        rng: &mut StdRng,
        scored: &[FitnessScore],
    ) -> Candidate {
        match recombiner.parent(rng) {
            Some(fitness) => fitness.candidate().clone(),
            None => scored[rng.gen_range(0..scored.len())].candidate().clone(),
        }
    }
}

fn evaluate(pool: Vec<Candidate>, series: &TimeSeries) -> Vec<FitnessScore> {
    pool.into_par_iter()
        .map(|candidate| FitnessScore::evaluate(candidate, series))
        .collect()
}

/// An analysis handle over a configured engine.
pub struct Analysis {
    engine: SearchEngine,
}

impl Analysis {
    /// Enable hour precision.
    pub fn with_hour_precision(self) -> Self {
        self.enable(CalendarUnit::Hours)
    }

    /// Enable minute precision.
    pub fn with_minute_precision(self) -> Self {
        self.enable(CalendarUnit::Minutes)
    }

    /// Enable second precision.
    pub fn with_second_precision(self) -> Self {
        self.enable(CalendarUnit::Seconds)
    }

    /// Enable millisecond precision.
    pub fn with_millisecond_precision(self) -> Self {
        self.enable(CalendarUnit::Millis)
    }

    /// Enable microsecond precision.
    pub fn with_microsecond_precision(self) -> Self {
        self.enable(CalendarUnit::Micros)
    }

    /// Enable nanosecond precision.
    pub fn with_nanosecond_precision(self) -> Self {
        self.enable(CalendarUnit::Nanos)
    }

    fn enable(self, unit: CalendarUnit) -> Self {
        self.engine.series.scale().enable(unit);
        self
    }

    /// Run the search and return the most fit candidate.
    pub fn top_solution(&self) -> Result<FitnessScore, SearchError> {
        let mut survivors = self.engine.run()?;
        if survivors.is_empty() {
            return Err(SearchError::NoSolution);
        }
        Ok(survivors.remove(0))
    }

    /// Run the search and return every survivor, best first.
    pub fn top_solutions(&self) -> Result<Vec<FitnessScore>, SearchError> {
        self.engine.run()
    }
}
