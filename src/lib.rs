//! Chronosift - recurrence pattern inference over timestamp series.
//!
//! Given an ordered series of UTC timestamps, chronosift evolves candidate
//! descriptions of when those events recur. A candidate combines
//! calendar-value constraints ("hour is 8", "day-of-week is Friday") with
//! spacing constraints ("every 1..=2 years"); a genetic search scores
//! candidates by projecting them onto the observed timeline and keeps the
//! descriptions that retell the series most precisely.
//!
//! # Architecture
//!
//! The crate is split into two main modules:
//!
//! - `schema`: configuration, the calendar scale, and the candidate model
//! - `compute`: calendar arithmetic, range projection, and the search loop
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use chronosift::{SearchConfig, SearchEngine, TimeSeries};
//!
//! let series = Arc::new(TimeSeries::new(vec![
//!     "2011-11-04T08:48:11Z".parse().unwrap(),
//!     "2012-11-02T09:23:16Z".parse().unwrap(),
//!     "2013-11-01T09:51:49Z".parse().unwrap(),
//!     "2014-11-07T08:43:00Z".parse().unwrap(),
//!     "2015-11-06T08:22:25Z".parse().unwrap(),
//! ]).unwrap());
//!
//! let config = SearchConfig {
//!     max_generations: 10,
//!     ..SearchConfig::default()
//! };
//! let engine = SearchEngine::new(config, series).unwrap();
//! let best = engine.analyze().with_hour_precision().top_solution().unwrap();
//!
//! println!("score: {}", best.score());
//! ```

pub mod compute;
pub mod schema;

// Re-export commonly used types
pub use compute::evolution::{Analysis, FitnessScore, SearchEngine, SearchError};
pub use compute::{RecurrenceRange, SeriesError, TimeSeries};
pub use schema::{
    CalendarScale, CalendarUnit, Candidate, ConfigError, Constraint, ConstraintSet, ModelError,
    ScaleError, SearchConfig,
};
