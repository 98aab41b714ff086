//! Evolutionary search over candidate recurrence descriptions.
//!
//! The search system consists of:
//!
//! - **Stepping and seeding** (`mutate`): aging constraints through the
//!   series and sprouting fresh single-set candidates
//! - **Fitness** (`fitness`): scoring candidates against the observed
//!   series
//! - **Recombination** (`recombine`): leaderboards and the six breeding
//!   strategies
//! - **Search** (`search`): the generational loop and the analysis handle

mod fitness;
mod mutate;
mod recombine;
mod search;

pub use fitness::FitnessScore;
pub use mutate::{age_candidate, seed_candidate, step_spacing, step_value};
pub use recombine::Recombiner;
pub use search::{Analysis, SearchEngine, SearchError};
