//! Schema module - configuration, calendar scale, and candidate model types.

mod config;
mod model;
mod scale;

pub use config::*;
pub use model::*;
pub use scale::*;
