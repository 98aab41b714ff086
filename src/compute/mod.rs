//! Compute module - calendar arithmetic, series projection, and the search.

mod calendar;
mod range;
mod series;

pub mod evolution;

pub use range::*;
pub use series::*;
