//! Calendar unit scale: per-unit bounds, enablement, and observed values.
//!
//! Every unit from nanoseconds to eras carries a pair of actual bounds.
//! Disabled units hold the -1 sentinel in both; enabled units hold their
//! factual bounds and accumulate observed minimum/maximum plus a distinct
//! value set as constraints are built against the series.

use std::collections::HashSet;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from scale queries and observation.
#[derive(Debug, Error)]
pub enum ScaleError {
    #[error("no enabled calendar units")]
    NoEnabledUnits,
    #[error("value {value} out of bounds for unit {unit:?}")]
    OutOfBounds { unit: CalendarUnit, value: i64 },
}

/// Chronological units, finest to coarsest. `Ord` follows unit duration.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum CalendarUnit {
    Nanos,
    Micros,
    Millis,
    Seconds,
    Minutes,
    Hours,
    Days,
    Weeks,
    Months,
    Years,
    Decades,
    Centuries,
    Millennia,
    Eras,
}

impl CalendarUnit {
    pub const ALL: [CalendarUnit; 14] = [
        CalendarUnit::Nanos,
        CalendarUnit::Micros,
        CalendarUnit::Millis,
        CalendarUnit::Seconds,
        CalendarUnit::Minutes,
        CalendarUnit::Hours,
        CalendarUnit::Days,
        CalendarUnit::Weeks,
        CalendarUnit::Months,
        CalendarUnit::Years,
        CalendarUnit::Decades,
        CalendarUnit::Centuries,
        CalendarUnit::Millennia,
        CalendarUnit::Eras,
    ];

    /// The next coarser unit in the advancement chain. The sub-second units
    /// all roll up to seconds, and the chain tops out at eras.
    ///
    /// Panics for eras; the chain has no parent there and asking is a
    /// programmer error.
    pub fn parent(self) -> CalendarUnit {
        match self {
            CalendarUnit::Nanos | CalendarUnit::Micros | CalendarUnit::Millis => {
                CalendarUnit::Seconds
            }
            CalendarUnit::Seconds => CalendarUnit::Minutes,
            CalendarUnit::Minutes => CalendarUnit::Hours,
            CalendarUnit::Hours => CalendarUnit::Days,
            CalendarUnit::Days => CalendarUnit::Weeks,
            CalendarUnit::Weeks => CalendarUnit::Months,
            CalendarUnit::Months => CalendarUnit::Years,
            CalendarUnit::Years => CalendarUnit::Decades,
            CalendarUnit::Decades => CalendarUnit::Centuries,
            CalendarUnit::Centuries => CalendarUnit::Eras,
            _ => panic!("no parent calendar unit for {self:?}"),
        }
    }

    /// The next finer unit, where one is defined.
    pub fn child(self) -> Option<CalendarUnit> {
        match self {
            CalendarUnit::Micros => Some(CalendarUnit::Nanos),
            CalendarUnit::Millis => Some(CalendarUnit::Micros),
            CalendarUnit::Seconds => Some(CalendarUnit::Millis),
            CalendarUnit::Minutes => Some(CalendarUnit::Seconds),
            CalendarUnit::Hours => Some(CalendarUnit::Minutes),
            CalendarUnit::Days => Some(CalendarUnit::Hours),
            CalendarUnit::Weeks => Some(CalendarUnit::Days),
            CalendarUnit::Months => Some(CalendarUnit::Weeks),
            CalendarUnit::Years => Some(CalendarUnit::Months),
            CalendarUnit::Decades => Some(CalendarUnit::Years),
            CalendarUnit::Millennia => Some(CalendarUnit::Decades),
            CalendarUnit::Eras => Some(CalendarUnit::Millennia),
            _ => None,
        }
    }

    /// Factual bounds for the unit, `None` where the scale never enables it.
    pub fn factual_bounds(self) -> Option<(i64, i64)> {
        let max = match self {
            CalendarUnit::Nanos => 1_000_000_000,
            CalendarUnit::Micros => 1_000_000,
            CalendarUnit::Millis => 1_000,
            CalendarUnit::Seconds | CalendarUnit::Minutes => 60,
            CalendarUnit::Hours => 24,
            CalendarUnit::Days => 7,
            CalendarUnit::Weeks => 6,
            CalendarUnit::Months => 12,
            CalendarUnit::Years => 4_000,
            CalendarUnit::Decades | CalendarUnit::Centuries => 10,
            CalendarUnit::Millennia | CalendarUnit::Eras => return None,
        };
        Some((0, max))
    }
}

const DISABLED: i64 = -1;

#[derive(Debug)]
struct UnitState {
    actual_min: i64,
    actual_max: i64,
    observed_min: Option<i64>,
    observed_max: Option<i64>,
    observed_distinct: HashSet<i64>,
}

impl UnitState {
    fn disabled() -> Self {
        Self {
            actual_min: DISABLED,
            actual_max: DISABLED,
            observed_min: None,
            observed_max: None,
            observed_distinct: HashSet::new(),
        }
    }

    fn factual(unit: CalendarUnit) -> Self {
        match unit.factual_bounds() {
            Some((min, max)) => Self {
                actual_min: min,
                actual_max: max,
                observed_min: None,
                observed_max: None,
                observed_distinct: HashSet::new(),
            },
            None => Self::disabled(),
        }
    }

    fn is_disabled(&self) -> bool {
        self.actual_min == DISABLED || self.actual_max == DISABLED
    }
}

/// Snapshot of a unit's actual bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnitBounds {
    pub unit: CalendarUnit,
    pub actual_min: i64,
    pub actual_max: i64,
}

/// Per-unit enablement and observation state for one series.
///
/// Interior mutability lets breeding observe values through a shared
/// reference while parallel evaluation reads bounds.
#[derive(Debug)]
pub struct CalendarScale {
    units: Vec<RwLock<UnitState>>,
}

fn read(lock: &RwLock<UnitState>) -> RwLockReadGuard<'_, UnitState> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write(lock: &RwLock<UnitState>) -> RwLockWriteGuard<'_, UnitState> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

impl CalendarScale {
    /// All supported units enabled at factual bounds.
    pub fn factual() -> Self {
        Self {
            units: CalendarUnit::ALL
                .iter()
                .map(|&u| RwLock::new(UnitState::factual(u)))
                .collect(),
        }
    }

    fn state(&self, unit: CalendarUnit) -> &RwLock<UnitState> {
        &self.units[unit as usize]
    }

    /// Enable a unit at its factual bounds, wiping observed state.
    ///
    /// Panics for units without factual bounds (millennia, eras).
    pub fn enable(&self, unit: CalendarUnit) {
        if unit.factual_bounds().is_none() {
            panic!("cannot enable calendar unit {unit:?}");
        }
        *write(self.state(unit)) = UnitState::factual(unit);
    }

    /// Disable a unit, wiping observed state.
    pub fn disable(&self, unit: CalendarUnit) {
        *write(self.state(unit)) = UnitState::disabled();
    }

    pub fn is_enabled(&self, unit: CalendarUnit) -> bool {
        !read(self.state(unit)).is_disabled()
    }

    /// Actual bounds snapshot for a unit.
    pub fn bounds(&self, unit: CalendarUnit) -> UnitBounds {
        let state = read(self.state(unit));
        UnitBounds {
            unit,
            actual_min: state.actual_min,
            actual_max: state.actual_max,
        }
    }

    /// A value is valid when its unit is enabled and it falls strictly
    /// inside the actual bounds.
    pub fn is_valid(&self, unit: CalendarUnit, value: i64) -> bool {
        let state = read(self.state(unit));
        !state.is_disabled() && value < state.actual_max && value > state.actual_min
    }

    /// Record an observed field value for a unit.
    ///
    /// The distinct set only grows when the observed minimum or maximum
    /// moves; interior values pass through unrecorded.
    pub fn observe(&self, unit: CalendarUnit, value: i64) -> Result<(), ScaleError> {
        let mut state = write(self.state(unit));
        if value > state.actual_max || value < state.actual_min {
            return Err(ScaleError::OutOfBounds { unit, value });
        }

        if state.observed_min.is_none_or(|min| value < min) {
            state.observed_min = Some(value);
            state.observed_distinct.insert(value);
        }
        if state.observed_max.is_none_or(|max| value > max) {
            state.observed_max = Some(value);
            state.observed_distinct.insert(value);
        }
        Ok(())
    }

    pub fn observed_minimum(&self, unit: CalendarUnit) -> Option<i64> {
        read(self.state(unit)).observed_min
    }

    pub fn observed_maximum(&self, unit: CalendarUnit) -> Option<i64> {
        read(self.state(unit)).observed_max
    }

    /// Distinct values observed for a unit, in ascending order.
    pub fn observed_distinct(&self, unit: CalendarUnit) -> Vec<i64> {
        let mut values: Vec<i64> = read(self.state(unit))
            .observed_distinct
            .iter()
            .copied()
            .collect();
        values.sort_unstable();
        values
    }

    /// All currently enabled units, finest first.
    pub fn enabled_units(&self) -> Vec<CalendarUnit> {
        CalendarUnit::ALL
            .iter()
            .copied()
            .filter(|&u| self.is_enabled(u))
            .collect()
    }

    /// Uniformly chosen enabled unit.
    pub fn random_enabled_unit<R: Rng>(&self, rng: &mut R) -> Result<CalendarUnit, ScaleError> {
        let enabled = self.enabled_units();
        if enabled.is_empty() {
            return Err(ScaleError::NoEnabledUnits);
        }
        Ok(enabled[rng.gen_range(0..enabled.len())])
    }
}
