//! Candidate solution model: constraints, constraint sets, candidates.
//!
//! A candidate is a set of constraint groups. Each group mixes value
//! constraints ("hour is 8", absent target means "every hour") with at most
//! one spacing constraint ("every 1..=2 years"). Groups project onto the
//! series timeline as recurrence ranges; two groups covering the same range
//! make a candidate invalid.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::compute::TimeSeries;
use crate::schema::scale::{CalendarScale, CalendarUnit, ScaleError};

/// Errors from constraint construction and stepping.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("constraint set requires at least one constraint")]
    EmptyConstraintSet,
    #[error("minimum and maximum spacing must not be negative")]
    NegativeSpacing,
    #[error("invalid minimum and maximum spacing combination")]
    SpacingBounds,
    #[error("series moved backwards: last occurrence {last}, next {next}")]
    NonMonotonicSeries {
        last: DateTime<Utc>,
        next: DateTime<Utc>,
    },
    #[error(transparent)]
    Scale(#[from] ScaleError),
}

/// A calendar-value constraint: the unit's field must equal the target.
///
/// A raw value of 0 is the absent sentinel and matches every value of the
/// unit. The cursor tracks the series position the constraint last read
/// while stepping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValueConstraint {
    unit: CalendarUnit,
    target: Option<i64>,
    cursor: usize,
}

impl ValueConstraint {
    /// Build a value constraint, observing a present target on the scale.
    pub fn new(
        scale: &CalendarScale,
        unit: CalendarUnit,
        raw_value: i64,
        cursor: usize,
    ) -> Result<Self, ModelError> {
        if raw_value != 0 {
            scale.observe(unit, raw_value)?;
        }
        Ok(Self {
            unit,
            target: (raw_value != 0).then_some(raw_value),
            cursor,
        })
    }

    pub fn unit(&self) -> CalendarUnit {
        self.unit
    }

    pub fn target(&self) -> Option<i64> {
        self.target
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn is_valid(&self, scale: &CalendarScale) -> bool {
        match self.target {
            None => true,
            Some(value) => scale.is_valid(self.unit, value),
        }
    }
}

impl PartialEq for ValueConstraint {
    fn eq(&self, other: &Self) -> bool {
        self.unit == other.unit && self.target == other.target
    }
}

impl Eq for ValueConstraint {}

/// A spacing constraint: consecutive occurrences are `min..=max` whole
/// units apart, anchored at the last occurrence seen while stepping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpacingConstraint {
    unit: CalendarUnit,
    min: i64,
    max: i64,
    cursor: usize,
    last_occurrence: DateTime<Utc>,
}

impl SpacingConstraint {
    pub fn new(
        unit: CalendarUnit,
        min: i64,
        max: i64,
        cursor: usize,
        last_occurrence: DateTime<Utc>,
    ) -> Result<Self, ModelError> {
        if min < 0 || max < 0 {
            return Err(ModelError::NegativeSpacing);
        }
        if min > max {
            return Err(ModelError::SpacingBounds);
        }
        Ok(Self {
            unit,
            min,
            max,
            cursor,
            last_occurrence,
        })
    }

    pub fn unit(&self) -> CalendarUnit {
        self.unit
    }

    pub fn min(&self) -> i64 {
        self.min
    }

    pub fn max(&self) -> i64 {
        self.max
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn last_occurrence(&self) -> DateTime<Utc> {
        self.last_occurrence
    }

    /// Widen the bounds to absorb an observed gap.
    pub(crate) fn absorbing(
        &self,
        gap: i64,
        cursor: usize,
        last_occurrence: DateTime<Utc>,
    ) -> Self {
        Self {
            unit: self.unit,
            min: self.min.min(gap),
            max: self.max.max(gap),
            cursor,
            last_occurrence,
        }
    }

    pub(crate) fn rewound(&self, last_occurrence: DateTime<Utc>) -> Self {
        Self {
            cursor: 0,
            last_occurrence,
            ..*self
        }
    }

    /// A spacing of zero means nothing; both bounds must be at least one.
    pub fn is_valid(&self) -> bool {
        self.min >= 1 && self.max >= 1
    }
}

impl PartialEq for SpacingConstraint {
    fn eq(&self, other: &Self) -> bool {
        self.unit == other.unit
            && self.min == other.min
            && self.max == other.max
            && self.last_occurrence == other.last_occurrence
    }
}

impl Eq for SpacingConstraint {}

/// A single constraint, value or spacing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Constraint {
    Value(ValueConstraint),
    Spacing(SpacingConstraint),
}

impl Constraint {
    pub fn is_valid(&self, scale: &CalendarScale) -> bool {
        match self {
            Constraint::Value(value) => value.is_valid(scale),
            Constraint::Spacing(spacing) => spacing.is_valid(),
        }
    }

    pub fn as_value(&self) -> Option<&ValueConstraint> {
        match self {
            Constraint::Value(value) => Some(value),
            Constraint::Spacing(_) => None,
        }
    }

    pub fn as_spacing(&self) -> Option<&SpacingConstraint> {
        match self {
            Constraint::Spacing(spacing) => Some(spacing),
            Constraint::Value(_) => None,
        }
    }
}

/// One constraint group; a candidate holds one or more of these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstraintSet {
    constraints: Vec<Constraint>,
}

impl ConstraintSet {
    pub fn new(constraints: Vec<Constraint>) -> Result<Self, ModelError> {
        if constraints.is_empty() {
            return Err(ModelError::EmptyConstraintSet);
        }
        Ok(Self { constraints })
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    /// The value constraints of this set, in declaration order.
    pub fn values(&self) -> impl Iterator<Item = &ValueConstraint> {
        self.constraints.iter().filter_map(Constraint::as_value)
    }

    /// The spacing constraint, when the set carries one.
    pub fn spacing(&self) -> Option<&SpacingConstraint> {
        self.constraints.iter().find_map(Constraint::as_spacing)
    }

    /// Valid when no unit mixes absent and present targets or repeats a
    /// target, every constraint is valid, and at most one spacing
    /// constraint is present.
    pub fn is_valid(&self, scale: &CalendarScale) -> bool {
        let mut units: Vec<CalendarUnit> = self.values().map(ValueConstraint::unit).collect();
        units.sort_unstable();
        units.dedup();
        for unit in units {
            let targets: Vec<Option<i64>> = self
                .values()
                .filter(|v| v.unit() == unit)
                .map(ValueConstraint::target)
                .collect();
            if targets.len() > 1 {
                let mut seen = Vec::new();
                for target in targets {
                    match target {
                        None => return false,
                        Some(value) if seen.contains(&value) => return false,
                        Some(value) => seen.push(value),
                    }
                }
            }
        }

        let mut has_spacing = false;
        for constraint in &self.constraints {
            if !constraint.is_valid(scale) {
                return false;
            }
            if matches!(constraint, Constraint::Spacing(_)) {
                if has_spacing {
                    return false;
                }
                has_spacing = true;
            }
        }
        true
    }
}

/// A candidate solution: one or more constraint sets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    sets: Vec<ConstraintSet>,
}

impl Candidate {
    pub fn new(sets: Vec<ConstraintSet>) -> Self {
        Self { sets }
    }

    pub fn sets(&self) -> &[ConstraintSet] {
        &self.sets
    }

    pub fn into_sets(self) -> Vec<ConstraintSet> {
        self.sets
    }

    /// Count of value constraints across every set.
    pub fn value_constraint_count(&self) -> usize {
        self.sets.iter().map(|s| s.values().count()).sum()
    }

    /// Count of distinct units among value constraints across every set.
    pub fn distinct_value_unit_count(&self) -> usize {
        let mut units: Vec<CalendarUnit> = self
            .sets
            .iter()
            .flat_map(|s| s.values().map(ValueConstraint::unit))
            .collect();
        units.sort_unstable();
        units.dedup();
        units.len()
    }

    /// Valid when non-empty, every set is valid, and no two sets project
    /// onto the same recurrence range.
    pub fn is_valid(&self, series: &TimeSeries) -> bool {
        if self.sets.is_empty() {
            return false;
        }

        for (i, first) in self.sets.iter().enumerate() {
            if !first.is_valid(series.scale()) {
                return false;
            }
            for second in &self.sets[i + 1..] {
                if !second.is_valid(series.scale()) {
                    return false;
                }
                let r1 = series.range(first);
                let r2 = series.range(second);
                if r1.is_same_range(&r2) {
                    return false;
                }
            }
        }
        true
    }
}
