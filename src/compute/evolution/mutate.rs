//! Constraint stepping and candidate seeding.
//!
//! Stepping walks a constraint one position further through the series,
//! re-reading its field from the timestamp under the cursor; seeding builds
//! a fresh single-set candidate from a random point in the series.

use rand::Rng;

use crate::compute::calendar;
use crate::compute::series::TimeSeries;
use crate::schema::{
    Candidate, Constraint, ConstraintSet, ModelError, SpacingConstraint, ValueConstraint,
};

/// Step a value constraint one series position forward.
///
/// A cursor past the series end wraps to the start, keeping the current
/// target without reading a timestamp.
pub fn step_value(
    constraint: &ValueConstraint,
    series: &TimeSeries,
) -> Result<ValueConstraint, ModelError> {
    if constraint.cursor() >= series.len() {
        return ValueConstraint::new(
            series.scale(),
            constraint.unit(),
            constraint.target().unwrap_or(0),
            0,
        );
    }

    let next = series.timestamp(constraint.cursor()).naive_utc();
    let value = calendar::field_value(next, constraint.unit());
    ValueConstraint::new(series.scale(), constraint.unit(), value, constraint.cursor() + 1)
}

/// Step a spacing constraint one series position forward, absorbing the
/// observed gap into its bounds.
pub fn step_spacing(
    constraint: &SpacingConstraint,
    series: &TimeSeries,
) -> Result<SpacingConstraint, ModelError> {
    if constraint.cursor() >= series.len() {
        return Ok(constraint.rewound(series.timestamp(0)));
    }

    let next = series.timestamp(constraint.cursor());
    let last = constraint.last_occurrence();
    if next < last {
        return Err(ModelError::NonMonotonicSeries { last, next });
    }

    let mut gap = calendar::between(last.naive_utc(), next.naive_utc(), constraint.unit());
    let landed = calendar::add(last.naive_utc(), gap, constraint.unit());
    if landed < next.naive_utc() && gap >= constraint.min() && gap <= constraint.max() {
        gap += 1;
    } else if gap == 0 {
        // a spacing of zero means nothing
        gap += 1;
    }

    Ok(constraint.absorbing(gap, constraint.cursor() + 1, next))
}

/// Step every constraint of a candidate one series position forward.
pub fn age_candidate(candidate: &Candidate, series: &TimeSeries) -> Result<Candidate, ModelError> {
    let sets = candidate
        .sets()
        .iter()
        .map(|set| {
            let constraints = set
                .constraints()
                .iter()
                .map(|constraint| match constraint {
                    Constraint::Value(value) => {
                        Ok(Constraint::Value(step_value(value, series)?))
                    }
                    Constraint::Spacing(spacing) => {
                        Ok(Constraint::Spacing(step_spacing(spacing, series)?))
                    }
                })
                .collect::<Result<Vec<_>, ModelError>>()?;
            ConstraintSet::new(constraints)
        })
        .collect::<Result<Vec<_>, ModelError>>()?;
    Ok(Candidate::new(sets))
}

/// Seed a fresh single-set candidate from a random series position.
///
/// A coin picks a spacing constraint measured between two consecutive
/// timestamps; another picks a value constraint on a random enabled unit,
/// either target-free or carrying the field read from the first timestamp.
/// At least one constraint is always produced.
pub fn seed_candidate<R: Rng>(rng: &mut R, series: &TimeSeries) -> Result<Candidate, ModelError> {
    let mut constraints = Vec::new();
    let mut position = rng.gen_range(0..series.len() - 1);
    let first = series.timestamp(position).naive_utc();
    position += 1;

    if rng.gen_bool(0.5) {
        let second = series.timestamp(position);
        position += 1;
        let unit = series.scale().random_enabled_unit(rng)?;
        let mut gap = calendar::between(first, second.naive_utc(), unit);
        if gap == 0 {
            gap += 1;
        }
        constraints.push(Constraint::Spacing(SpacingConstraint::new(
            unit, gap, gap, position, second,
        )?));
    }

    if rng.gen_bool(0.5) || constraints.is_empty() {
        let unit = series.scale().random_enabled_unit(rng)?;
        let raw = if rng.gen_bool(0.5) {
            0
        } else {
            calendar::field_value(first, unit)
        };
        constraints.push(Constraint::Value(ValueConstraint::new(
            series.scale(),
            unit,
            raw,
            position,
        )?));
    }

    Ok(Candidate::new(vec![ConstraintSet::new(constraints)?]))
}
