//! Candidate fitness scoring.
//!
//! Scores blend four measures of how well a candidate retells the series:
//! frequency precision (do its spacings predict the observed event count),
//! pattern accuracy and inclusion (do its ranges capture the observed
//! events), and temporal inclusion (how much of the timeline its ranges
//! cover; less is better). Perfect measures earn large multipliers so exact
//! descriptions dominate the leaderboards.

use std::cmp::Ordering;

use bigdecimal::{BigDecimal, FromPrimitive};
use chrono::Duration;

use crate::compute::range::RecurrenceRange;
use crate::compute::series::TimeSeries;
use crate::schema::{Candidate, ConstraintSet, SpacingConstraint};

/// The evaluated fitness of a candidate.
///
/// Orders by score alone. An invalid candidate carries a sentinel score
/// below every reachable valid score.
#[derive(Debug, Clone)]
pub struct FitnessScore {
    candidate: Candidate,
    valid_fitness: bool,
    set_count: usize,
    constraint_count: usize,
    frequency_precision: f64,
    pattern_accuracy: f64,
    pattern_inclusion: f64,
    temporal_inclusion: Duration,
    score: BigDecimal,
}

/// Per-set measures rolled up into the candidate score.
struct SetFitness {
    frequency_precision: f64,
    pattern_accuracy: f64,
    pattern_inclusion: f64,
    temporal_inclusion: Duration,
    score: BigDecimal,
}

impl FitnessScore {
    /// Evaluate a candidate against the series.
    pub fn evaluate(candidate: Candidate, series: &TimeSeries) -> Self {
        if !candidate.is_valid(series) {
            return Self::invalid(candidate);
        }

        let per_set: Vec<SetFitness> = candidate
            .sets()
            .iter()
            .map(|set| evaluate_set(&candidate, set, series))
            .collect();

        let sets = per_set.len() as f64;
        let frequency_precision =
            per_set.iter().map(|f| f.frequency_precision).sum::<f64>() / sets;
        let pattern_accuracy = per_set.iter().map(|f| f.pattern_accuracy).sum::<f64>() / sets;
        let pattern_inclusion: f64 = per_set.iter().map(|f| f.pattern_inclusion).sum();
        let temporal_inclusion = per_set
            .iter()
            .fold(Duration::zero(), |acc, f| acc + f.temporal_inclusion);

        let mut multiplier = 1i64;
        if frequency_precision == 100.0 {
            multiplier += 1_000;
        }
        if pattern_inclusion == 100.0 {
            multiplier += 1_000;
        }

        let set_score_sum = per_set
            .into_iter()
            .fold(BigDecimal::from(0), |acc, f| acc + f.score);
        let ti_seconds = temporal_inclusion.num_seconds() as f64;
        let score = big((multiplier as f64).powi(9)) + big(pattern_inclusion.powi(7))
            - big(ti_seconds.powi(5))
            - big(ti_seconds.powi(4))
            + set_score_sum;

        Self {
            set_count: candidate.sets().len(),
            constraint_count: candidate.sets().iter().map(ConstraintSet::len).sum(),
            candidate,
            valid_fitness: true,
            frequency_precision,
            pattern_accuracy,
            pattern_inclusion,
            temporal_inclusion,
            score,
        }
    }

    fn invalid(candidate: Candidate) -> Self {
        Self {
            candidate,
            valid_fitness: false,
            set_count: 0,
            constraint_count: 0,
            frequency_precision: f64::NAN,
            pattern_accuracy: f64::NAN,
            pattern_inclusion: f64::NAN,
            temporal_inclusion: Duration::zero(),
            score: big(-f64::MAX),
        }
    }

    pub fn candidate(&self) -> &Candidate {
        &self.candidate
    }

    pub fn into_candidate(self) -> Candidate {
        self.candidate
    }

    pub fn is_valid_fitness(&self) -> bool {
        self.valid_fitness
    }

    pub fn set_count(&self) -> usize {
        self.set_count
    }

    pub fn constraint_count(&self) -> usize {
        self.constraint_count
    }

    /// `NaN` when no set carries a spacing constraint.
    pub fn frequency_precision(&self) -> f64 {
        self.frequency_precision
    }

    pub fn pattern_accuracy(&self) -> f64 {
        self.pattern_accuracy
    }

    pub fn pattern_inclusion(&self) -> f64 {
        self.pattern_inclusion
    }

    /// Total time the candidate's ranges cover.
    pub fn temporal_inclusion(&self) -> Duration {
        self.temporal_inclusion
    }

    pub fn score(&self) -> &BigDecimal {
        &self.score
    }
}

impl PartialEq for FitnessScore {
    fn eq(&self, other: &Self) -> bool {
        self.score == other.score
    }
}

impl Eq for FitnessScore {}

impl PartialOrd for FitnessScore {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FitnessScore {
    fn cmp(&self, other: &Self) -> Ordering {
        self.score.cmp(&other.score)
    }
}

fn evaluate_set(candidate: &Candidate, set: &ConstraintSet, series: &TimeSeries) -> SetFitness {
    // counted over the whole candidate, not just this set
    let constraint_count = candidate.value_constraint_count();
    let distinct_unit_count = candidate.distinct_value_unit_count();

    let range = series.range(set);
    let spacing = set.spacing();
    let frequency_precision = match spacing {
        Some(spacing) => frequency_precision(spacing, series, &range),
        None => f64::NAN,
    };
    let pattern_accuracy = pattern_accuracy(series, &range);
    let pattern_inclusion = pattern_inclusion(series, &range);

    let mut multiplier = 1i64;
    if frequency_precision == 100.0 {
        multiplier += 100_000;
    }
    if pattern_accuracy == 100.0 {
        multiplier += 100_000;
    }
    if pattern_inclusion == 100.0 {
        multiplier += 100_000;
    }

    let mut score = BigDecimal::from(multiplier) * big(pattern_accuracy.powi(6))
        + big(pattern_inclusion)
        - BigDecimal::from(constraint_count as i64)
        + big((distinct_unit_count as f64).powi(8));
    if let Some(spacing) = spacing
        && !frequency_precision.is_nan()
    {
        score = score + big(frequency_precision.powi(9)) - big((spacing.max() as f64).powi(6));
    }

    SetFitness {
        frequency_precision,
        pattern_accuracy,
        pattern_inclusion,
        temporal_inclusion: range.duration(),
        score,
    }
}

/// How close a spacing constraint's predicted event count comes to the
/// observed one, averaged over its two bounds, 100 meaning exact.
fn frequency_precision(
    spacing: &SpacingConstraint,
    series: &TimeSeries,
    range: &RecurrenceRange,
) -> f64 {
    let actual = series.count_events_between(range) as f64;
    let predicted = series.count_distinct_unit_appearances(range, spacing.unit()) as f64;
    if actual == 0.0 && predicted == 0.0 {
        return 100.0;
    }

    let min_predicted = predicted / spacing.max() as f64;
    let max_predicted = predicted / spacing.min() as f64;
    (proximity(actual, min_predicted) + proximity(actual, max_predicted)) / 2.0
}

fn pattern_accuracy(series: &TimeSeries, range: &RecurrenceRange) -> f64 {
    if !range.is_valid() {
        return 0.0;
    }

    let actual = series.count_events_between(range) as f64;
    let predicted = actual;
    if actual == 0.0 && predicted == 0.0 {
        return 100.0;
    }
    proximity(actual, predicted)
}

/// How much of the series the range captures. An invalid range covers
/// everything.
fn pattern_inclusion(series: &TimeSeries, range: &RecurrenceRange) -> f64 {
    if !range.is_valid() {
        return 100.0;
    }

    let actual = series.len() as f64;
    let predicted = series.count_events_between(range) as f64;
    if actual == 0.0 && predicted == 0.0 {
        return 100.0;
    }
    proximity(actual, predicted)
}

/// Ratio of the smaller count to the larger, scaled to 100.
fn proximity(actual: f64, predicted: f64) -> f64 {
    if actual > predicted {
        predicted / actual * 100.0
    } else {
        actual / predicted * 100.0
    }
}

fn big(value: f64) -> BigDecimal {
    BigDecimal::from_f64(value).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{CalendarUnit, Constraint, ValueConstraint};
    use chrono::{DateTime, Utc};

    fn utc(s: &str) -> DateTime<Utc> {
        format!("{s}Z").parse().unwrap()
    }

    fn november_series() -> TimeSeries {
        TimeSeries::new(vec![
            utc("2011-11-04T08:48:11"),
            utc("2012-11-02T09:23:16"),
            utc("2013-11-01T09:51:49"),
            utc("2014-11-07T08:43:00"),
            utc("2015-11-06T08:22:25"),
        ])
        .unwrap()
    }

    fn second_series() -> TimeSeries {
        TimeSeries::new(vec![
            utc("2017-02-28T08:48:11"),
            utc("2017-02-28T08:48:12"),
            utc("2017-02-28T08:48:13"),
            utc("2017-02-28T08:48:14"),
            utc("2017-02-28T08:48:15"),
        ])
        .unwrap()
    }

    fn spacing(series: &TimeSeries, unit: CalendarUnit, min: i64, max: i64) -> Constraint {
        Constraint::Spacing(
            SpacingConstraint::new(unit, min, max, 1, series.begin()).unwrap(),
        )
    }

    fn value(series: &TimeSeries, unit: CalendarUnit, raw: i64) -> Constraint {
        Constraint::Value(ValueConstraint::new(series.scale(), unit, raw, 0).unwrap())
    }

    fn candidate(constraints: Vec<Constraint>) -> Candidate {
        Candidate::new(vec![ConstraintSet::new(constraints).unwrap()])
    }

    #[test]
    fn test_yearly_november_is_perfect() {
        let series = november_series();
        let fitness = FitnessScore::evaluate(
            candidate(vec![
                spacing(&series, CalendarUnit::Years, 1, 1),
                value(&series, CalendarUnit::Months, 11),
            ]),
            &series,
        );
        assert!(fitness.is_valid_fitness());
        assert_eq!(fitness.frequency_precision(), 100.0);
        assert_eq!(fitness.pattern_accuracy(), 100.0);
        assert_eq!(fitness.pattern_inclusion(), 100.0);
        assert_eq!(fitness.set_count(), 1);
        assert_eq!(fitness.constraint_count(), 2);
    }

    #[test]
    fn test_exact_second_frequency() {
        let series = second_series();
        let fitness = FitnessScore::evaluate(
            candidate(vec![spacing(&series, CalendarUnit::Seconds, 1, 1)]),
            &series,
        );
        assert!(fitness.is_valid_fitness());
        assert_eq!(fitness.frequency_precision(), 100.0);
    }

    #[test]
    fn test_wide_month_frequency_imprecise() {
        let series = november_series();
        let fitness = FitnessScore::evaluate(
            candidate(vec![spacing(&series, CalendarUnit::Months, 11, 12)]),
            &series,
        );
        assert!(fitness.is_valid_fitness());
        assert_ne!(fitness.frequency_precision(), 100.0);
    }

    #[test]
    fn test_no_spacing_has_nan_precision() {
        let series = november_series();
        let fitness = FitnessScore::evaluate(
            candidate(vec![value(&series, CalendarUnit::Months, 11)]),
            &series,
        );
        assert!(fitness.is_valid_fitness());
        assert!(fitness.frequency_precision().is_nan());
    }

    #[test]
    fn test_tighter_description_scores_higher() {
        // every November, against every Friday in November
        let series = november_series();
        let yearly = FitnessScore::evaluate(
            candidate(vec![
                spacing(&series, CalendarUnit::Years, 1, 1),
                value(&series, CalendarUnit::Months, 11),
            ]),
            &series,
        );
        let fridays = FitnessScore::evaluate(
            candidate(vec![
                spacing(&series, CalendarUnit::Years, 1, 1),
                value(&series, CalendarUnit::Days, 5),
                value(&series, CalendarUnit::Months, 11),
            ]),
            &series,
        );
        assert!(yearly.is_valid_fitness());
        assert!(fridays.is_valid_fitness());
        assert!(fridays > yearly);
    }

    #[test]
    fn test_conceptual_pattern_beats_bare_spacing() {
        // "once a second" against "once a second, every second"
        let series = second_series();
        let bare = FitnessScore::evaluate(
            candidate(vec![spacing(&series, CalendarUnit::Seconds, 1, 1)]),
            &series,
        );
        let described = FitnessScore::evaluate(
            candidate(vec![
                spacing(&series, CalendarUnit::Seconds, 1, 1),
                value(&series, CalendarUnit::Seconds, 0),
            ]),
            &series,
        );
        assert!(bare.is_valid_fitness());
        assert!(described.is_valid_fitness());
        assert!(described > bare);
    }

    #[test]
    fn test_invalid_candidate_scores_below_everything() {
        let series = november_series();
        let invalid = FitnessScore::evaluate(Candidate::new(Vec::new()), &series);
        let valid = FitnessScore::evaluate(
            candidate(vec![value(&series, CalendarUnit::Months, 11)]),
            &series,
        );
        assert!(!invalid.is_valid_fitness());
        assert!(invalid < valid);
    }
}
