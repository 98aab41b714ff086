//! Leaderboard-guided recombination of candidates.
//!
//! The recombiner keeps five leaderboards over the fitness it has seen: the
//! best overall scores, the best per frequency-precision, per
//! pattern-accuracy and per pattern-inclusion value, and the shortest
//! temporal inclusions. Breeding draws parents from those boards and mixes
//! their constraint sets through one of six strategies.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use bigdecimal::{BigDecimal, FromPrimitive};
use chrono::Duration;
use rand::Rng;

use crate::compute::evolution::fitness::FitnessScore;
use crate::compute::series::TimeSeries;
use crate::schema::{Candidate, Constraint, ConstraintSet, ModelError, ValueConstraint};

const TOP_SCORE_LIMIT: usize = 100;

/// Leaderboards and breeding strategies for the search engine.
#[derive(Debug, Default)]
pub struct Recombiner {
    /// Best scores seen, descending, bounded.
    top_scores: Vec<FitnessScore>,
    /// Best candidate per frequency-precision value.
    top_frequency_precision: BTreeMap<BigDecimal, FitnessScore>,
    /// Best candidate per pattern-accuracy value.
    top_pattern_accuracy: BTreeMap<BigDecimal, FitnessScore>,
    /// Best candidate per pattern-inclusion value.
    top_pattern_inclusion: BTreeMap<BigDecimal, FitnessScore>,
    /// Best candidate per covered duration; shorter is better.
    top_temporal_inclusion: BTreeMap<Duration, FitnessScore>,
}

impl Recombiner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a fitness on the leaderboards. Invalid fitness is ignored.
    pub fn record(&mut self, fitness: &FitnessScore) {
        if !fitness.is_valid_fitness() {
            return;
        }

        if !self.top_scores.contains(fitness) {
            let pos = self
                .top_scores
                .binary_search_by(|probe| probe.cmp(fitness).reverse())
                .unwrap_or_else(|pos| pos);
            if pos < TOP_SCORE_LIMIT {
                self.top_scores.insert(pos, fitness.clone());
                self.top_scores.truncate(TOP_SCORE_LIMIT);
            }
        }

        if !fitness.frequency_precision().is_nan()
            && let Some(key) = BigDecimal::from_f64(fitness.frequency_precision())
        {
            record_keyed(&mut self.top_frequency_precision, key, fitness);
        }
        if let Some(key) = BigDecimal::from_f64(fitness.pattern_accuracy()) {
            record_keyed(&mut self.top_pattern_accuracy, key, fitness);
        }
        if let Some(key) = BigDecimal::from_f64(fitness.pattern_inclusion()) {
            record_keyed(&mut self.top_pattern_inclusion, key, fitness);
        }
        record_keyed(
            &mut self.top_temporal_inclusion,
            fitness.temporal_inclusion(),
            fitness,
        );
    }

    /// The best fitness recorded so far.
    pub fn best(&self) -> Option<&FitnessScore> {
        self.top_scores.first()
    }

    /// Draw a parent from the leaderboards.
    ///
    /// Half the time this is the best overall candidate; otherwise a random
    /// board contributes one of its better entries. `None` until a valid
    /// fitness has been recorded.
    pub fn parent<R: Rng>(&self, rng: &mut R) -> Option<&FitnessScore> {
        if rng.gen_bool(0.5) {
            return self.top_scores.first();
        }

        let picked = match rng.gen_range(0..5) {
            0 => prefix_pick(rng, self.top_scores.len(), self.top_scores.iter()),
            1 => prefix_pick(
                rng,
                self.top_frequency_precision.len(),
                self.top_frequency_precision.values().rev(),
            ),
            2 => prefix_pick(
                rng,
                self.top_pattern_accuracy.len(),
                self.top_pattern_accuracy.values().rev(),
            ),
            3 => prefix_pick(
                rng,
                self.top_pattern_inclusion.len(),
                self.top_pattern_inclusion.values().rev(),
            ),
            _ => prefix_pick(
                rng,
                self.top_temporal_inclusion.len(),
                self.top_temporal_inclusion.values(),
            ),
        };
        picked.or_else(|| self.top_scores.first())
    }

    /// Breed a child from two parents through a random strategy.
    pub fn breed<R: Rng>(
        &self,
        rng: &mut R,
        parent_a: &Candidate,
        parent_b: &Candidate,
        series: &TimeSeries,
    ) -> Result<Candidate, ModelError> {
        match rng.gen_range(0..6) {
            0 => Ok(combine(parent_a, parent_b)),
            1 => Ok(steal_sets(rng, parent_a, parent_b)),
            2 => steal_constraints(rng, parent_a, parent_b),
            3 => steal_distinct_value(rng, parent_a, parent_b),
            4 => expand_targets(rng, parent_a, parent_b, series),
            _ => self.best_spacing(rng, parent_a, parent_b),
        }
    }

    /// Rebuild a prefix of the main parent's sets around the spacing
    /// constraint of the best frequency-precision candidate seen so far,
    /// keeping only their value constraints.
    fn best_spacing<R: Rng>(
        &self,
        rng: &mut R,
        parent_a: &Candidate,
        parent_b: &Candidate,
    ) -> Result<Candidate, ModelError> {
        let main = if rng.gen_bool(0.5) { parent_a } else { parent_b };
        let best = self
            .top_frequency_precision
            .values()
            .next_back()
            .and_then(|f| f.candidate().sets().iter().find_map(ConstraintSet::spacing));

        let mut sets: Vec<Vec<Constraint>> = main
            .sets()
            .iter()
            .map(|s| s.constraints().to_vec())
            .collect();
        for set in sets.iter_mut().take(rng.gen_range(0..=main.sets().len())) {
            let mut rebuilt: Vec<Constraint> = set
                .iter()
                .filter(|c| matches!(c, Constraint::Value(_)))
                .cloned()
                .collect();
            if let Some(spacing) = best {
                rebuilt.push(Constraint::Spacing(spacing.clone()));
            }
            if !rebuilt.is_empty() {
                *set = rebuilt;
            }
        }
        rebuild(sets)
    }
}

fn record_keyed<K: Ord>(board: &mut BTreeMap<K, FitnessScore>, key: K, fitness: &FitnessScore) {
    match board.entry(key) {
        Entry::Vacant(entry) => {
            entry.insert(fitness.clone());
        }
        Entry::Occupied(mut entry) => {
            if entry.get().score() < fitness.score() {
                entry.insert(fitness.clone());
            }
        }
    }
}

/// Pick uniformly from a random-length prefix of a board, best first.
fn prefix_pick<'a, R, I>(rng: &mut R, len: usize, mut board: I) -> Option<&'a FitnessScore>
where
    R: Rng,
    I: Iterator<Item = &'a FitnessScore>,
{
    if len == 0 {
        return None;
    }
    let reach = rng.gen_range(0..len) + 1;
    board.nth(rng.gen_range(0..reach))
}

/// Concatenate both parents' sets.
fn combine(parent_a: &Candidate, parent_b: &Candidate) -> Candidate {
    let mut sets = parent_a.sets().to_vec();
    sets.extend_from_slice(parent_b.sets());
    Candidate::new(sets)
}

/// Append a random-length prefix of the second parent's sets to a randomly
/// chosen main parent.
fn steal_sets<R: Rng>(rng: &mut R, parent_a: &Candidate, parent_b: &Candidate) -> Candidate {
    let main = if rng.gen_bool(0.5) { parent_a } else { parent_b };
    let take = rng.gen_range(0..=parent_b.sets().len());
    let mut sets = main.sets().to_vec();
    sets.extend_from_slice(&parent_b.sets()[..take]);
    Candidate::new(sets)
}

/// Scatter a prefix of one parent's constraints over the other's sets.
///
/// A stolen spacing constraint evicts any spacing already in the set it
/// lands in and goes to the front; value constraints append.
fn steal_constraints<R: Rng>(
    rng: &mut R,
    parent_a: &Candidate,
    parent_b: &Candidate,
) -> Result<Candidate, ModelError> {
    let (main, victim) = if rng.gen_bool(0.5) {
        (parent_a, parent_b)
    } else {
        (parent_b, parent_a)
    };

    let flattened: Vec<Constraint> = victim
        .sets()
        .iter()
        .flat_map(|s| s.constraints().iter().cloned())
        .collect();
    let take = rng.gen_range(0..=flattened.len());
    let mut stolen: Vec<Constraint> = flattened.into_iter().take(take).collect();

    let mut sets: Vec<Vec<Constraint>> = main
        .sets()
        .iter()
        .map(|s| s.constraints().to_vec())
        .collect();
    while !stolen.is_empty() {
        let insert_count = rng.gen_range(0..=stolen.len());
        if insert_count == 0 {
            continue;
        }
        let target = rng.gen_range(0..sets.len());
        for _ in 0..insert_count {
            let constraint = stolen.remove(rng.gen_range(0..stolen.len()));
            if matches!(constraint, Constraint::Spacing(_)) {
                sets[target].retain(|c| !matches!(c, Constraint::Spacing(_)));
                sets[target].insert(0, constraint);
            } else {
                sets[target].push(constraint);
            }
        }
    }
    rebuild(sets)
}

/// Give the set holding the second parent's first value constraint a
/// same-unit, different-valued constraint taken from the other parent.
fn steal_distinct_value<R: Rng>(
    rng: &mut R,
    parent_a: &Candidate,
    parent_b: &Candidate,
) -> Result<Candidate, ModelError> {
    let (main, donor) = if rng.gen_bool(0.5) {
        (parent_a, parent_b)
    } else {
        (parent_b, parent_a)
    };

    let probe = parent_b.sets().iter().flat_map(ConstraintSet::values).next();
    let Some(probe) = probe else {
        return Ok(main.clone());
    };
    let steal = donor.sets().iter().flat_map(ConstraintSet::values).find(|v| {
        v.unit() == probe.unit()
            && v.target().is_some()
            && probe.target().is_some()
            && v.target() != probe.target()
    });
    let Some(steal) = steal else {
        return Ok(main.clone());
    };

    let mut sets: Vec<Vec<Constraint>> = main
        .sets()
        .iter()
        .map(|s| s.constraints().to_vec())
        .collect();
    if let Some(set) = sets
        .iter_mut()
        .find(|set| set.iter().any(|c| c.as_value() == Some(probe)))
    {
        set.push(Constraint::Value(steal.clone()));
    }
    rebuild(sets)
}

/// Widen every set of one parent with the observed targets its value
/// constraints' units have seen but the set does not yet carry.
fn expand_targets<R: Rng>(
    rng: &mut R,
    parent_a: &Candidate,
    parent_b: &Candidate,
    series: &TimeSeries,
) -> Result<Candidate, ModelError> {
    let main = if rng.gen_bool(0.5) { parent_a } else { parent_b };

    let mut sets = Vec::with_capacity(main.sets().len());
    for set in main.sets() {
        let mut constraints = set.constraints().to_vec();
        for value in set.values() {
            for target in series.scale().observed_distinct(value.unit()) {
                let carried = set.values().any(|v| v.target() == Some(target));
                if !carried {
                    constraints.push(Constraint::Value(ValueConstraint::new(
                        series.scale(),
                        value.unit(),
                        target,
                        value.cursor(),
                    )?));
                }
            }
        }
        sets.push(constraints);
    }
    rebuild(sets)
}

fn rebuild(sets: Vec<Vec<Constraint>>) -> Result<Candidate, ModelError> {
    Ok(Candidate::new(
        sets.into_iter()
            .map(ConstraintSet::new)
            .collect::<Result<Vec<_>, ModelError>>()?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{CalendarUnit, SpacingConstraint};
    use chrono::{DateTime, Utc};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

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

    fn value(series: &TimeSeries, unit: CalendarUnit, raw: i64) -> Constraint {
        Constraint::Value(ValueConstraint::new(series.scale(), unit, raw, 0).unwrap())
    }

    fn spacing(series: &TimeSeries, unit: CalendarUnit, min: i64, max: i64) -> Constraint {
        Constraint::Spacing(SpacingConstraint::new(unit, min, max, 1, series.begin()).unwrap())
    }

    fn candidate(groups: Vec<Vec<Constraint>>) -> Candidate {
        Candidate::new(
            groups
                .into_iter()
                .map(|g| ConstraintSet::new(g).unwrap())
                .collect(),
        )
    }

    #[test]
    fn test_record_orders_best_first() {
        let series = november_series();
        let mut recombiner = Recombiner::new();

        let weak = FitnessScore::evaluate(
            candidate(vec![vec![value(&series, CalendarUnit::Months, 11)]]),
            &series,
        );
        let strong = FitnessScore::evaluate(
            candidate(vec![vec![
                spacing(&series, CalendarUnit::Years, 1, 1),
                value(&series, CalendarUnit::Months, 11),
            ]]),
            &series,
        );
        assert!(strong > weak);

        recombiner.record(&weak);
        recombiner.record(&strong);
        assert_eq!(recombiner.best().unwrap(), &strong);
    }

    #[test]
    fn test_record_ignores_invalid() {
        let series = november_series();
        let mut recombiner = Recombiner::new();
        recombiner.record(&FitnessScore::evaluate(Candidate::new(Vec::new()), &series));
        assert!(recombiner.best().is_none());
    }

    #[test]
    fn test_parent_empty_boards_is_none() {
        let mut rng = StdRng::seed_from_u64(1);
        let recombiner = Recombiner::new();
        for _ in 0..16 {
            assert!(recombiner.parent(&mut rng).is_none());
        }
    }

    #[test]
    fn test_parent_draws_from_boards() {
        let series = november_series();
        let mut rng = StdRng::seed_from_u64(2);
        let mut recombiner = Recombiner::new();
        recombiner.record(&FitnessScore::evaluate(
            candidate(vec![vec![
                spacing(&series, CalendarUnit::Years, 1, 1),
                value(&series, CalendarUnit::Months, 11),
            ]]),
            &series,
        ));
        for _ in 0..16 {
            assert!(recombiner.parent(&mut rng).is_some());
        }
    }

    #[test]
    fn test_combine_concatenates_sets() {
        let series = november_series();
        let a = candidate(vec![vec![value(&series, CalendarUnit::Months, 11)]]);
        let b = candidate(vec![
            vec![value(&series, CalendarUnit::Hours, 8)],
            vec![value(&series, CalendarUnit::Hours, 9)],
        ]);
        let child = combine(&a, &b);
        assert_eq!(child.sets().len(), 3);
        assert_eq!(child.sets()[0], a.sets()[0]);
        assert_eq!(child.sets()[1], b.sets()[0]);
    }

    #[test]
    fn test_combine_order_only_permutes_sets() {
        let series = november_series();
        let a = candidate(vec![
            vec![value(&series, CalendarUnit::Months, 11)],
            vec![value(&series, CalendarUnit::Hours, 8)],
        ]);
        let b = candidate(vec![vec![
            spacing(&series, CalendarUnit::Years, 1, 1),
            value(&series, CalendarUnit::Hours, 9),
        ]]);

        let ab = combine(&a, &b);
        let ba = combine(&b, &a);
        assert_eq!(ab.sets().len(), ba.sets().len());
        for set in ab.sets() {
            let in_ab = ab.sets().iter().filter(|s| *s == set).count();
            let in_ba = ba.sets().iter().filter(|s| *s == set).count();
            assert_eq!(in_ab, in_ba);
        }
    }

    #[test]
    fn test_steal_constraints_keeps_single_spacing() {
        let series = november_series();
        let a = candidate(vec![vec![
            spacing(&series, CalendarUnit::Years, 1, 1),
            value(&series, CalendarUnit::Months, 11),
        ]]);
        let b = candidate(vec![vec![
            spacing(&series, CalendarUnit::Months, 12, 12),
            value(&series, CalendarUnit::Days, 5),
        ]]);

        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..32 {
            let child = steal_constraints(&mut rng, &a, &b).unwrap();
            for set in child.sets() {
                let spacings = set
                    .constraints()
                    .iter()
                    .filter(|c| matches!(c, Constraint::Spacing(_)))
                    .count();
                assert!(spacings <= 1);
            }
        }
    }

    #[test]
    fn test_steal_distinct_value_appends_donor_constraint() {
        let series = november_series();
        // both parents constrain hours; the donor carries a different value
        let a = candidate(vec![vec![value(&series, CalendarUnit::Hours, 8)]]);
        let b = candidate(vec![vec![value(&series, CalendarUnit::Hours, 9)]]);

        let mut rng = StdRng::seed_from_u64(11);
        let mut grown = false;
        for _ in 0..32 {
            let child = steal_distinct_value(&mut rng, &a, &b).unwrap();
            if child.sets()[0].len() == 2 {
                let targets: Vec<Option<i64>> =
                    child.sets()[0].values().map(|v| v.target()).collect();
                assert!(targets.contains(&Some(8)));
                assert!(targets.contains(&Some(9)));
                grown = true;
            }
        }
        assert!(grown);
    }

    #[test]
    fn test_expand_targets_fills_observed_values() {
        let series = november_series();
        // observing 9 through another candidate makes it available
        let _observed = candidate(vec![vec![value(&series, CalendarUnit::Hours, 9)]]);
        let main = candidate(vec![vec![value(&series, CalendarUnit::Hours, 8)]]);

        let mut rng = StdRng::seed_from_u64(13);
        let child = expand_targets(&mut rng, &main, &main, &series).unwrap();
        let targets: Vec<Option<i64>> = child.sets()[0].values().map(|v| v.target()).collect();
        assert!(targets.contains(&Some(8)));
        assert!(targets.contains(&Some(9)));
    }

    #[test]
    fn test_best_spacing_rebuilds_around_leader() {
        let series = november_series();
        let mut recombiner = Recombiner::new();
        recombiner.record(&FitnessScore::evaluate(
            candidate(vec![vec![
                spacing(&series, CalendarUnit::Years, 1, 1),
                value(&series, CalendarUnit::Months, 11),
            ]]),
            &series,
        ));

        let main = candidate(vec![vec![
            spacing(&series, CalendarUnit::Months, 11, 12),
            value(&series, CalendarUnit::Days, 5),
        ]]);
        let mut rng = StdRng::seed_from_u64(17);
        let mut rebuilt = false;
        for _ in 0..32 {
            let child = recombiner.best_spacing(&mut rng, &main, &main).unwrap();
            if let Some(spacing) = child.sets()[0].spacing()
                && spacing.unit() == CalendarUnit::Years
            {
                rebuilt = true;
            }
        }
        assert!(rebuilt);
    }
}
