//! Recurrence ranges: the concrete time intervals a constraint set's value
//! constraints select on a series timeline.
//!
//! The sweep walks the series span coarsest constraint first, aligning the
//! cursor to each constrained field in turn and emitting an interval every
//! time all constraints agree on the cursor position. Ranges are computed
//! once per distinct value-pattern key and cached by the owning series.

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use log::{debug, trace};

use crate::compute::calendar;
use crate::compute::series::TimeSeries;
use crate::schema::{CalendarUnit, ConstraintSet};

/// Cache key: value constraints as (unit, target) pairs, coarsest first.
pub type RangeKey = Vec<(CalendarUnit, Option<i64>)>;

/// The projection of a constraint set's value constraints onto a series.
#[derive(Debug)]
pub struct RecurrenceRange {
    patterns: RangeKey,
    intervals: Vec<(DateTime<Utc>, DateTime<Utc>)>,
    pattern_start: Option<NaiveDateTime>,
    pattern_end: Option<NaiveDateTime>,
    include_end: bool,
    fully_conceptual: bool,
    valid: bool,
    duration: Duration,
}

impl RecurrenceRange {
    /// The cache key for a constraint set: its value constraints sorted
    /// coarsest unit first, duplicates kept in declaration order.
    pub fn key_for(set: &ConstraintSet) -> RangeKey {
        let mut key: RangeKey = set.values().map(|v| (v.unit(), v.target())).collect();
        key.sort_by(|a, b| b.0.cmp(&a.0));
        key
    }

    /// Compute the range a constraint set selects on the given series.
    ///
    /// A set without value constraints produces an invalid range covering
    /// the whole series span.
    pub fn compute(series: &TimeSeries, set: &ConstraintSet) -> Self {
        let patterns = Self::key_for(set);
        let fully_conceptual = patterns.iter().all(|&(_, target)| target.is_none());

        if patterns.is_empty() {
            return Self {
                patterns,
                intervals: vec![(series.begin(), series.end())],
                pattern_start: None,
                pattern_end: None,
                include_end: false,
                fully_conceptual,
                valid: false,
                duration: series.duration(),
            };
        }

        let mut sweep = Sweep {
            series,
            patterns: &patterns,
            smallest: patterns.len() - 1,
            limit_unit: series.limit_unit(),
            fully_conceptual,
            intervals: Vec::new(),
            pattern_start: None,
            pattern_end: None,
            include_end: false,
            search: true,
            temp_skip: None,
        };
        sweep.run();

        let begin = series.begin_date_time();
        let end = series.end_date_time();
        let pattern_start = sweep.pattern_start.map(|s| s.max(begin));
        let pattern_end = sweep.pattern_end.map(|e| e.min(end));

        let intervals: Vec<(DateTime<Utc>, DateTime<Utc>)> = sweep
            .intervals
            .iter()
            .map(|&(s, e)| (s.and_utc(), e.and_utc()))
            .collect();
        let duration = intervals
            .iter()
            .fold(Duration::zero(), |acc, &(s, e)| acc + (e - s));
        let include_end = sweep.include_end;
        debug!("range for {patterns:?}: {} intervals, {duration}", intervals.len());

        Self {
            patterns,
            intervals,
            pattern_start,
            pattern_end,
            include_end,
            fully_conceptual,
            valid: true,
            duration,
        }
    }

    pub fn key(&self) -> &RangeKey {
        &self.patterns
    }

    pub fn intervals(&self) -> &[(DateTime<Utc>, DateTime<Utc>)] {
        &self.intervals
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Whether every constraint is target-free and the range covers
    /// everything.
    pub fn is_fully_conceptual(&self) -> bool {
        self.fully_conceptual
    }

    /// Earliest appearance of the pattern, clipped to the series span.
    pub fn pattern_start(&self) -> Option<NaiveDateTime> {
        self.pattern_start
    }

    /// Latest appearance of the pattern, clipped to the series span.
    pub fn pattern_end(&self) -> Option<NaiveDateTime> {
        self.pattern_end
    }

    pub fn include_end(&self) -> bool {
        self.include_end
    }

    /// Total time the range covers.
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Whether the range includes the given timestamp. Interval ends are
    /// exclusive except for a pattern end that overshot the series end.
    pub fn contains(&self, timestamp: DateTime<Utc>) -> bool {
        if self.fully_conceptual {
            return true;
        }

        for &(start, end) in &self.intervals {
            if timestamp >= start && timestamp < end {
                return true;
            }
            if timestamp == end
                && self.include_end
                && self
                    .pattern_end
                    .is_some_and(|p| timestamp == p.and_utc())
            {
                return true;
            }
        }
        false
    }

    /// Heuristic overlap test between two ranges, used to reject candidates
    /// whose constraint sets describe the same moments twice.
    pub fn is_same_range(&self, other: &RecurrenceRange) -> bool {
        if !self.valid || !other.valid {
            return true;
        }

        let patterns = &self.patterns;
        let others = &other.patterns;

        // single constraint on each side
        if patterns.len() == 1 && others.len() == 1 {
            let (unit, target) = patterns[0];
            let (other_unit, other_target) = others[0];
            if unit == other_unit {
                match (target, other_target) {
                    (Some(a), Some(b)) => return a == b,
                    (Some(_), None) | (None, Some(_)) => return true,
                    (None, None) => {}
                }
            } else {
                return true;
            }
        }

        // identical pattern sequences
        if patterns == others {
            return true;
        }

        // disjoint unit sets never collide
        let shared_unit = patterns
            .iter()
            .any(|&(unit, _)| others.iter().any(|&(other_unit, _)| unit == other_unit));
        if !shared_unit {
            return true;
        }

        // shared target on a shared unit; a later same-unit constraint
        // replaces the earlier one's target set
        let mut targets: Vec<(CalendarUnit, Vec<i64>)> = Vec::new();
        for &(unit, target) in patterns {
            targets.retain(|&(u, _)| u != unit);
            let mut values = Vec::new();
            if let Some(value) = target {
                values.push(value);
            }
            targets.push((unit, values));
        }
        for &(other_unit, other_target) in others {
            if let Some(value) = other_target {
                if targets
                    .iter()
                    .any(|&(u, ref vs)| u == other_unit && vs.contains(&value))
                {
                    return true;
                }
            }
        }

        // positional walk, finer side advancing to catch up; running off
        // the end means the sequences never lined up
        let mut i = 0;
        let mut z = 0;
        while i < patterns.len() {
            let (unit, target) = patterns[i];
            let Some(&(other_unit, other_target)) = others.get(z) else {
                return false;
            };
            z += 1;

            if unit == other_unit {
                return match (target, other_target) {
                    (Some(a), Some(b)) => a == b,
                    _ => true,
                };
            } else if unit > other_unit {
                z -= 1;
                i += 1;
            }
            // unit < other_unit: retry the same position against the next
            // constraint on the other side
        }
        false
    }
}

struct Sweep<'a> {
    series: &'a TimeSeries,
    patterns: &'a [(CalendarUnit, Option<i64>)],
    smallest: usize,
    limit_unit: CalendarUnit,
    fully_conceptual: bool,
    intervals: Vec<(NaiveDateTime, NaiveDateTime)>,
    pattern_start: Option<NaiveDateTime>,
    pattern_end: Option<NaiveDateTime>,
    include_end: bool,
    search: bool,
    temp_skip: Option<CalendarUnit>,
}

impl Sweep<'_> {
    fn run(&mut self) {
        let end_time = self.series.end_date_time();
        let mut itr = self.series.begin_date_time();

        debug!("starting range sweep over {} constraints", self.patterns.len());
        while self.search && itr <= end_time {
            for idx in 0..self.patterns.len() {
                let (unit, target) = self.patterns[idx];
                if let Some(skip) = self.temp_skip {
                    if idx != self.smallest && unit == skip {
                        continue;
                    }
                }
                self.temp_skip = None;

                trace!("cursor at {itr} for {unit:?}");
                itr = self.progress(end_time, itr, unit, target);
            }
        }
        debug!("finished range sweep");
    }

    fn progress(
        &mut self,
        end_time: NaiveDateTime,
        itr: NaiveDateTime,
        unit: CalendarUnit,
        target: Option<i64>,
    ) -> NaiveDateTime {
        let start_itr = itr;
        let mut itr = calendar::truncate(itr, unit).unwrap_or(itr);
        if itr < start_itr {
            itr = start_itr;
        }

        let itr_start = itr;
        if !self.all_match(itr) {
            if self.is_multi_unit(unit) {
                if self.any_unit_match(itr, unit) {
                    self.temp_skip = Some(unit);
                    return itr;
                } else if self.past_match(itr, unit, target) && !self.all_past_match(itr, unit) {
                    return itr;
                }
            }

            if let Some(value) = target {
                let adjusted = calendar::set_field(itr, unit, value);
                let truncated = calendar::truncate_or_start(adjusted, unit);
                let as_time = if truncated < start_itr { adjusted } else { truncated };

                if as_time < itr {
                    // passed this cycle; skip to the next occurrence
                    let parent = unit.parent();
                    let advanced = calendar::add(as_time, 1, parent);
                    let truncated = calendar::truncate_or_start(advanced, unit);
                    let desired = if truncated < start_itr { advanced } else { truncated };

                    let until = calendar::between(itr, desired, unit);
                    if until == 0 {
                        itr = desired;
                    } else {
                        itr = calendar::add(itr, until, unit);
                    }
                } else {
                    itr = as_time;
                }
            }

            if self.is_multi_unit(unit) && self.any_unit_match(itr, unit) {
                self.temp_skip = Some(unit);
            }
            return itr;
        }

        if let Some(value) = target {
            if unit == self.patterns[self.smallest].0 {
                if calendar::field_value(itr, unit) == value && self.pattern_start.is_none() {
                    self.pattern_start = Some(itr);
                }

                itr = calendar::add(itr, 1, unit);
                itr = match calendar::truncate(itr, unit) {
                    Some(truncated) => truncated,
                    None if unit == CalendarUnit::Months => calendar::start_of_month(itr),
                    None => itr,
                };
                if itr < start_itr {
                    itr = calendar::add(itr, 1, unit);
                }

                if itr > end_time {
                    self.include_end = itr != end_time;
                }
                self.add_range(itr_start, itr);
                self.pattern_end = Some(itr);
            }
        } else {
            if self.pattern_start.is_none() {
                self.pattern_start = Some(itr);
            }

            if unit == self.patterns[self.smallest].0 {
                if self.fully_conceptual {
                    // nothing constrains anything; one interval covers it
                    self.add_range(itr, end_time);
                    self.pattern_end = Some(end_time);
                    self.include_end = true;
                    self.search = false;
                } else {
                    let parent = self.local_parent(unit);
                    let mut desired = calendar::add(itr, 1, parent);
                    if desired > end_time {
                        desired = end_time;
                        self.include_end = false;
                        self.search = false;
                    }
                    let until = calendar::between(itr, desired, unit);
                    itr = calendar::add(itr, until, unit);
                    self.add_range(itr_start, itr);
                    self.pattern_end = Some(itr);
                }
            }
        }
        itr
    }

    /// The unit the cursor advances by when the current unit is
    /// unconstrained: the nearest ancestor that carries a target, bounded
    /// by the series limit unit.
    fn local_parent(&self, unit: CalendarUnit) -> CalendarUnit {
        if unit == self.limit_unit {
            return self.limit_unit;
        }
        let mut parent = unit.parent();
        loop {
            let targeted = self
                .patterns
                .iter()
                .any(|&(u, target)| u == parent && target.is_some());
            if targeted || parent == self.limit_unit {
                return parent;
            }
            parent = parent.parent();
        }
    }

    fn add_range(&mut self, start: NaiveDateTime, end: NaiveDateTime) {
        let start = start.max(self.series.begin_date_time());
        let end = end.min(self.series.end_date_time());

        if let Some(last) = self.intervals.last_mut() {
            if last.1 == start {
                last.1 = end;
                return;
            }
        }
        self.intervals.push((start, end));
    }

    /// Every constrained unit has at least one constraint the cursor
    /// satisfies.
    fn all_match(&self, itr: NaiveDateTime) -> bool {
        let mut units: Vec<CalendarUnit> = self.patterns.iter().map(|&(u, _)| u).collect();
        units.dedup();
        units.iter().all(|&unit| self.any_unit_match(itr, unit))
    }

    fn is_multi_unit(&self, unit: CalendarUnit) -> bool {
        self.patterns.iter().filter(|&&(u, _)| u == unit).count() > 1
    }

    fn any_unit_match(&self, itr: NaiveDateTime, unit: CalendarUnit) -> bool {
        self.patterns
            .iter()
            .filter(|&&(u, _)| u == unit)
            .any(|&(u, target)| {
                target.is_none_or(|value| calendar::field_value(itr, u) == value)
            })
    }

    fn past_match(&self, itr: NaiveDateTime, unit: CalendarUnit, target: Option<i64>) -> bool {
        target.is_none_or(|value| calendar::field_value(itr, unit) > value)
    }

    fn all_past_match(&self, itr: NaiveDateTime, unit: CalendarUnit) -> bool {
        self.patterns
            .iter()
            .filter(|&&(u, _)| u == unit)
            .filter_map(|&(_, target)| target)
            .all(|value| calendar::field_value(itr, unit) >= value)
    }
}
