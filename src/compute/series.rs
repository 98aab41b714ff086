//! Timestamp series: the observed events a recurrence search runs against.
//!
//! A series owns the calendar scale derived from its span and caches the
//! recurrence ranges and event counts computed for constraint sets during a
//! search.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use log::debug;
use rand::Rng;
use thiserror::Error;

use crate::compute::calendar;
use crate::compute::range::{RangeKey, RecurrenceRange};
use crate::schema::{CalendarScale, CalendarUnit, ConstraintSet};

/// Errors from series construction.
#[derive(Debug, Error)]
pub enum SeriesError {
    #[error("series requires at least two timestamps")]
    TooFewElements,
    #[error("series timestamps must be in ascending order")]
    Unordered,
    #[error("series spans zero nanoseconds")]
    ZeroDuration,
    #[error("series spans a millennium or more")]
    SpanTooLarge,
}

/// Candidate rungs for span classification, finest first. The span's first
/// rung measuring zero whole units bounds the units a search may use.
const CLASSIFY_ORDER: [CalendarUnit; 12] = [
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
];

/// Probe order for the advancement limit unit, coarsest first.
const LIMIT_ORDER: [CalendarUnit; 9] = [
    CalendarUnit::Decades,
    CalendarUnit::Years,
    CalendarUnit::Months,
    CalendarUnit::Days,
    CalendarUnit::Hours,
    CalendarUnit::Minutes,
    CalendarUnit::Seconds,
    CalendarUnit::Millis,
    CalendarUnit::Micros,
];

/// An ordered series of at least two UTC timestamps.
#[derive(Debug)]
pub struct TimeSeries {
    timestamps: Vec<DateTime<Utc>>,
    scale: CalendarScale,
    limit_unit: CalendarUnit,
    range_cache: RwLock<HashMap<RangeKey, Arc<RecurrenceRange>>>,
    count_cache: RwLock<HashMap<RangeKey, usize>>,
}

impl TimeSeries {
    /// Build a series, classifying its calendar scale from the span.
    ///
    /// Units at and above the first rung the span does not fill stay
    /// disabled; a search only ever describes the series in units the span
    /// can actually distinguish.
    pub fn new(timestamps: Vec<DateTime<Utc>>) -> Result<Self, SeriesError> {
        if timestamps.len() < 2 {
            return Err(SeriesError::TooFewElements);
        }
        if timestamps.windows(2).any(|w| w[0] > w[1]) {
            return Err(SeriesError::Unordered);
        }

        let begin = timestamps[0].naive_utc();
        let end = timestamps[timestamps.len() - 1].naive_utc();
        if begin == end {
            return Err(SeriesError::ZeroDuration);
        }

        let scale = CalendarScale::factual();
        let threshold = CLASSIFY_ORDER
            .iter()
            .copied()
            .find(|&unit| calendar::between(begin, end, unit) == 0)
            .ok_or(SeriesError::SpanTooLarge)?;
        for unit in CalendarUnit::ALL {
            if unit >= threshold {
                scale.disable(unit);
            }
        }

        let limit_unit = LIMIT_ORDER
            .iter()
            .copied()
            .find(|&unit| calendar::between(begin, end, unit) == 0)
            .unwrap_or(CalendarUnit::Nanos);
        debug!(
            "series of {} timestamps, span {} to {}, limit unit {limit_unit:?}",
            timestamps.len(),
            begin,
            end
        );

        Ok(Self {
            timestamps,
            scale,
            limit_unit,
            range_cache: RwLock::new(HashMap::new()),
            count_cache: RwLock::new(HashMap::new()),
        })
    }

    /// Synthesize a series spaced by a uniform random whole-unit gap in
    /// `min..=max`, inclusive of any timestamp landing on `end`.
    pub fn from_frequency<R: Rng>(
        rng: &mut R,
        min: i64,
        max: i64,
        unit: CalendarUnit,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Self, SeriesError> {
        let mut timestamps = Vec::new();
        let mut itr = start;
        while itr <= end {
            timestamps.push(itr);
            let gap = rng.gen_range(0..=max - min) + min;
            itr = DateTime::from_naive_utc_and_offset(
                calendar::add(itr.naive_utc(), gap, unit),
                Utc,
            );
        }
        Self::new(timestamps)
    }

    /// Synthesize a series with an exact whole-unit gap.
    pub fn from_exact_frequency<R: Rng>(
        rng: &mut R,
        frequency: i64,
        unit: CalendarUnit,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Self, SeriesError> {
        Self::from_frequency(rng, frequency, frequency, unit, start, end)
    }

    pub fn scale(&self) -> &CalendarScale {
        &self.scale
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn timestamps(&self) -> &[DateTime<Utc>] {
        &self.timestamps
    }

    pub fn timestamp(&self, position: usize) -> DateTime<Utc> {
        self.timestamps[position]
    }

    pub fn begin(&self) -> DateTime<Utc> {
        self.timestamps[0]
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.timestamps[self.timestamps.len() - 1]
    }

    /// Earliest timestamp as a UTC wall-clock datetime.
    pub fn begin_date_time(&self) -> NaiveDateTime {
        self.begin().naive_utc()
    }

    /// Latest timestamp as a UTC wall-clock datetime.
    pub fn end_date_time(&self) -> NaiveDateTime {
        self.end().naive_utc()
    }

    pub fn duration(&self) -> Duration {
        self.end() - self.begin()
    }

    /// The coarsest unit the series span does not fill a whole one of;
    /// bounds how far range advancement may climb the unit chain.
    pub fn limit_unit(&self) -> CalendarUnit {
        self.limit_unit
    }

    /// The recurrence range a constraint set's value constraints project
    /// onto this series, computed once per distinct value-pattern key.
    pub fn range(&self, set: &ConstraintSet) -> Arc<RecurrenceRange> {
        let key = RecurrenceRange::key_for(set);
        if let Some(range) = read(&self.range_cache).get(&key) {
            return Arc::clone(range);
        }

        let range = Arc::new(RecurrenceRange::compute(self, set));
        write(&self.range_cache)
            .entry(key)
            .or_insert(range)
            .clone()
    }

    /// Count of series timestamps the range includes, memoized per range.
    pub fn count_events_between(&self, range: &RecurrenceRange) -> usize {
        if let Some(&count) = read(&self.count_cache).get(range.key()) {
            return count;
        }
        if range.intervals().is_empty() {
            return 0;
        }
        debug!("counting events in range {:?}", range.key());

        let count = self
            .timestamps
            .iter()
            .filter(|&&ts| range.contains(ts))
            .count();
        write(&self.count_cache).insert(range.key().clone(), count);
        count
    }

    /// Distinct appearances of a unit across the range's pattern window,
    /// measured on unit-aligned boundaries.
    pub fn count_distinct_unit_appearances(
        &self,
        range: &RecurrenceRange,
        unit: CalendarUnit,
    ) -> i64 {
        let start = range.pattern_start().unwrap_or_else(|| self.begin_date_time());
        let end = range.pattern_end().unwrap_or_else(|| self.end_date_time());

        let start = calendar::truncate_or_start(start, unit);
        let end = calendar::add(calendar::truncate_or_start(end, unit), 1, unit);
        calendar::between(start, end, unit)
    }
}

fn read<'a, K, V>(lock: &'a RwLock<HashMap<K, V>>) -> std::sync::RwLockReadGuard<'a, HashMap<K, V>> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<'a, K, V>(
    lock: &'a RwLock<HashMap<K, V>>,
) -> std::sync::RwLockWriteGuard<'a, HashMap<K, V>> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn utc(s: &str) -> DateTime<Utc> {
        format!("{s}Z").parse().unwrap()
    }

    #[test]
    fn test_requires_two_elements() {
        assert!(matches!(
            TimeSeries::new(vec![utc("2011-11-04T08:48:11")]),
            Err(SeriesError::TooFewElements)
        ));
    }

    #[test]
    fn test_rejects_unordered() {
        let result = TimeSeries::new(vec![
            utc("2012-11-04T08:48:11"),
            utc("2011-11-04T08:48:11"),
        ]);
        assert!(matches!(result, Err(SeriesError::Unordered)));
    }

    #[test]
    fn test_rejects_zero_duration() {
        let t = utc("2011-11-04T08:48:11");
        assert!(matches!(
            TimeSeries::new(vec![t, t]),
            Err(SeriesError::ZeroDuration)
        ));
    }

    #[test]
    fn test_scale_classification_sub_minute() {
        // span under a minute: seconds and finer stay enabled
        let series = TimeSeries::new(vec![
            utc("2011-11-04T08:48:11"),
            utc("2011-11-04T08:48:41"),
        ])
        .unwrap();
        assert!(series.scale().is_enabled(CalendarUnit::Seconds));
        assert!(!series.scale().is_enabled(CalendarUnit::Minutes));
        assert!(!series.scale().is_enabled(CalendarUnit::Years));
    }

    #[test]
    fn test_scale_classification_multi_year() {
        let series = TimeSeries::new(vec![
            utc("2011-11-04T08:48:11"),
            utc("2016-11-04T08:48:11"),
        ])
        .unwrap();
        assert!(series.scale().is_enabled(CalendarUnit::Years));
        assert!(!series.scale().is_enabled(CalendarUnit::Decades));
        assert_eq!(series.limit_unit(), CalendarUnit::Decades);
    }

    #[test]
    fn test_scale_classification_multi_century() {
        // a span this wide overflows a nanosecond count; classification
        // must not measure it in sub-second units
        let series = TimeSeries::new(vec![
            utc("1700-01-01T00:00:00"),
            utc("2026-01-01T00:00:00"),
        ])
        .unwrap();
        assert!(series.scale().is_enabled(CalendarUnit::Centuries));
        assert!(!series.scale().is_enabled(CalendarUnit::Millennia));
    }

    #[test]
    fn test_from_exact_frequency_spacing() {
        let mut rng = StdRng::seed_from_u64(42);
        let series = TimeSeries::from_exact_frequency(
            &mut rng,
            30,
            CalendarUnit::Seconds,
            utc("2011-11-04T08:48:00"),
            utc("2011-11-04T08:52:00"),
        )
        .unwrap();
        assert_eq!(series.len(), 9);
        assert_eq!(series.timestamp(1) - series.timestamp(0), Duration::seconds(30));
        // the end lands exactly on a step and is included
        assert_eq!(series.end(), utc("2011-11-04T08:52:00"));
    }

    #[test]
    fn test_duration() {
        let series = TimeSeries::new(vec![
            utc("2011-11-04T08:48:11"),
            utc("2011-11-04T09:48:11"),
        ])
        .unwrap();
        assert_eq!(series.duration(), Duration::hours(1));
    }
}
