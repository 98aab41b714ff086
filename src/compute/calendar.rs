//! Calendar arithmetic over UTC wall-clock datetimes.
//!
//! Field extraction, truncation, unit addition, and whole-unit distances
//! on `NaiveDateTime`, with ISO semantics: day-of-week runs Monday=1 to
//! Sunday=7, week-of-month is the aligned week `((day - 1) / 7) + 1`, and
//! month/year addition clamps the day to the end of the target month.

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Timelike};

use crate::schema::CalendarUnit;

const NANOS_PER_MICRO: u32 = 1_000;
const NANOS_PER_MILLI: u32 = 1_000_000;

/// Extract the calendar field a unit constrains.
///
/// Panics for units coarser than years; no field is defined for them and
/// asking is a programmer error.
pub fn field_value(dt: NaiveDateTime, unit: CalendarUnit) -> i64 {
    match unit {
        CalendarUnit::Nanos => i64::from(dt.nanosecond()),
        CalendarUnit::Micros => i64::from(dt.nanosecond() / NANOS_PER_MICRO),
        CalendarUnit::Millis => i64::from(dt.nanosecond() / NANOS_PER_MILLI),
        CalendarUnit::Seconds => i64::from(dt.second()),
        CalendarUnit::Minutes => i64::from(dt.minute()),
        CalendarUnit::Hours => i64::from(dt.hour()),
        CalendarUnit::Days => i64::from(dt.weekday().number_from_monday()),
        CalendarUnit::Weeks => i64::from((dt.day() - 1) / 7 + 1),
        CalendarUnit::Months => i64::from(dt.month()),
        CalendarUnit::Years => i64::from(dt.year()),
        _ => panic!("no calendar field for unit {unit:?}"),
    }
}

/// Truncate to the start of the given unit.
///
/// Returns `None` for weeks and coarser, which have no uniform truncation;
/// callers special-case months and years to the first day at midnight.
pub fn truncate(dt: NaiveDateTime, unit: CalendarUnit) -> Option<NaiveDateTime> {
    let nanos = dt.nanosecond();
    match unit {
        CalendarUnit::Nanos => Some(dt),
        CalendarUnit::Micros => dt.with_nanosecond(nanos - nanos % NANOS_PER_MICRO),
        CalendarUnit::Millis => dt.with_nanosecond(nanos - nanos % NANOS_PER_MILLI),
        CalendarUnit::Seconds => dt.with_nanosecond(0),
        CalendarUnit::Minutes => dt.with_nanosecond(0).and_then(|d| d.with_second(0)),
        CalendarUnit::Hours => dt
            .with_nanosecond(0)
            .and_then(|d| d.with_second(0))
            .and_then(|d| d.with_minute(0)),
        CalendarUnit::Days => Some(dt.date().and_hms_opt(0, 0, 0)?),
        _ => None,
    }
}

/// Truncate to the start of the given unit, falling back to the first day
/// of the month or year for those two units and leaving the datetime
/// untouched for any other unit without a uniform truncation.
pub fn truncate_or_start(dt: NaiveDateTime, unit: CalendarUnit) -> NaiveDateTime {
    match truncate(dt, unit) {
        Some(truncated) => truncated,
        None => match unit {
            CalendarUnit::Years => start_of_year(dt),
            CalendarUnit::Months => start_of_month(dt),
            _ => dt,
        },
    }
}

/// First day of the datetime's month, at midnight.
pub fn start_of_month(dt: NaiveDateTime) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(dt.year(), dt.month(), 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or(dt)
}

/// First day of the datetime's year, at midnight.
pub fn start_of_year(dt: NaiveDateTime) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(dt.year(), 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or(dt)
}

fn last_day_of_month(year: i32, month: u32) -> u32 {
    let (next_y, next_m) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_y, next_m, 1)
        .and_then(|d| d.pred_opt())
        .map(|d| d.day())
        .unwrap_or(28)
}

fn add_months(dt: NaiveDateTime, amount: i64) -> NaiveDateTime {
    let total = i64::from(dt.year()) * 12 + i64::from(dt.month()) - 1 + amount;
    let year = total.div_euclid(12) as i32;
    let month = (total.rem_euclid(12) + 1) as u32;
    let day = dt.day().min(last_day_of_month(year, month));
    NaiveDate::from_ymd_opt(year, month, day)
        .map(|d| d.and_time(dt.time()))
        .unwrap_or_else(|| panic!("datetime out of range adding {amount} months to {dt}"))
}

/// Add a signed number of whole units.
///
/// Panics when the result falls outside chrono's representable range or the
/// unit has no defined addition (eras).
pub fn add(dt: NaiveDateTime, amount: i64, unit: CalendarUnit) -> NaiveDateTime {
    let time_based = |d: Duration| {
        dt.checked_add_signed(d)
            .unwrap_or_else(|| panic!("datetime out of range adding {amount} {unit:?} to {dt}"))
    };
    match unit {
        CalendarUnit::Nanos => time_based(Duration::nanoseconds(amount)),
        CalendarUnit::Micros => time_based(Duration::microseconds(amount)),
        CalendarUnit::Millis => time_based(Duration::milliseconds(amount)),
        CalendarUnit::Seconds => time_based(Duration::seconds(amount)),
        CalendarUnit::Minutes => time_based(Duration::minutes(amount)),
        CalendarUnit::Hours => time_based(Duration::hours(amount)),
        CalendarUnit::Days => time_based(Duration::days(amount)),
        CalendarUnit::Weeks => time_based(Duration::weeks(amount)),
        CalendarUnit::Months => add_months(dt, amount),
        CalendarUnit::Years => add_months(dt, amount * 12),
        CalendarUnit::Decades => add_months(dt, amount * 120),
        CalendarUnit::Centuries => add_months(dt, amount * 1_200),
        CalendarUnit::Millennia => add_months(dt, amount * 12_000),
        CalendarUnit::Eras => panic!("no calendar addition for unit Eras"),
    }
}

fn whole_months_between(a: NaiveDateTime, b: NaiveDateTime) -> i64 {
    let mut months = (i64::from(b.year()) - i64::from(a.year())) * 12
        + (i64::from(b.month()) - i64::from(a.month()));
    if months > 0 && add_months(a, months) > b {
        months -= 1;
    } else if months < 0 && add_months(a, months) < b {
        months += 1;
    }
    months
}

/// Whole units between two datetimes, truncated toward zero.
pub fn between(a: NaiveDateTime, b: NaiveDateTime, unit: CalendarUnit) -> i64 {
    let delta = b - a;
    match unit {
        CalendarUnit::Nanos => delta.num_nanoseconds().unwrap_or_else(|| {
            panic!("nanosecond distance between {a} and {b} overflows")
        }),
        CalendarUnit::Micros => delta.num_microseconds().unwrap_or_else(|| {
            panic!("microsecond distance between {a} and {b} overflows")
        }),
        CalendarUnit::Millis => delta.num_milliseconds(),
        CalendarUnit::Seconds => delta.num_seconds(),
        CalendarUnit::Minutes => delta.num_minutes(),
        CalendarUnit::Hours => delta.num_hours(),
        CalendarUnit::Days => delta.num_days(),
        CalendarUnit::Weeks => delta.num_weeks(),
        CalendarUnit::Months => whole_months_between(a, b),
        CalendarUnit::Years => whole_months_between(a, b) / 12,
        CalendarUnit::Decades => whole_months_between(a, b) / 120,
        CalendarUnit::Centuries => whole_months_between(a, b) / 1_200,
        CalendarUnit::Millennia => whole_months_between(a, b) / 12_000,
        CalendarUnit::Eras => panic!("no calendar distance for unit Eras"),
    }
}

/// Set the calendar field a unit constrains, leaving finer fields intact.
///
/// Day-of-week and week-of-month adjust relative to the current value;
/// month and year adjustments clamp the day to the end of the target month.
pub fn set_field(dt: NaiveDateTime, unit: CalendarUnit, value: i64) -> NaiveDateTime {
    let adjusted = match unit {
        CalendarUnit::Nanos => dt.with_nanosecond(value as u32),
        CalendarUnit::Micros => {
            let sub_micro = dt.nanosecond() % NANOS_PER_MICRO;
            dt.with_nanosecond(value as u32 * NANOS_PER_MICRO + sub_micro)
        }
        CalendarUnit::Millis => {
            let sub_milli = dt.nanosecond() % NANOS_PER_MILLI;
            dt.with_nanosecond(value as u32 * NANOS_PER_MILLI + sub_milli)
        }
        CalendarUnit::Seconds => dt.with_second(value as u32),
        CalendarUnit::Minutes => dt.with_minute(value as u32),
        CalendarUnit::Hours => dt.with_hour(value as u32),
        CalendarUnit::Days => {
            let current = i64::from(dt.weekday().number_from_monday());
            return add(dt, value - current, CalendarUnit::Days);
        }
        CalendarUnit::Weeks => {
            let current = i64::from((dt.day() - 1) / 7 + 1);
            return add(dt, value - current, CalendarUnit::Weeks);
        }
        CalendarUnit::Months => {
            let current = i64::from(dt.month());
            return add_months(dt, value - current);
        }
        CalendarUnit::Years => {
            let current = i64::from(dt.year());
            return add_months(dt, (value - current) * 12);
        }
        _ => panic!("no calendar field for unit {unit:?}"),
    };
    adjusted.unwrap_or_else(|| panic!("value {value} out of range for {unit:?} in {dt}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dt(s: &str) -> NaiveDateTime {
        s.parse().unwrap()
    }

    #[test]
    fn test_field_values() {
        let t = dt("2011-11-04T08:48:11");
        assert_eq!(field_value(t, CalendarUnit::Years), 2011);
        assert_eq!(field_value(t, CalendarUnit::Months), 11);
        // 2011-11-04 is a Friday in the first aligned week
        assert_eq!(field_value(t, CalendarUnit::Days), 5);
        assert_eq!(field_value(t, CalendarUnit::Weeks), 1);
        assert_eq!(field_value(t, CalendarUnit::Hours), 8);
        assert_eq!(field_value(t, CalendarUnit::Seconds), 11);
    }

    #[test]
    fn test_truncate() {
        let t = dt("2011-11-04T08:48:11");
        assert_eq!(
            truncate(t, CalendarUnit::Hours),
            Some(dt("2011-11-04T08:00:00"))
        );
        assert_eq!(
            truncate(t, CalendarUnit::Days),
            Some(dt("2011-11-04T00:00:00"))
        );
        assert_eq!(truncate(t, CalendarUnit::Months), None);
        assert_eq!(start_of_month(t), dt("2011-11-01T00:00:00"));
        assert_eq!(start_of_year(t), dt("2011-01-01T00:00:00"));
    }

    #[test]
    fn test_add_months_clamps_day() {
        assert_eq!(
            add(dt("2011-01-31T10:00:00"), 1, CalendarUnit::Months),
            dt("2011-02-28T10:00:00")
        );
        assert_eq!(
            add(dt("2012-02-29T00:00:00"), 1, CalendarUnit::Years),
            dt("2013-02-28T00:00:00")
        );
    }

    #[test]
    fn test_between_whole_units() {
        let a = dt("2011-11-04T08:48:11");
        let b = dt("2012-11-02T09:23:16");
        // two days short of a full year
        assert_eq!(between(a, b, CalendarUnit::Years), 0);
        assert_eq!(between(a, b, CalendarUnit::Months), 11);
        assert_eq!(
            between(a, dt("2012-11-04T08:48:11"), CalendarUnit::Years),
            1
        );
        assert_eq!(between(a, b, CalendarUnit::Days), 364);
    }

    #[test]
    fn test_set_field() {
        let t = dt("2011-11-04T08:48:11");
        assert_eq!(
            set_field(t, CalendarUnit::Hours, 9),
            dt("2011-11-04T09:48:11")
        );
        // Friday -> Monday walks back four days
        assert_eq!(
            set_field(t, CalendarUnit::Days, 1),
            dt("2011-10-31T08:48:11")
        );
        assert_eq!(
            set_field(t, CalendarUnit::Years, 2015),
            dt("2015-11-04T08:48:11")
        );
    }
}
