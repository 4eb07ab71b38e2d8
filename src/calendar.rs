//! Simulation days, dates and times of day.
//!
//! Day 1 is the configured start date. Event times inside a day are seconds since midnight;
//! absolute times are `day * SECONDS_PER_DAY + seconds`.
use chrono::{Datelike, Days, NaiveDate, Weekday};

pub const SECONDS_PER_DAY: f64 = 86_400.0;

/// The calendar date of simulation day `day` (day 1 is `start`).
#[must_use]
pub fn date_for_day(start: NaiveDate, day: u32) -> NaiveDate {
    start
        .checked_add_days(Days::new(u64::from(day.saturating_sub(1))))
        .unwrap_or(NaiveDate::MAX)
}

#[must_use]
pub fn weekday_for_day(start: NaiveDate, day: u32) -> Weekday {
    date_for_day(start, day).weekday()
}

/// Converts a time of day on simulation day `day` into absolute seconds. Times past midnight
/// are clamped to the end of the day.
#[must_use]
pub fn absolute_time(day: u32, seconds: f64) -> f64 {
    f64::from(day) * SECONDS_PER_DAY + seconds.clamp(0.0, SECONDS_PER_DAY)
}

/// The simulation day an absolute time falls on.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn day_of(time: f64) -> u32 {
    (time / SECONDS_PER_DAY).floor().max(0.0) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn day_one_is_start_date() {
        let start = NaiveDate::from_ymd_opt(2020, 2, 24).unwrap();
        assert_eq!(date_for_day(start, 1), start);
        assert_eq!(
            date_for_day(start, 8),
            NaiveDate::from_ymd_opt(2020, 3, 2).unwrap()
        );
        assert_eq!(weekday_for_day(start, 1), Weekday::Mon);
        assert_eq!(weekday_for_day(start, 7), Weekday::Sun);
    }

    #[test]
    fn times_round_trip_to_days() {
        assert_eq!(absolute_time(3, 3600.0), 3.0 * SECONDS_PER_DAY + 3600.0);
        assert_eq!(absolute_time(3, 100_000.0), 4.0 * SECONDS_PER_DAY);
        assert_eq!(day_of(absolute_time(3, 3600.0)), 3);
        assert_eq!(day_of(absolute_time(3, 0.0)), 3);
        assert_eq!(day_of(-5.0), 0);
    }
}
