//! Wall-clock and slot arithmetic.
//!
//! Appointments are quantized to 30-minute slots. Weekly availability rules
//! are expressed as (weekday set, start-minute, end-minute) in the company's
//! local time zone; everything persisted is UTC. Busy time is handled as
//! half-open `[start, end)` intervals in epoch milliseconds.

use chrono::{Datelike, Duration, NaiveDate, TimeZone, Timelike, Utc, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::Timestamp;

/// Booking granularity in minutes. All starts and durations are multiples.
pub const SLOT_MINUTES: i32 = 30;

/// Minimum lesson duration in minutes.
pub const MIN_LESSON_MINUTES: i32 = 30;

/// Minutes in a day.
pub const MINUTES_PER_DAY: i32 = 24 * 60;

// ---------------------------------------------------------------------------
// WeekdaySet
// ---------------------------------------------------------------------------

/// Set of active weekdays, stored as a 7-bit mask (bit 0 = Monday).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeekdaySet(u8);

impl WeekdaySet {
    /// The empty set.
    pub const EMPTY: WeekdaySet = WeekdaySet(0);

    /// Monday through Friday.
    pub const WEEKDAYS: WeekdaySet = WeekdaySet(0b001_1111);

    pub fn from_days(days: &[Weekday]) -> Self {
        let mut set = Self::EMPTY;
        for day in days {
            set = set.with(*day);
        }
        set
    }

    pub fn with(self, day: Weekday) -> Self {
        WeekdaySet(self.0 | (1 << day.num_days_from_monday()))
    }

    pub fn contains(&self, day: Weekday) -> bool {
        self.0 & (1 << day.num_days_from_monday()) != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Database representation (SMALLINT).
    pub fn bits(&self) -> i16 {
        i16::from(self.0)
    }

    /// Rebuild from the database representation; extra bits are ignored.
    pub fn from_bits(bits: i16) -> Self {
        WeekdaySet((bits as u16 & 0b111_1111) as u8)
    }
}

// ---------------------------------------------------------------------------
// TimeOfDayWindow
// ---------------------------------------------------------------------------

/// A `[start_minute, end_minute)` range within a single day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeOfDayWindow {
    pub start_minute: i32,
    pub end_minute: i32,
}

impl TimeOfDayWindow {
    pub fn new(start_minute: i32, end_minute: i32) -> Result<Self, CoreError> {
        if start_minute < 0 || end_minute > MINUTES_PER_DAY || start_minute >= end_minute {
            return Err(CoreError::Validation(format!(
                "invalid time-of-day window [{start_minute}, {end_minute})"
            )));
        }
        Ok(TimeOfDayWindow {
            start_minute,
            end_minute,
        })
    }

    /// Whether a lesson of `duration_minutes` starting at `start_minute`
    /// fits entirely inside the window.
    pub fn fits(&self, start_minute: i32, duration_minutes: i32) -> bool {
        start_minute >= self.start_minute && start_minute + duration_minutes <= self.end_minute
    }

    /// Intersection with another window; `None` when disjoint or degenerate.
    pub fn intersect(&self, other: &TimeOfDayWindow) -> Option<TimeOfDayWindow> {
        let start = self.start_minute.max(other.start_minute);
        let end = self.end_minute.min(other.end_minute);
        (start < end).then_some(TimeOfDayWindow {
            start_minute: start,
            end_minute: end,
        })
    }
}

// ---------------------------------------------------------------------------
// Interval
// ---------------------------------------------------------------------------

/// Half-open `[start, end)` interval in epoch milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interval {
    pub start_ms: i64,
    pub end_ms: i64,
}

impl Interval {
    pub fn new(start_ms: i64, end_ms: i64) -> Self {
        Interval { start_ms, end_ms }
    }

    pub fn from_times(starts_at: Timestamp, ends_at: Timestamp) -> Self {
        Interval {
            start_ms: starts_at.timestamp_millis(),
            end_ms: ends_at.timestamp_millis(),
        }
    }

    pub fn overlaps(&self, other: &Interval) -> bool {
        self.start_ms < other.end_ms && other.start_ms < self.end_ms
    }

    /// This interval starts exactly where `other` ends.
    pub fn starts_at_end_of(&self, other: &Interval) -> bool {
        self.start_ms == other.end_ms
    }

    /// This interval ends exactly where `other` starts.
    pub fn ends_at_start_of(&self, other: &Interval) -> bool {
        self.end_ms == other.start_ms
    }
}

// ---------------------------------------------------------------------------
// Zoned wall-clock helpers
// ---------------------------------------------------------------------------

/// Parse an IANA time zone name (e.g. `Europe/Rome`).
pub fn parse_time_zone(name: &str) -> Result<Tz, CoreError> {
    name.parse::<Tz>()
        .map_err(|_| CoreError::Validation(format!("unknown time zone: {name}")))
}

/// The calendar date of `at` in the given time zone.
pub fn local_date(tz: Tz, at: Timestamp) -> NaiveDate {
    at.with_timezone(&tz).date_naive()
}

/// The weekday of `at` in the given time zone.
pub fn local_weekday(tz: Tz, at: Timestamp) -> Weekday {
    at.with_timezone(&tz).weekday()
}

/// Minute-of-day of `at` in the given time zone.
pub fn local_minute_of_day(tz: Tz, at: Timestamp) -> i32 {
    let local = at.with_timezone(&tz);
    (local.hour() * 60 + local.minute()) as i32
}

/// The UTC instant of `minute` minutes past local midnight on `date`.
///
/// Minutes past 1440 roll into the following day, so a window ending at
/// 24:00 resolves to the next local midnight. Ambiguous instants (DST
/// fall-back) resolve to the earliest mapping; nonexistent instants (DST
/// spring-forward gap) return `None` and the caller skips that candidate.
pub fn instant_at_minute(tz: Tz, date: NaiveDate, minute: i32) -> Option<Timestamp> {
    let day = date + Duration::days(i64::from(minute.div_euclid(MINUTES_PER_DAY)));
    let minute = minute.rem_euclid(MINUTES_PER_DAY);
    let naive = day.and_hms_opt(minute as u32 / 60, minute as u32 % 60, 0)?;
    tz.from_local_datetime(&naive)
        .earliest()
        .map(|zoned| zoned.with_timezone(&Utc))
}

/// Whether a minute-of-day value falls on the slot grid.
pub fn slot_aligned(minute: i32) -> bool {
    minute % SLOT_MINUTES == 0
}

/// Round a minute-of-day value up to the next slot boundary.
pub fn align_up_to_slot(minute: i32) -> i32 {
    minute + (SLOT_MINUTES - minute.rem_euclid(SLOT_MINUTES)) % SLOT_MINUTES
}

/// Validate a lesson duration: at least the minimum, on the slot grid.
pub fn validate_duration(duration_minutes: i32) -> Result<(), CoreError> {
    if duration_minutes < MIN_LESSON_MINUTES {
        return Err(CoreError::Validation(format!(
            "lesson duration must be at least {MIN_LESSON_MINUTES} minutes, got {duration_minutes}"
        )));
    }
    if duration_minutes % SLOT_MINUTES != 0 {
        return Err(CoreError::Validation(format!(
            "lesson duration must be a multiple of {SLOT_MINUTES} minutes, got {duration_minutes}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use chrono_tz::Europe::Rome;

    #[test]
    fn weekday_set_roundtrip() {
        let set = WeekdaySet::from_days(&[Weekday::Mon, Weekday::Wed, Weekday::Sat]);
        assert!(set.contains(Weekday::Mon));
        assert!(set.contains(Weekday::Wed));
        assert!(set.contains(Weekday::Sat));
        assert!(!set.contains(Weekday::Sun));
        assert_eq!(WeekdaySet::from_bits(set.bits()), set);
    }

    #[test]
    fn weekday_set_workweek_excludes_weekend() {
        assert!(WeekdaySet::WEEKDAYS.contains(Weekday::Fri));
        assert!(!WeekdaySet::WEEKDAYS.contains(Weekday::Sat));
        assert!(!WeekdaySet::WEEKDAYS.contains(Weekday::Sun));
    }

    #[test]
    fn window_rejects_degenerate_ranges() {
        assert!(TimeOfDayWindow::new(600, 600).is_err());
        assert!(TimeOfDayWindow::new(700, 600).is_err());
        assert!(TimeOfDayWindow::new(-10, 600).is_err());
        assert!(TimeOfDayWindow::new(0, 1441).is_err());
    }

    #[test]
    fn window_fits_checks_both_edges() {
        let w = TimeOfDayWindow::new(540, 720).unwrap(); // 09:00-12:00
        assert!(w.fits(540, 30));
        assert!(w.fits(690, 30));
        assert!(!w.fits(510, 30));
        assert!(!w.fits(700, 30));
    }

    #[test]
    fn window_intersection() {
        let a = TimeOfDayWindow::new(540, 720).unwrap();
        let b = TimeOfDayWindow::new(660, 1080).unwrap();
        let i = a.intersect(&b).unwrap();
        assert_eq!((i.start_minute, i.end_minute), (660, 720));

        let c = TimeOfDayWindow::new(720, 780).unwrap();
        assert!(a.intersect(&c).is_none());
    }

    #[test]
    fn intervals_overlap_half_open() {
        let a = Interval::new(0, 100);
        let b = Interval::new(100, 200);
        let c = Interval::new(50, 150);
        assert!(!a.overlaps(&b));
        assert!(a.overlaps(&c));
        assert!(b.overlaps(&c));
        assert!(b.starts_at_end_of(&a));
        assert!(a.ends_at_start_of(&b));
    }

    #[test]
    fn local_wall_clock_uses_company_zone() {
        // 2025-01-14 08:30 UTC is 09:30 in Rome (CET, +1).
        let at = Utc.with_ymd_and_hms(2025, 1, 14, 8, 30, 0).unwrap();
        assert_eq!(local_weekday(Rome, at), Weekday::Tue);
        assert_eq!(local_minute_of_day(Rome, at), 9 * 60 + 30);
    }

    #[test]
    fn instant_at_minute_converts_back_to_utc() {
        let date = NaiveDate::from_ymd_opt(2025, 6, 10).unwrap();
        // 10:00 local in Rome during CEST (+2) is 08:00 UTC.
        let at = instant_at_minute(Rome, date, 600).unwrap();
        assert_eq!(at, Utc.with_ymd_and_hms(2025, 6, 10, 8, 0, 0).unwrap());
    }

    #[test]
    fn instant_at_minute_rolls_past_midnight() {
        let date = NaiveDate::from_ymd_opt(2025, 6, 10).unwrap();
        let end_of_day = instant_at_minute(Rome, date, MINUTES_PER_DAY).unwrap();
        let next_midnight =
            instant_at_minute(Rome, date + Duration::days(1), 0).unwrap();
        assert_eq!(end_of_day, next_midnight);
    }

    #[test]
    fn spring_forward_gap_yields_none() {
        // Rome skips 02:00-03:00 on 2025-03-30.
        let date = NaiveDate::from_ymd_opt(2025, 3, 30).unwrap();
        assert!(instant_at_minute(Rome, date, 150).is_none());
        assert!(instant_at_minute(Rome, date, 180).is_some());
    }

    #[test]
    fn slot_alignment() {
        assert!(slot_aligned(0));
        assert!(slot_aligned(570));
        assert!(!slot_aligned(575));
        assert_eq!(align_up_to_slot(575), 600);
        assert_eq!(align_up_to_slot(600), 600);
    }

    #[test]
    fn duration_validation() {
        assert!(validate_duration(30).is_ok());
        assert!(validate_duration(90).is_ok());
        assert!(validate_duration(20).is_err());
        assert!(validate_duration(45).is_err());
    }
}
