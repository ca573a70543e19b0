//! Slot candidate generation for a single day.

use chrono::NaiveDate;
use chrono_tz::Tz;

use autoscuola_core::lesson::LessonType;
use autoscuola_core::time::{align_up_to_slot, instant_at_minute, TimeOfDayWindow, SLOT_MINUTES};
use autoscuola_core::types::Timestamp;

/// A candidate lesson start: the local minute-of-day and its UTC instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotCandidate {
    pub start_minute: i32,
    pub starts_at: Timestamp,
}

/// Enumerate quantized candidate starts inside `window` on `date`.
///
/// Starts are aligned to the 30-minute grid and the whole lesson must fit
/// inside the window. A lesson-type sub-window (night/highway policy) is
/// intersected in before enumeration. A window shorter than the duration
/// yields an empty list, which is a normal outcome, not an error.
pub fn day_candidates(
    tz: Tz,
    date: NaiveDate,
    window: &TimeOfDayWindow,
    duration_minutes: i32,
    lesson_type: LessonType,
) -> Vec<SlotCandidate> {
    let effective = match lesson_type.allowed_window() {
        Some(policy) => match window.intersect(&policy) {
            Some(w) => w,
            None => return Vec::new(),
        },
        None => *window,
    };

    let mut candidates = Vec::new();
    let mut minute = align_up_to_slot(effective.start_minute);
    while minute + duration_minutes <= effective.end_minute {
        // A start swallowed by a DST gap simply isn't offered that day.
        if let Some(starts_at) = instant_at_minute(tz, date, minute) {
            candidates.push(SlotCandidate {
                start_minute: minute,
                starts_at,
            });
        }
        minute += SLOT_MINUTES;
    }
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use chrono_tz::Europe::Rome;

    fn window(start: i32, end: i32) -> TimeOfDayWindow {
        TimeOfDayWindow {
            start_minute: start,
            end_minute: end,
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn quantized_starts_inside_the_window() {
        // 09:00-11:00, 30-minute lesson: starts at 09:00, 09:30, 10:00, 10:30.
        let c = day_candidates(Rome, date(2025, 6, 10), &window(540, 660), 30, LessonType::Standard);
        let minutes: Vec<i32> = c.iter().map(|s| s.start_minute).collect();
        assert_eq!(minutes, vec![540, 570, 600, 630]);
        // First instant is 09:00 Rome = 07:00 UTC in June.
        assert_eq!(
            c[0].starts_at,
            Utc.with_ymd_and_hms(2025, 6, 10, 7, 0, 0).unwrap()
        );
    }

    #[test]
    fn duration_must_fit_entirely() {
        // 09:00-10:00, 60-minute lesson: only 09:00 works.
        let c = day_candidates(Rome, date(2025, 6, 10), &window(540, 600), 60, LessonType::Standard);
        assert_eq!(c.len(), 1);
        assert_eq!(c[0].start_minute, 540);
    }

    #[test]
    fn degenerate_window_yields_empty_list() {
        let c = day_candidates(Rome, date(2025, 6, 10), &window(540, 560), 30, LessonType::Standard);
        assert!(c.is_empty());
    }

    #[test]
    fn unaligned_window_start_is_rounded_up() {
        // Window opens 09:10: first grid start inside it is 09:30.
        let c = day_candidates(Rome, date(2025, 6, 10), &window(550, 660), 30, LessonType::Standard);
        assert_eq!(c[0].start_minute, 570);
    }

    #[test]
    fn night_policy_excludes_daytime_candidates() {
        // Owner available 17:00-22:00; night lessons may only run 19:00-24:00.
        let c = day_candidates(
            Rome,
            date(2025, 6, 10),
            &window(17 * 60, 22 * 60),
            60,
            LessonType::Night,
        );
        assert!(c.iter().all(|s| s.start_minute >= 19 * 60));
        assert_eq!(c.first().map(|s| s.start_minute), Some(19 * 60));
        assert_eq!(c.last().map(|s| s.start_minute), Some(21 * 60));
    }

    #[test]
    fn disjoint_policy_window_yields_empty_list() {
        // Morning-only owner can never take a night lesson.
        let c = day_candidates(Rome, date(2025, 6, 10), &window(540, 720), 30, LessonType::Night);
        assert!(c.is_empty());
    }
}
