//! Resource matcher: intersects candidate slots across the student, every
//! active instructor, and every active vehicle, then scores feasible
//! combinations to prefer schedule-packing over fragmentation.
//!
//! Finding nothing is a normal outcome (`Ok(None)`) and makes the caller
//! retry later; it is never an error.

use std::sync::Arc;

use chrono::{Datelike, Duration};
use chrono_tz::Tz;

use autoscuola_core::lesson::LessonType;
use autoscuola_core::ports::DirectoryService;
use autoscuola_core::time::{local_date, Interval};
use autoscuola_core::types::{DbId, OwnerType, Timestamp};
use autoscuola_db::models::CompanySettings;
use autoscuola_db::DbPool;

use crate::availability::{AvailabilityIndex, OwnerAvailability};
use crate::candidates::day_candidates;
use crate::error::EngineResult;

/// Search parameters for a replacement slot.
#[derive(Debug, Clone)]
pub struct MatchQuery {
    pub duration_minutes: i32,
    pub lesson_type: LessonType,
    pub earliest_start: Timestamp,
    pub horizon_days: i64,
    /// Instructors not to re-offer (the resource that caused the cancel).
    pub excluded_instructors: Vec<DbId>,
    /// Vehicles not to re-offer.
    pub excluded_vehicles: Vec<DbId>,
    /// An exact interval not to re-propose (the slot that already failed).
    pub excluded_interval: Option<Interval>,
}

/// A feasible (day, time, instructor, vehicle) combination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotMatch {
    pub starts_at: Timestamp,
    pub ends_at: Timestamp,
    pub instructor_id: DbId,
    pub vehicle_id: DbId,
    pub score: i32,
}

/// In-memory inputs to the pure selection algorithm.
pub struct MatchContext {
    pub tz: Tz,
    pub student: OwnerAvailability,
    pub instructors: Vec<(DbId, OwnerAvailability)>,
    pub vehicles: Vec<(DbId, OwnerAvailability)>,
}

/// The best qualifying resource of one dimension for a slot, as
/// (owner id, adjacency score). Ties prefer the lowest id so selection is
/// deterministic.
fn best_resource(
    resources: &[(DbId, OwnerAvailability)],
    excluded: &[DbId],
    weekday: chrono::Weekday,
    start_minute: i32,
    duration_minutes: i32,
    slot: &Interval,
) -> Option<(DbId, i32)> {
    let mut best: Option<(DbId, i32)> = None;
    for (owner_id, owner) in resources {
        if excluded.contains(owner_id) {
            continue;
        }
        let Some(rule) = owner.rule else { continue };
        if !rule.allows(weekday, start_minute, duration_minutes) {
            continue;
        }
        if !owner.is_free(slot) {
            continue;
        }
        let score = owner.adjacency_score(slot);
        let better = match best {
            None => true,
            Some((best_id, best_score)) => {
                score > best_score || (score == best_score && *owner_id < best_id)
            }
        };
        if better {
            best = Some((*owner_id, score));
        }
    }
    best
}

/// Select the best feasible combination within the horizon.
///
/// Winner: highest combined adjacency score, tie-broken by earliest start,
/// then lowest instructor id, then lowest vehicle id. The heuristic lives
/// entirely in this function and [`best_resource`] so it can be replaced
/// without touching the search.
pub fn select_best(ctx: &MatchContext, query: &MatchQuery) -> Option<SlotMatch> {
    let student_rule = ctx.student.rule?;
    let first_day = local_date(ctx.tz, query.earliest_start);

    let mut best: Option<SlotMatch> = None;

    for offset in 0..=query.horizon_days {
        let date = first_day + Duration::days(offset);
        let weekday = date.weekday();
        if !student_rule.weekdays.contains(weekday) {
            continue;
        }

        for candidate in day_candidates(
            ctx.tz,
            date,
            &student_rule.window,
            query.duration_minutes,
            query.lesson_type,
        ) {
            if candidate.starts_at < query.earliest_start {
                continue;
            }
            let ends_at =
                candidate.starts_at + Duration::minutes(i64::from(query.duration_minutes));
            let slot = Interval::from_times(candidate.starts_at, ends_at);

            if query.excluded_interval.is_some_and(|excl| excl == slot) {
                continue;
            }
            if !ctx.student.is_free(&slot) {
                continue;
            }

            let Some((instructor_id, instructor_score)) = best_resource(
                &ctx.instructors,
                &query.excluded_instructors,
                weekday,
                candidate.start_minute,
                query.duration_minutes,
                &slot,
            ) else {
                continue;
            };
            let Some((vehicle_id, vehicle_score)) = best_resource(
                &ctx.vehicles,
                &query.excluded_vehicles,
                weekday,
                candidate.start_minute,
                query.duration_minutes,
                &slot,
            ) else {
                continue;
            };

            let found = SlotMatch {
                starts_at: candidate.starts_at,
                ends_at,
                instructor_id,
                vehicle_id,
                score: instructor_score + vehicle_score,
            };

            let better = match &best {
                None => true,
                Some(current) => {
                    found.score > current.score
                        || (found.score == current.score
                            && (found.starts_at, found.instructor_id, found.vehicle_id)
                                < (current.starts_at, current.instructor_id, current.vehicle_id))
                }
            };
            if better {
                best = Some(found);
            }
        }
    }

    best
}

/// Database-facing matcher: loads the availability snapshot, filters
/// resources through the directory, and runs [`select_best`].
pub struct ResourceMatcher {
    pool: DbPool,
    directory: Arc<dyn DirectoryService>,
}

impl ResourceMatcher {
    pub fn new(pool: DbPool, directory: Arc<dyn DirectoryService>) -> Self {
        Self { pool, directory }
    }

    /// Find the best replacement slot for a student within the horizon.
    pub async fn find_best(
        &self,
        settings: &CompanySettings,
        student_id: DbId,
        query: &MatchQuery,
    ) -> EngineResult<Option<SlotMatch>> {
        let tz = settings.tz()?;
        let company_id = settings.company_id;
        let from = query.earliest_start;
        let to = from + Duration::days(query.horizon_days + 1);

        let student = AvailabilityIndex::load_owner(
            &self.pool,
            company_id,
            OwnerType::Student,
            student_id,
            from,
            to,
        )
        .await?;

        let instructors = self
            .active_dimension(company_id, OwnerType::Instructor, from, to)
            .await?;
        let vehicles = self
            .active_dimension(company_id, OwnerType::Vehicle, from, to)
            .await?;

        let ctx = MatchContext {
            tz,
            student,
            instructors,
            vehicles,
        };
        Ok(select_best(&ctx, query))
    }

    /// Load one dimension's availability, keeping only directory-active
    /// owners.
    async fn active_dimension(
        &self,
        company_id: DbId,
        owner_type: OwnerType,
        from: Timestamp,
        to: Timestamp,
    ) -> EngineResult<Vec<(DbId, OwnerAvailability)>> {
        let loaded =
            AvailabilityIndex::load_dimension(&self.pool, company_id, owner_type, from, to).await?;

        let mut active = Vec::with_capacity(loaded.len());
        for (owner_id, owner) in loaded {
            if self
                .directory
                .is_active_resource(company_id, owner_type, owner_id)
                .await?
            {
                active.push((owner_id, owner));
            }
        }
        // Deterministic iteration order for the tie-breaks.
        active.sort_by_key(|(id, _)| *id);
        Ok(active)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::availability::WeeklyRule;
    use autoscuola_core::time::{TimeOfDayWindow, WeekdaySet};
    use chrono::{TimeZone, Utc, Weekday};
    use chrono_tz::Europe::Rome;

    fn rule_all_week(start: i32, end: i32) -> WeeklyRule {
        WeeklyRule {
            weekdays: WeekdaySet::from_days(&[
                Weekday::Mon,
                Weekday::Tue,
                Weekday::Wed,
                Weekday::Thu,
                Weekday::Fri,
                Weekday::Sat,
                Weekday::Sun,
            ]),
            window: TimeOfDayWindow {
                start_minute: start,
                end_minute: end,
            },
        }
    }

    fn rule_on(days: &[Weekday], start: i32, end: i32) -> WeeklyRule {
        WeeklyRule {
            weekdays: WeekdaySet::from_days(days),
            window: TimeOfDayWindow {
                start_minute: start,
                end_minute: end,
            },
        }
    }

    fn owner(rule: WeeklyRule, busy: Vec<Interval>) -> OwnerAvailability {
        OwnerAvailability::new(Some(rule), busy)
    }

    fn busy(from: Timestamp, to: Timestamp) -> Interval {
        Interval::from_times(from, to)
    }

    /// 2025-06-10 is a Tuesday; 10:00 Rome = 08:00 UTC (CEST).
    fn tue_rome(h: u32, m: u32) -> Timestamp {
        Utc.with_ymd_and_hms(2025, 6, 10, h - 2, m, 0).unwrap()
    }

    fn base_query(earliest: Timestamp) -> MatchQuery {
        MatchQuery {
            duration_minutes: 30,
            lesson_type: LessonType::Standard,
            earliest_start: earliest,
            horizon_days: 14,
            excluded_instructors: Vec::new(),
            excluded_vehicles: Vec::new(),
            excluded_interval: None,
        }
    }

    #[test]
    fn replaces_excluded_vehicle_at_the_same_slot() {
        // Student, instructor and an alternate vehicle are all free at
        // 10:00 Tuesday; the faulty vehicle is excluded. The match must be
        // the same slot with the other vehicle.
        let earliest = tue_rome(9, 0);
        let ctx = MatchContext {
            tz: Rome,
            student: owner(rule_all_week(600, 660), vec![]),
            instructors: vec![(1, owner(rule_all_week(600, 660), vec![]))],
            vehicles: vec![
                (10, owner(rule_all_week(600, 660), vec![])),
                (20, owner(rule_all_week(600, 660), vec![])),
            ],
        };
        let mut query = base_query(earliest);
        query.excluded_vehicles = vec![10];

        let m = select_best(&ctx, &query).unwrap();
        assert_eq!(m.starts_at, tue_rome(10, 0));
        assert_eq!(m.vehicle_id, 20);
        assert_eq!(m.instructor_id, 1);
    }

    #[test]
    fn prefers_adjacent_slot_over_earlier_fragmenting_one() {
        // Instructor has a booking 10:00-10:30 and the student is busy
        // 09:30-10:00. Feasible starts: 09:00 (fragmenting, score 0) and
        // 10:30 (abuts the instructor booking, score 1). The later,
        // schedule-packing slot must win.
        let earliest = tue_rome(9, 0);
        let instructor_busy = vec![busy(tue_rome(10, 0), tue_rome(10, 30))];
        let student_busy = vec![busy(tue_rome(9, 30), tue_rome(10, 0))];
        let ctx = MatchContext {
            tz: Rome,
            student: owner(rule_all_week(540, 720), student_busy),
            instructors: vec![(1, owner(rule_all_week(540, 720), instructor_busy))],
            vehicles: vec![(10, owner(rule_all_week(540, 720), vec![]))],
        };

        let m = select_best(&ctx, &base_query(earliest)).unwrap();
        assert_eq!(m.starts_at, tue_rome(10, 30));
        assert_eq!(m.score, 1);
    }

    #[test]
    fn equal_scores_break_toward_the_earliest_start() {
        let earliest = tue_rome(9, 0);
        let ctx = MatchContext {
            tz: Rome,
            student: owner(rule_all_week(540, 720), vec![]),
            instructors: vec![(1, owner(rule_all_week(540, 720), vec![]))],
            vehicles: vec![(10, owner(rule_all_week(540, 720), vec![]))],
        };
        let m = select_best(&ctx, &base_query(earliest)).unwrap();
        assert_eq!(m.starts_at, tue_rome(9, 0));
    }

    #[test]
    fn skips_days_outside_the_student_weekly_rule() {
        // Student only available on Wednesdays: the Tuesday earliest start
        // must land on Wednesday 2025-06-11.
        let earliest = tue_rome(9, 0);
        let ctx = MatchContext {
            tz: Rome,
            student: owner(rule_on(&[Weekday::Wed], 540, 720), vec![]),
            instructors: vec![(1, owner(rule_all_week(540, 720), vec![]))],
            vehicles: vec![(10, owner(rule_all_week(540, 720), vec![]))],
        };
        let m = select_best(&ctx, &base_query(earliest)).unwrap();
        assert_eq!(
            m.starts_at,
            Utc.with_ymd_and_hms(2025, 6, 11, 7, 0, 0).unwrap()
        );
    }

    #[test]
    fn no_qualifying_pair_returns_none() {
        // The only vehicle is busy all day, every day in the horizon.
        let earliest = tue_rome(9, 0);
        let all_fortnight = busy(
            tue_rome(2, 0) - Duration::days(1),
            tue_rome(22, 0) + Duration::days(15),
        );
        let ctx = MatchContext {
            tz: Rome,
            student: owner(rule_all_week(540, 720), vec![]),
            instructors: vec![(1, owner(rule_all_week(540, 720), vec![]))],
            vehicles: vec![(10, owner(rule_all_week(540, 720), vec![all_fortnight]))],
        };
        assert!(select_best(&ctx, &base_query(earliest)).is_none());
    }

    #[test]
    fn excluded_interval_is_never_proposed() {
        let earliest = tue_rome(10, 0);
        let ctx = MatchContext {
            tz: Rome,
            student: owner(rule_all_week(600, 660), vec![]),
            instructors: vec![(1, owner(rule_all_week(600, 660), vec![]))],
            vehicles: vec![(10, owner(rule_all_week(600, 660), vec![]))],
        };
        let mut query = base_query(earliest);
        query.excluded_interval = Some(Interval::from_times(tue_rome(10, 0), tue_rome(10, 30)));

        let m = select_best(&ctx, &query).unwrap();
        // The 10:00 slot is skipped; 10:30 is the next grid start.
        assert_eq!(m.starts_at, tue_rome(10, 30));
    }

    #[test]
    fn student_conflicts_filter_candidates() {
        let earliest = tue_rome(9, 0);
        let ctx = MatchContext {
            tz: Rome,
            student: owner(
                rule_all_week(540, 660),
                vec![busy(tue_rome(9, 0), tue_rome(10, 0))],
            ),
            instructors: vec![(1, owner(rule_all_week(540, 660), vec![]))],
            vehicles: vec![(10, owner(rule_all_week(540, 660), vec![]))],
        };
        let m = select_best(&ctx, &base_query(earliest)).unwrap();
        assert_eq!(m.starts_at, tue_rome(10, 0));
    }
}
