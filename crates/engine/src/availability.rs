//! Availability index: per resource owner, the weekly recurring rule plus
//! the set of busy intervals from non-cancelled appointments.
//!
//! The index is a read-only snapshot built per operation. Busy intervals are
//! loaded over an extended scan range (one day of padding on both ends) so
//! cross-midnight overlaps are never missed, then bucketed per owner id.
//! Weekday and minute-of-day always refer to the company's local wall clock.

use std::collections::HashMap;

use chrono::{Duration, Weekday};
use chrono_tz::Tz;

use autoscuola_core::time::{Interval, TimeOfDayWindow, WeekdaySet};
use autoscuola_core::types::{DbId, OwnerType, Timestamp};
use autoscuola_db::models::AvailabilityWindow;
use autoscuola_db::repositories::{AppointmentRepo, AvailabilityWindowRepo};
use autoscuola_db::DbPool;

/// Padding applied to both ends of the busy-interval scan.
const SCAN_PAD_DAYS: i64 = 1;

/// An owner's weekly recurring bookable window.
#[derive(Debug, Clone, Copy)]
pub struct WeeklyRule {
    pub weekdays: WeekdaySet,
    pub window: TimeOfDayWindow,
}

impl WeeklyRule {
    pub fn from_model(model: &AvailabilityWindow) -> Self {
        WeeklyRule {
            weekdays: model.weekday_set(),
            window: model.time_window(),
        }
    }

    /// Whether a lesson on `weekday`, starting at `start_minute` local time
    /// for `duration_minutes`, falls inside the rule.
    pub fn allows(&self, weekday: Weekday, start_minute: i32, duration_minutes: i32) -> bool {
        self.weekdays.contains(weekday) && self.window.fits(start_minute, duration_minutes)
    }
}

/// One owner's availability: the weekly rule (if configured) and the busy
/// intervals already occupied by non-cancelled appointments.
#[derive(Debug, Clone, Default)]
pub struct OwnerAvailability {
    pub rule: Option<WeeklyRule>,
    pub busy: Vec<Interval>,
}

impl OwnerAvailability {
    pub fn new(rule: Option<WeeklyRule>, busy: Vec<Interval>) -> Self {
        OwnerAvailability { rule, busy }
    }

    /// No busy interval overlaps the candidate slot.
    pub fn is_free(&self, slot: &Interval) -> bool {
        !self.busy.iter().any(|b| b.overlaps(slot))
    }

    /// Packing score: +1 when the slot starts exactly where an existing
    /// booking ends, +1 when it ends exactly where one starts. Biases the
    /// matcher toward dense schedules instead of fragmented idle gaps.
    pub fn adjacency_score(&self, slot: &Interval) -> i32 {
        let mut score = 0;
        if self.busy.iter().any(|b| slot.starts_at_end_of(b)) {
            score += 1;
        }
        if self.busy.iter().any(|b| slot.ends_at_start_of(b)) {
            score += 1;
        }
        score
    }
}

/// Read-only availability snapshot for a set of owners.
#[derive(Debug)]
pub struct AvailabilityIndex {
    tz: Tz,
    owners: HashMap<(OwnerType, DbId), OwnerAvailability>,
}

impl AvailabilityIndex {
    pub fn new(tz: Tz) -> Self {
        AvailabilityIndex {
            tz,
            owners: HashMap::new(),
        }
    }

    pub fn tz(&self) -> Tz {
        self.tz
    }

    pub fn insert(&mut self, owner_type: OwnerType, owner_id: DbId, owner: OwnerAvailability) {
        self.owners.insert((owner_type, owner_id), owner);
    }

    pub fn owner(&self, owner_type: OwnerType, owner_id: DbId) -> Option<&OwnerAvailability> {
        self.owners.get(&(owner_type, owner_id))
    }

    /// Load one owner's availability for `[from, to)`.
    pub async fn load_owner(
        pool: &DbPool,
        company_id: DbId,
        owner_type: OwnerType,
        owner_id: DbId,
        from: Timestamp,
        to: Timestamp,
    ) -> Result<OwnerAvailability, sqlx::Error> {
        let rule = AvailabilityWindowRepo::find_for_owner(pool, company_id, owner_type, owner_id)
            .await?
            .map(|w| WeeklyRule::from_model(&w));

        let busy = AppointmentRepo::busy_for_owner(
            pool,
            company_id,
            owner_type,
            owner_id,
            from - Duration::days(SCAN_PAD_DAYS),
            to + Duration::days(SCAN_PAD_DAYS),
        )
        .await?
        .iter()
        .map(|a| a.interval())
        .collect();

        Ok(OwnerAvailability { rule, busy })
    }

    /// Load every configured owner of one dimension, busy intervals
    /// bucketed per owner id in a single scan.
    pub async fn load_dimension(
        pool: &DbPool,
        company_id: DbId,
        owner_type: OwnerType,
        from: Timestamp,
        to: Timestamp,
    ) -> Result<HashMap<DbId, OwnerAvailability>, sqlx::Error> {
        let windows =
            AvailabilityWindowRepo::list_for_owner_type(pool, company_id, owner_type).await?;

        let mut owners: HashMap<DbId, OwnerAvailability> = windows
            .iter()
            .map(|w| {
                (
                    w.owner_id,
                    OwnerAvailability::new(Some(WeeklyRule::from_model(w)), Vec::new()),
                )
            })
            .collect();

        let busy_rows = AppointmentRepo::busy_for_owner_type(
            pool,
            company_id,
            owner_type,
            from - Duration::days(SCAN_PAD_DAYS),
            to + Duration::days(SCAN_PAD_DAYS),
        )
        .await?;

        for row in busy_rows {
            let owner_id = match owner_type {
                OwnerType::Student => row.student_id,
                OwnerType::Instructor => row.instructor_id,
                OwnerType::Vehicle => row.vehicle_id,
            };
            // Owners with no configured window are not bookable; their busy
            // intervals are irrelevant to the matcher.
            if let Some(owner) = owners.get_mut(&owner_id) {
                owner.busy.push(row.interval());
            }
        }

        Ok(owners)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Weekday;

    fn interval(start_ms: i64, end_ms: i64) -> Interval {
        Interval::new(start_ms, end_ms)
    }

    fn rule(days: &[Weekday], start: i32, end: i32) -> WeeklyRule {
        WeeklyRule {
            weekdays: WeekdaySet::from_days(days),
            window: TimeOfDayWindow {
                start_minute: start,
                end_minute: end,
            },
        }
    }

    #[test]
    fn free_and_busy() {
        let owner = OwnerAvailability::new(None, vec![interval(1000, 2000)]);
        assert!(owner.is_free(&interval(2000, 3000)));
        assert!(owner.is_free(&interval(0, 1000)));
        assert!(!owner.is_free(&interval(1500, 2500)));
    }

    #[test]
    fn adjacency_counts_both_edges() {
        let owner = OwnerAvailability::new(None, vec![interval(0, 1000), interval(2000, 3000)]);
        // Fills the gap exactly: abuts on both sides.
        assert_eq!(owner.adjacency_score(&interval(1000, 2000)), 2);
        // Abuts only the end of the first booking.
        assert_eq!(owner.adjacency_score(&interval(1000, 1500)), 1);
        // Abuts nothing.
        assert_eq!(owner.adjacency_score(&interval(5000, 6000)), 0);
    }

    #[test]
    fn weekly_rule_checks_day_and_window() {
        let r = rule(&[Weekday::Tue], 540, 720);
        assert!(r.allows(Weekday::Tue, 600, 60));
        assert!(!r.allows(Weekday::Wed, 600, 60));
        assert!(!r.allows(Weekday::Tue, 700, 60));
    }
}
