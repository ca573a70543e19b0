//! Reposition task queue: finds a replacement slot for an operationally
//! cancelled appointment and creates the replacement proposal atomically.
//!
//! Attempts run from two paths (an immediate attempt at cancellation time
//! and the periodic sweep) and are safe to race: the unique task per
//! source plus an in-transaction re-read of the source appointment make a
//! concurrent resolution collapse into "already matched".

use std::sync::Arc;

use chrono::Duration;

use autoscuola_core::appointment::AppointmentStatus;
use autoscuola_core::cancellation::ResourceExclusion;
use autoscuola_core::error::CoreError;
use autoscuola_core::payment::{computed_payment_status, InvoiceStatus, LedgerSnapshot};
use autoscuola_core::ports::Clock;
use autoscuola_core::reposition::{MATCH_HORIZON_DAYS, RETRY_DELAY_MINUTES};
use autoscuola_core::types::DbId;
use autoscuola_db::models::{NewAppointment, RepositionTask};
use autoscuola_db::repositories::{
    AppointmentPaymentRepo, AppointmentRepo, CompanySettingsRepo, RepositionTaskRepo,
};
use autoscuola_db::DbPool;
use autoscuola_events::{bus, DomainEvent, EventBus};

use crate::error::EngineResult;
use crate::matcher::{MatchQuery, ResourceMatcher};

/// What a single attempt did with a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// A replacement proposal exists; the task is terminal.
    Matched(DbId),
    /// Nothing found (or an open proposal already covers the student);
    /// the task backs off and stays pending.
    Deferred,
    /// The source's start elapsed with no match; the task is terminal.
    Expired,
    /// The task was already terminal when the attempt started.
    AlreadyResolved,
}

/// Drives pending reposition tasks to resolution.
pub struct RepositionService {
    pool: DbPool,
    matcher: ResourceMatcher,
    bus: Arc<EventBus>,
    clock: Arc<dyn Clock>,
}

impl RepositionService {
    pub fn new(
        pool: DbPool,
        matcher: ResourceMatcher,
        bus: Arc<EventBus>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            pool,
            matcher,
            bus,
            clock,
        }
    }

    /// Sweep entry point: attempt every due task, isolating per-task
    /// failures so one broken task never aborts the sweep. Returns the
    /// number of tasks attempted.
    pub async fn attempt_due(&self, limit: i64) -> EngineResult<usize> {
        let due = RepositionTaskRepo::due(&self.pool, self.clock.now(), limit).await?;
        let count = due.len();
        for task in due {
            if let Err(e) = self.attempt_task(task.id).await {
                tracing::error!(task_id = task.id, error = %e, "Reposition attempt failed");
            }
        }
        Ok(count)
    }

    /// Immediate-attempt path, invoked right after an operational
    /// cancellation enqueued the task.
    pub async fn attempt_source(&self, source_appointment_id: DbId) -> EngineResult<AttemptOutcome> {
        let task = RepositionTaskRepo::find_by_source(&self.pool, source_appointment_id)
            .await?
            .ok_or(CoreError::NotFound {
                entity: "RepositionTask",
                id: source_appointment_id,
            })?;
        self.attempt_task(task.id).await
    }

    /// Run one attempt of the task state machine.
    pub async fn attempt_task(&self, task_id: DbId) -> EngineResult<AttemptOutcome> {
        let now = self.clock.now();
        let task = RepositionTaskRepo::find_by_id(&self.pool, task_id)
            .await?
            .ok_or(CoreError::NotFound {
                entity: "RepositionTask",
                id: task_id,
            })?;
        if task.status.is_terminal() {
            return Ok(AttemptOutcome::AlreadyResolved);
        }

        let source = AppointmentRepo::find_by_id(&self.pool, task.company_id, task.source_appointment_id)
            .await?
            .ok_or(CoreError::NotFound {
                entity: "Appointment",
                id: task.source_appointment_id,
            })?;

        // The task times out naturally once the source slot has elapsed.
        if source.starts_at <= now {
            RepositionTaskRepo::mark_cancelled(&self.pool, task.id, now).await?;
            self.bus.publish(
                DomainEvent::new(bus::REPOSITION_TASK_EXPIRED, task.company_id)
                    .with_source("appointment", source.id)
                    .with_student(task.student_id),
            );
            return Ok(AttemptOutcome::Expired);
        }

        // Another process already resolved the source.
        if let Some(existing) = source.replaced_by_appointment_id {
            RepositionTaskRepo::mark_matched(&self.pool, task.id, existing, now).await?;
            return Ok(AttemptOutcome::Matched(existing));
        }

        // An unexpired proposal already covers this student: defer instead
        // of stacking a duplicate offer.
        if AppointmentRepo::open_proposal_for_student(
            &self.pool,
            task.company_id,
            task.student_id,
            now,
            source.id,
        )
        .await?
        .is_some()
        {
            return self.defer(&task).await;
        }

        let settings = CompanySettingsRepo::find(&self.pool, task.company_id)
            .await?
            .ok_or(CoreError::NotFound {
                entity: "CompanySettings",
                id: task.company_id,
            })?;

        // Exclude the resource at fault; when no specific resource is to
        // blame (company closed, other) the failed slot itself is excluded
        // so the search cannot re-offer the identical appointment.
        let exclusion = task.reason_kind().excluded_resource();
        let query = MatchQuery {
            duration_minutes: source.duration_minutes(),
            lesson_type: source.lesson_type,
            earliest_start: now,
            horizon_days: MATCH_HORIZON_DAYS,
            excluded_instructors: match exclusion {
                ResourceExclusion::Instructor => vec![source.instructor_id],
                _ => Vec::new(),
            },
            excluded_vehicles: match exclusion {
                ResourceExclusion::Vehicle => vec![source.vehicle_id],
                _ => Vec::new(),
            },
            excluded_interval: match exclusion {
                ResourceExclusion::None => Some(source.interval()),
                _ => None,
            },
        };

        let Some(found) = self
            .matcher
            .find_best(&settings, task.student_id, &query)
            .await?
        else {
            return self.defer(&task).await;
        };

        // Success path: one transaction creates the proposal, transfers the
        // ledger, links the source, and terminates the task.
        let mut tx = self.pool.begin().await?;

        let locked = AppointmentRepo::lock_by_id(&mut *tx, source.id)
            .await?
            .ok_or(CoreError::NotFound {
                entity: "Appointment",
                id: source.id,
            })?;
        if let Some(existing) = locked.replaced_by_appointment_id {
            // Lost the race: accept whatever replacement already exists.
            RepositionTaskRepo::mark_matched(&mut *tx, task.id, existing, now).await?;
            tx.commit().await?;
            return Ok(AttemptOutcome::Matched(existing));
        }

        // Re-validate the matched slot against the transaction's snapshot.
        let conflicts = AppointmentRepo::conflicts_for_booking(
            &mut *tx,
            task.company_id,
            task.student_id,
            found.instructor_id,
            found.vehicle_id,
            found.starts_at,
            found.ends_at,
        )
        .await?;
        if !conflicts.is_empty() {
            drop(tx);
            return self.defer(&task).await;
        }

        let ledger = LedgerSnapshot {
            payment_required: locked.payment_required,
            status: AppointmentStatus::Proposal,
            price_cents: locked.price_cents,
            penalty_cents: locked.penalty_cents,
            paid_cents: locked.paid_cents,
            penalty_cutoff_at: Some(settings.penalty_cutoff_for(found.starts_at)),
            cancelled_at: None,
        };
        let replacement = AppointmentRepo::insert(
            &mut *tx,
            &NewAppointment {
                company_id: locked.company_id,
                student_id: locked.student_id,
                case_id: locked.case_id,
                lesson_type: locked.lesson_type,
                status: AppointmentStatus::Proposal,
                starts_at: found.starts_at,
                ends_at: found.ends_at,
                instructor_id: found.instructor_id,
                vehicle_id: found.vehicle_id,
                payment_required: locked.payment_required,
                price_cents: locked.price_cents,
                penalty_cents: locked.penalty_cents,
                paid_cents: locked.paid_cents,
                currency: locked.currency.clone(),
                penalty_cutoff_at: ledger.penalty_cutoff_at,
                // Recomputed from the transferred amounts, never copied.
                payment_status: computed_payment_status(&ledger),
                payment_status_locked: false,
                invoice_status: if locked.payment_required {
                    InvoiceStatus::Pending
                } else {
                    InvoiceStatus::NotRequired
                },
            },
        )
        .await?;

        AppointmentPaymentRepo::transfer_to_appointment(&mut *tx, locked.id, replacement.id)
            .await?;
        AppointmentRepo::set_paid(&mut *tx, locked.id, 0).await?;
        AppointmentRepo::set_replaced_by(&mut *tx, locked.id, replacement.id).await?;
        RepositionTaskRepo::mark_matched(&mut *tx, task.id, replacement.id, now).await?;

        tx.commit().await?;

        tracing::info!(
            task_id = task.id,
            source_id = locked.id,
            replacement_id = replacement.id,
            score = found.score,
            "Reposition matched, proposal created"
        );
        self.bus.publish(
            DomainEvent::new(bus::REPOSITION_PROPOSAL_CREATED, task.company_id)
                .with_source("appointment", locked.id)
                .with_student(task.student_id)
                .with_payload(serde_json::json!({
                    "replacement_id": replacement.id,
                    "starts_at": replacement.starts_at,
                })),
        );
        Ok(AttemptOutcome::Matched(replacement.id))
    }

    /// Record a fruitless attempt: bump the counter, schedule the next try
    /// at the fixed delay, leave the task pending.
    async fn defer(&self, task: &RepositionTask) -> EngineResult<AttemptOutcome> {
        let now = self.clock.now();
        let next = now + Duration::minutes(RETRY_DELAY_MINUTES);
        RepositionTaskRepo::record_deferred_attempt(&self.pool, task.id, now, next).await?;
        tracing::debug!(
            task_id = task.id,
            attempt = task.attempt_count + 1,
            "No replacement slot found, deferring"
        );
        Ok(AttemptOutcome::Deferred)
    }
}
