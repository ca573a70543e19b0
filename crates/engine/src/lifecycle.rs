//! Appointment lifecycle: creation with conflict detection, operational
//! cancellation with reposition enqueue, replacement linking, guarded
//! status transitions, and the admin purge.

use std::sync::Arc;

use chrono::Duration;

use autoscuola_core::appointment::{validate_transition, AppointmentStatus};
use autoscuola_core::cancellation::CancellationKind;
use autoscuola_core::error::CoreError;
use autoscuola_core::lesson::LessonType;
use autoscuola_core::money::{lesson_price_cents, penalty_cents};
use autoscuola_core::payment::{
    computed_payment_status, effective_payment_status, InvoiceStatus, LedgerSnapshot,
    PaymentStatus,
};
use autoscuola_core::ports::{Clock, DirectoryService};
use autoscuola_core::time::{local_minute_of_day, slot_aligned, validate_duration};
use autoscuola_core::types::{DbId, OwnerType, Timestamp};
use autoscuola_db::models::{Appointment, CompanySettings, NewAppointment, RepositionTask};
use autoscuola_db::repositories::{
    AppointmentRepo, CompanySettingsRepo, RepositionTaskRepo,
};
use autoscuola_db::DbPool;
use autoscuola_events::{bus, DomainEvent, EventBus};

use crate::error::{EngineError, EngineResult};

/// Booking request from the UI/admin surface.
#[derive(Debug, Clone)]
pub struct CreateAppointment {
    pub company_id: DbId,
    pub student_id: DbId,
    pub case_id: Option<DbId>,
    pub instructor_id: DbId,
    pub vehicle_id: DbId,
    pub lesson_type: LessonType,
    pub starts_at: Timestamp,
    pub duration_minutes: i32,
    /// Overrides the company default when set.
    pub payment_required: Option<bool>,
}

/// Owns appointment creation, cancellation and status transitions.
pub struct LifecycleManager {
    pool: DbPool,
    directory: Arc<dyn DirectoryService>,
    bus: Arc<EventBus>,
    clock: Arc<dyn Clock>,
}

impl LifecycleManager {
    pub fn new(
        pool: DbPool,
        directory: Arc<dyn DirectoryService>,
        bus: Arc<EventBus>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            pool,
            directory,
            bus,
            clock,
        }
    }

    /// Load the company settings or fail with `NotFound`.
    async fn settings(&self, company_id: DbId) -> EngineResult<CompanySettings> {
        CompanySettingsRepo::find(&self.pool, company_id)
            .await?
            .ok_or_else(|| {
                EngineError::Core(CoreError::NotFound {
                    entity: "CompanySettings",
                    id: company_id,
                })
            })
    }

    /// Reject ids that are inactive or foreign to the company.
    async fn require_active(
        &self,
        company_id: DbId,
        owner_type: OwnerType,
        owner_id: DbId,
    ) -> EngineResult<()> {
        let active = self
            .directory
            .is_active_resource(company_id, owner_type, owner_id)
            .await?;
        if active {
            Ok(())
        } else {
            Err(EngineError::Core(CoreError::InvalidResource {
                owner_type,
                owner_id,
            }))
        }
    }

    /// Create an appointment after validating resources and detecting
    /// double-booking conflicts.
    ///
    /// The conflict check runs again inside the insert transaction so two
    /// concurrent bookings observe a consistent busy snapshot.
    pub async fn create_appointment(&self, req: &CreateAppointment) -> EngineResult<Appointment> {
        let settings = self.settings(req.company_id).await?;
        let tz = settings.tz()?;
        let now = self.clock.now();

        validate_duration(req.duration_minutes)?;
        if req.starts_at <= now {
            return Err(CoreError::Validation("appointment must start in the future".into()).into());
        }
        if !slot_aligned(local_minute_of_day(tz, req.starts_at)) {
            return Err(CoreError::Validation(
                "appointment start must fall on the 30-minute grid".into(),
            )
            .into());
        }

        self.require_active(req.company_id, OwnerType::Student, req.student_id)
            .await?;
        self.require_active(req.company_id, OwnerType::Instructor, req.instructor_id)
            .await?;
        self.require_active(req.company_id, OwnerType::Vehicle, req.vehicle_id)
            .await?;

        let payment_required = req
            .payment_required
            .unwrap_or(settings.payment_required_default);

        // An unresolved insoluto blocks further paid bookings.
        if payment_required
            && AppointmentRepo::has_insoluto_balance(&self.pool, req.company_id, req.student_id)
                .await?
        {
            return Err(EngineError::Core(CoreError::BookingBlocked {
                student_id: req.student_id,
            }));
        }

        let ends_at = req.starts_at + Duration::minutes(i64::from(req.duration_minutes));
        let price = lesson_price_cents(settings.price_per_slot_cents, req.duration_minutes)?;
        let penalty = penalty_cents(price, settings.penalty_percent);
        let cutoff = settings.penalty_cutoff_for(req.starts_at);

        let ledger = LedgerSnapshot {
            payment_required,
            status: AppointmentStatus::Scheduled,
            price_cents: price,
            penalty_cents: penalty,
            paid_cents: 0,
            penalty_cutoff_at: Some(cutoff),
            cancelled_at: None,
        };

        let new = NewAppointment {
            company_id: req.company_id,
            student_id: req.student_id,
            case_id: req.case_id,
            lesson_type: req.lesson_type,
            status: AppointmentStatus::Scheduled,
            starts_at: req.starts_at,
            ends_at,
            instructor_id: req.instructor_id,
            vehicle_id: req.vehicle_id,
            payment_required,
            price_cents: price,
            penalty_cents: penalty,
            paid_cents: 0,
            currency: settings.currency.clone(),
            penalty_cutoff_at: Some(cutoff),
            payment_status: computed_payment_status(&ledger),
            payment_status_locked: false,
            invoice_status: if payment_required {
                InvoiceStatus::Pending
            } else {
                InvoiceStatus::NotRequired
            },
        };

        let mut tx = self.pool.begin().await?;
        let conflicts = AppointmentRepo::conflicts_for_booking(
            &mut *tx,
            req.company_id,
            req.student_id,
            req.instructor_id,
            req.vehicle_id,
            req.starts_at,
            ends_at,
        )
        .await?;
        if let Some(conflict) = conflicts.first() {
            let (owner_type, owner_id) = if conflict.student_id == req.student_id {
                (OwnerType::Student, req.student_id)
            } else if conflict.instructor_id == req.instructor_id {
                (OwnerType::Instructor, req.instructor_id)
            } else {
                (OwnerType::Vehicle, req.vehicle_id)
            };
            return Err(EngineError::Core(CoreError::SlotConflict {
                owner_type,
                owner_id,
            }));
        }

        let appointment = AppointmentRepo::insert(&mut *tx, &new).await?;
        tx.commit().await?;

        tracing::info!(
            appointment_id = appointment.id,
            company_id = appointment.company_id,
            student_id = appointment.student_id,
            "Appointment created"
        );
        self.bus.publish(
            DomainEvent::new(bus::APPOINTMENT_CREATED, appointment.company_id)
                .with_source("appointment", appointment.id)
                .with_student(appointment.student_id),
        );
        Ok(appointment)
    }

    /// Operationally cancel an appointment: the resource became
    /// unavailable, so the cancellation is never the student's fault.
    ///
    /// Waives the ledger when payment was required and enqueues exactly one
    /// reposition task (idempotent upsert: re-cancelling an already-queued
    /// appointment only resets its `next_attempt_at`).
    pub async fn cancel_operational(
        &self,
        company_id: DbId,
        appointment_id: DbId,
        kind: CancellationKind,
        reason: Option<String>,
    ) -> EngineResult<(Appointment, RepositionTask)> {
        if !kind.is_operational() {
            return Err(CoreError::Validation(format!(
                "cancellation kind {kind} is not operational"
            ))
            .into());
        }

        let now = self.clock.now();
        let appointment = AppointmentRepo::find_by_id(&self.pool, company_id, appointment_id)
            .await?
            .ok_or(CoreError::NotFound {
                entity: "Appointment",
                id: appointment_id,
            })?;

        if !appointment.status.is_repositionable() {
            return Err(EngineError::Core(CoreError::NotRepositionable(format!(
                "appointment {appointment_id} has status {}",
                appointment.status
            ))));
        }
        if appointment.starts_at <= now {
            return Err(EngineError::Core(CoreError::NotRepositionable(format!(
                "appointment {appointment_id} has already started"
            ))));
        }

        let mut tx = self.pool.begin().await?;
        let cancelled =
            AppointmentRepo::mark_cancelled(&mut *tx, appointment_id, now, kind, reason.as_deref())
                .await?;
        if cancelled.payment_required {
            AppointmentRepo::set_payment_status(&mut *tx, appointment_id, PaymentStatus::Waived, true)
                .await?;
        }
        let task = match RepositionTaskRepo::upsert_pending(
            &mut *tx,
            company_id,
            appointment_id,
            cancelled.student_id,
            kind,
            now,
        )
        .await?
        {
            Some(task) => task,
            // Upsert declined to touch a terminal task; keep the existing row.
            None => RepositionTaskRepo::find_by_source(&mut *tx, appointment_id)
                .await?
                .ok_or(CoreError::NotFound {
                    entity: "RepositionTask",
                    id: appointment_id,
                })?,
        };
        tx.commit().await?;

        tracing::info!(
            appointment_id,
            task_id = task.id,
            kind = %kind,
            "Appointment operationally cancelled, reposition task queued"
        );
        self.bus.publish(
            DomainEvent::new(bus::APPOINTMENT_CANCELLED, company_id)
                .with_source("appointment", appointment_id)
                .with_student(cancelled.student_id)
                .with_payload(serde_json::json!({ "kind": kind.as_str() })),
        );
        Ok((cancelled, task))
    }

    /// Set the forward replacement link exactly once. A second call with
    /// any replacement id is a no-op guarded by the existing value.
    pub async fn link_replacement(
        &self,
        source_id: DbId,
        replacement_id: DbId,
    ) -> EngineResult<()> {
        let linked =
            AppointmentRepo::set_replaced_by(&self.pool, source_id, replacement_id).await?;
        if !linked {
            tracing::debug!(
                source_id,
                replacement_id,
                "Replacement link already set, keeping existing value"
            );
        }
        Ok(())
    }

    /// Guarded status transition. A student-requested cancellation comes
    /// through here (penalty rules apply); operational cancellations use
    /// [`Self::cancel_operational`].
    pub async fn update_status(
        &self,
        company_id: DbId,
        appointment_id: DbId,
        new_status: AppointmentStatus,
    ) -> EngineResult<Appointment> {
        let now = self.clock.now();
        let appointment = AppointmentRepo::find_by_id(&self.pool, company_id, appointment_id)
            .await?
            .ok_or(CoreError::NotFound {
                entity: "Appointment",
                id: appointment_id,
            })?;

        validate_transition(appointment.status, new_status)?;

        let mut tx = self.pool.begin().await?;
        let updated = if new_status == AppointmentStatus::Cancelled {
            AppointmentRepo::mark_cancelled(
                &mut *tx,
                appointment_id,
                now,
                CancellationKind::StudentRequest,
                None,
            )
            .await?
        } else {
            AppointmentRepo::set_status(&mut *tx, appointment_id, new_status).await?
        };

        // Recompute the derived payment status inside the same transaction.
        let status = effective_payment_status(
            &updated.ledger(),
            updated.payment_status,
            updated.payment_status_locked,
        );
        if status != updated.payment_status {
            AppointmentRepo::set_payment_status(
                &mut *tx,
                appointment_id,
                status,
                updated.payment_status_locked,
            )
            .await?;
        }
        tx.commit().await?;

        self.bus.publish(
            DomainEvent::new(bus::APPOINTMENT_STATUS_CHANGED, company_id)
                .with_source("appointment", appointment_id)
                .with_student(updated.student_id)
                .with_payload(serde_json::json!({
                    "from": appointment.status.as_str(),
                    "to": new_status.as_str(),
                })),
        );
        Ok(updated)
    }

    /// Fetch an appointment for the read surface.
    pub async fn get(&self, company_id: DbId, appointment_id: DbId) -> EngineResult<Appointment> {
        AppointmentRepo::find_by_id(&self.pool, company_id, appointment_id)
            .await?
            .ok_or_else(|| {
                EngineError::Core(CoreError::NotFound {
                    entity: "Appointment",
                    id: appointment_id,
                })
            })
    }

    /// Admin-only hard delete. The only path that physically removes an
    /// appointment; payments and tasks cascade.
    pub async fn purge(&self, company_id: DbId, appointment_id: DbId) -> EngineResult<u64> {
        let deleted = AppointmentRepo::purge(&self.pool, company_id, appointment_id).await?;
        if deleted > 0 {
            tracing::warn!(company_id, appointment_id, "Appointment purged by admin");
        }
        Ok(deleted)
    }
}
