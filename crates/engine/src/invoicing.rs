//! Invoice finalizer: issues an invoice through the external provider
//! exactly once per appointment, after the ledger is settled.
//!
//! Exactly-once is guaranteed by checking `invoice_id` before calling out
//! and by the guarded update that refuses to overwrite a stored id.

use std::sync::Arc;

use autoscuola_core::error::CoreError;
use autoscuola_core::money::format_amount;
use autoscuola_core::payment::{final_amount_cents, InvoiceStatus, PaymentStatus};
use autoscuola_core::ports::{
    Clock, InvoiceError, InvoiceLineItem, InvoiceRequest, InvoicingProvider,
};
use autoscuola_core::time::local_date;
use autoscuola_core::types::DbId;
use autoscuola_db::models::Appointment;
use autoscuola_db::repositories::{AppointmentRepo, CompanySettingsRepo};
use autoscuola_db::DbPool;
use autoscuola_events::{bus, DomainEvent, EventBus};

use crate::error::EngineResult;

/// What the finalizer did with one appointment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvoiceOutcome {
    /// Final amount is zero: marked `not_required` without a provider call.
    NotRequired,
    Issued(String),
    /// Provider not configured: parked as `pending_fic`, retried later.
    Parked,
    /// Provider error: marked `failed` until an admin re-queues it.
    Failed,
    /// Not eligible (yet), or another process already issued it.
    Skipped,
}

/// Issues invoices for settled appointments.
pub struct InvoiceFinalizer {
    pool: DbPool,
    invoicing: Arc<dyn InvoicingProvider>,
    bus: Arc<EventBus>,
    clock: Arc<dyn Clock>,
}

impl InvoiceFinalizer {
    pub fn new(
        pool: DbPool,
        invoicing: Arc<dyn InvoicingProvider>,
        bus: Arc<EventBus>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            pool,
            invoicing,
            bus,
            clock,
        }
    }

    /// Sweep entry point: finalize every eligible appointment, isolating
    /// per-row failures. Returns the number of appointments examined.
    pub async fn run_sweep(&self, limit: i64) -> EngineResult<usize> {
        let candidates =
            AppointmentRepo::invoice_sweep_candidates(&self.pool, self.clock.now(), limit).await?;
        let count = candidates.len();
        for appointment in candidates {
            match self.finalize_one(&appointment).await {
                Ok(outcome) => {
                    tracing::debug!(
                        appointment_id = appointment.id,
                        outcome = ?outcome,
                        "Invoice finalizer processed appointment"
                    );
                }
                Err(e) => {
                    tracing::error!(
                        appointment_id = appointment.id,
                        error = %e,
                        "Invoice finalizer failed for appointment"
                    );
                }
            }
        }
        Ok(count)
    }

    /// Issue the invoice for one appointment, if it is due one.
    pub async fn finalize_one(&self, appointment: &Appointment) -> EngineResult<InvoiceOutcome> {
        // Exactly-once: never call out when an invoice id is stored.
        if appointment.invoice_id.is_some() {
            return Ok(InvoiceOutcome::Skipped);
        }

        let ledger = appointment.ledger();
        let final_amount = final_amount_cents(&ledger);

        if final_amount == 0 {
            AppointmentRepo::set_invoice_status(
                &self.pool,
                appointment.id,
                InvoiceStatus::NotRequired,
            )
            .await?;
            return Ok(InvoiceOutcome::NotRequired);
        }

        // Issuance is gated on the ledger being fully settled.
        if appointment.payment_status != PaymentStatus::Paid {
            return Ok(InvoiceOutcome::Skipped);
        }

        let settings = CompanySettingsRepo::find(&self.pool, appointment.company_id)
            .await?
            .ok_or(CoreError::NotFound {
                entity: "CompanySettings",
                id: appointment.company_id,
            })?;
        let tz = settings.tz()?;

        let request = InvoiceRequest {
            client_ref: format!("student-{}", appointment.student_id),
            line_items: vec![InvoiceLineItem {
                description: format!(
                    "{} lesson on {} ({})",
                    appointment.lesson_type,
                    local_date(tz, appointment.starts_at),
                    format_amount(final_amount, &appointment.currency),
                ),
                quantity: 1,
                amount_cents: final_amount,
            }],
            vat_rule_ref: settings.invoicing_vat_rule_ref.clone(),
            payment_method_ref: settings.invoicing_payment_method_ref.clone(),
        };

        match self.invoicing.create_invoice(request).await {
            Ok(issued) => {
                let stored =
                    AppointmentRepo::set_invoice_issued(&self.pool, appointment.id, &issued.invoice_id)
                        .await?;
                if !stored {
                    // Another process issued first; its id stands.
                    return Ok(InvoiceOutcome::Skipped);
                }
                tracing::info!(
                    appointment_id = appointment.id,
                    invoice_id = %issued.invoice_id,
                    "Invoice issued"
                );
                self.bus.publish(
                    DomainEvent::new(bus::INVOICE_ISSUED, appointment.company_id)
                        .with_source("appointment", appointment.id)
                        .with_student(appointment.student_id)
                        .with_payload(serde_json::json!({
                            "invoice_id": issued.invoice_id,
                            "amount_cents": final_amount,
                        })),
                );
                Ok(InvoiceOutcome::Issued(issued.invoice_id))
            }
            Err(InvoiceError::NotConfigured) => {
                AppointmentRepo::set_invoice_status(
                    &self.pool,
                    appointment.id,
                    InvoiceStatus::PendingFic,
                )
                .await?;
                tracing::debug!(
                    appointment_id = appointment.id,
                    "Invoicing provider not configured, invoice parked"
                );
                Ok(InvoiceOutcome::Parked)
            }
            Err(InvoiceError::Provider { code, message }) => {
                AppointmentRepo::set_invoice_status(&self.pool, appointment.id, InvoiceStatus::Failed)
                    .await?;
                tracing::error!(
                    appointment_id = appointment.id,
                    code = %code,
                    message = %message,
                    "Invoice issuance failed"
                );
                Ok(InvoiceOutcome::Failed)
            }
        }
    }

    /// Admin action: put a failed invoice back into the retry pool.
    pub async fn requeue_failed(&self, company_id: DbId, appointment_id: DbId) -> EngineResult<()> {
        let appointment = AppointmentRepo::find_by_id(&self.pool, company_id, appointment_id)
            .await?
            .ok_or(CoreError::NotFound {
                entity: "Appointment",
                id: appointment_id,
            })?;
        if appointment.invoice_status != InvoiceStatus::Failed {
            return Err(CoreError::Validation(format!(
                "invoice status is {}, only failed invoices can be re-queued",
                appointment.invoice_status
            ))
            .into());
        }
        AppointmentRepo::set_invoice_status(&self.pool, appointment_id, InvoiceStatus::Pending)
            .await?;
        Ok(())
    }
}
