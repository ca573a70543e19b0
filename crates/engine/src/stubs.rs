//! Stand-in implementations of the external collaborator ports.
//!
//! The directory, notification dispatcher, payment gateway, and invoicing
//! provider are separate platform services wired in at deploy time. Until
//! they are, these defaults keep the binaries safe: the gateway reports
//! every charge as transient (so attempts retry instead of silently
//! succeeding) and the invoicing provider reports "not configured" (so
//! invoices park as `pending_fic`).

use async_trait::async_trait;

use autoscuola_core::error::CoreError;
use autoscuola_core::ports::{
    ChargeRequest, DirectoryService, GatewayCharge, GatewayError, InvoiceError, InvoiceRequest,
    InvoicingProvider, IssuedInvoice, NotificationDispatcher, NotificationRequest, OwnerContact,
    PaymentGateway,
};
use autoscuola_core::types::{DbId, OwnerType};

/// Treats every resource as active. Conflict and availability checks still
/// apply; only directory-level deactivation is unavailable.
pub struct DefaultActiveDirectory;

#[async_trait]
impl DirectoryService for DefaultActiveDirectory {
    async fn is_active_resource(
        &self,
        _company_id: DbId,
        _owner_type: OwnerType,
        _owner_id: DbId,
    ) -> Result<bool, CoreError> {
        Ok(true)
    }

    async fn owner_contact(&self, owner_id: DbId) -> Result<OwnerContact, CoreError> {
        Err(CoreError::Internal(format!(
            "directory service not configured, cannot resolve contact for owner {owner_id}"
        )))
    }
}

/// Fails every call as transient so charge attempts back off and retry
/// once a real gateway is wired in.
pub struct UnconfiguredGateway;

#[async_trait]
impl PaymentGateway for UnconfiguredGateway {
    async fn create_customer(
        &self,
        _company_id: DbId,
        _email: &str,
    ) -> Result<String, GatewayError> {
        Err(GatewayError::Transient {
            code: "gateway_unconfigured".into(),
            message: "payment gateway not configured".into(),
        })
    }

    async fn charge_off_session(
        &self,
        _request: ChargeRequest,
    ) -> Result<GatewayCharge, GatewayError> {
        Err(GatewayError::Transient {
            code: "gateway_unconfigured".into(),
            message: "payment gateway not configured".into(),
        })
    }
}

/// Parks every invoice as `pending_fic` until a provider is configured.
pub struct UnconfiguredInvoicing;

#[async_trait]
impl InvoicingProvider for UnconfiguredInvoicing {
    async fn create_invoice(
        &self,
        _request: InvoiceRequest,
    ) -> Result<IssuedInvoice, InvoiceError> {
        Err(InvoiceError::NotConfigured)
    }
}

/// Logs notifications instead of delivering them.
pub struct LoggingDispatcher;

#[async_trait]
impl NotificationDispatcher for LoggingDispatcher {
    async fn notify(&self, request: NotificationRequest) {
        tracing::info!(
            company_id = request.company_id,
            user_id = request.user_id,
            kind = %request.kind,
            title = %request.title,
            "Notification (dispatcher not configured, logged only)"
        );
    }
}
