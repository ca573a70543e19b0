//! Ports to external collaborators.
//!
//! The directory, notification, payment-gateway, and invoicing services are
//! separate systems; the engine only sees these traits. Implementations are
//! wired in at the binary edge, and tests use in-memory fakes.

use async_trait::async_trait;

use crate::error::CoreError;
use crate::types::{DbId, OwnerType, Timestamp};

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

/// Injectable time source so sweeps and state machines are testable.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Production clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        chrono::Utc::now()
    }
}

/// Clock pinned to a fixed instant, for tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub Timestamp);

impl Clock for FixedClock {
    fn now(&self) -> Timestamp {
        self.0
    }
}

// ---------------------------------------------------------------------------
// Directory service
// ---------------------------------------------------------------------------

/// Contact details for a resource owner.
#[derive(Debug, Clone)]
pub struct OwnerContact {
    pub email: String,
    pub phone: Option<String>,
}

/// User/company directory and resource roster.
#[async_trait]
pub trait DirectoryService: Send + Sync {
    /// Whether the owner exists, belongs to the company, and is active.
    async fn is_active_resource(
        &self,
        company_id: DbId,
        owner_type: OwnerType,
        owner_id: DbId,
    ) -> Result<bool, CoreError>;

    async fn owner_contact(&self, owner_id: DbId) -> Result<OwnerContact, CoreError>;
}

// ---------------------------------------------------------------------------
// Notification dispatcher
// ---------------------------------------------------------------------------

/// A message for the external notification dispatcher. Channel selection
/// (push/email/chat) is the dispatcher's concern.
#[derive(Debug, Clone)]
pub struct NotificationRequest {
    pub company_id: DbId,
    pub user_id: DbId,
    pub title: String,
    pub body: String,
    pub kind: String,
    pub metadata: serde_json::Value,
}

/// Fire-and-forget outbound notifications.
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn notify(&self, request: NotificationRequest);
}

// ---------------------------------------------------------------------------
// Payment gateway
// ---------------------------------------------------------------------------

/// Gateway call failure. Both variants are retried up to the attempt cap:
/// transient errors because the network may recover, declines because a
/// later attempt may use an updated payment method.
#[derive(Debug, Clone, thiserror::Error)]
pub enum GatewayError {
    #[error("gateway transient failure [{code}]: {message}")]
    Transient { code: String, message: String },

    #[error("gateway declined charge [{code}]: {message}")]
    Declined { code: String, message: String },
}

impl GatewayError {
    pub fn code(&self) -> &str {
        match self {
            GatewayError::Transient { code, .. } | GatewayError::Declined { code, .. } => code,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            GatewayError::Transient { message, .. } | GatewayError::Declined { message, .. } => {
                message
            }
        }
    }
}

/// An off-session charge request. Amounts are integer cents.
#[derive(Debug, Clone)]
pub struct ChargeRequest {
    pub customer_id: String,
    pub payment_method_id: String,
    pub amount_cents: i64,
    pub currency: String,
    /// Deterministic key derived from `(appointment, phase, attempt)`.
    pub idempotency_key: String,
    /// Connected account to route the funds to, when configured.
    pub destination_account: Option<String>,
}

/// A successfully created gateway charge.
#[derive(Debug, Clone)]
pub struct GatewayCharge {
    pub charge_id: String,
}

/// External payment gateway. Calls must be time-bounded by the
/// implementation; a timeout surfaces as [`GatewayError::Transient`],
/// never as success.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_customer(
        &self,
        company_id: DbId,
        email: &str,
    ) -> Result<String, GatewayError>;

    async fn charge_off_session(
        &self,
        request: ChargeRequest,
    ) -> Result<GatewayCharge, GatewayError>;
}

// ---------------------------------------------------------------------------
// Invoicing provider
// ---------------------------------------------------------------------------

/// Invoicing call failure. "Provider not configured" is distinguished so
/// the finalizer can park the invoice instead of recording a failure.
#[derive(Debug, Clone, thiserror::Error)]
pub enum InvoiceError {
    #[error("invoicing provider not configured for this company")]
    NotConfigured,

    #[error("invoicing provider error [{code}]: {message}")]
    Provider { code: String, message: String },
}

/// One line of an invoice. Amounts are integer cents.
#[derive(Debug, Clone)]
pub struct InvoiceLineItem {
    pub description: String,
    pub quantity: i32,
    pub amount_cents: i64,
}

/// An invoice creation request.
#[derive(Debug, Clone)]
pub struct InvoiceRequest {
    pub client_ref: String,
    pub line_items: Vec<InvoiceLineItem>,
    pub vat_rule_ref: Option<String>,
    pub payment_method_ref: Option<String>,
}

/// A successfully issued invoice.
#[derive(Debug, Clone)]
pub struct IssuedInvoice {
    pub invoice_id: String,
}

/// External invoicing provider.
#[async_trait]
pub trait InvoicingProvider: Send + Sync {
    async fn create_invoice(&self, request: InvoiceRequest) -> Result<IssuedInvoice, InvoiceError>;
}
