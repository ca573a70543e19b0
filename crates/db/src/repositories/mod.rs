//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async CRUD methods.
//! Methods take `impl sqlx::PgExecutor<'_>` so they run against the pool or
//! inside a transaction; multi-row sweep queries take `&PgPool` directly.

pub mod appointment_payment_repo;
pub mod appointment_repo;
pub mod availability_window_repo;
pub mod billing_profile_repo;
pub mod company_settings_repo;
pub mod event_repo;
pub mod reposition_task_repo;

pub use appointment_payment_repo::AppointmentPaymentRepo;
pub use appointment_repo::AppointmentRepo;
pub use availability_window_repo::AvailabilityWindowRepo;
pub use billing_profile_repo::BillingProfileRepo;
pub use company_settings_repo::CompanySettingsRepo;
pub use event_repo::EventRepo;
pub use reposition_task_repo::RepositionTaskRepo;
