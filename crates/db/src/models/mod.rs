//! Domain model structs and DTOs.
//!
//! Each submodule contains a `FromRow` + `Serialize` entity struct matching
//! the database row, plus `Deserialize` DTOs where the entity is created or
//! updated from the outside. Enum-valued columns are stored as TEXT and
//! decoded through the core enums via `#[sqlx(try_from = "String")]`.

pub mod appointment;
pub mod appointment_payment;
pub mod availability_window;
pub mod billing_profile;
pub mod company_settings;
pub mod event;
pub mod reposition_task;

pub use appointment::{Appointment, NewAppointment};
pub use appointment_payment::{AppointmentPayment, NewAppointmentPayment};
pub use availability_window::{AvailabilityWindow, UpsertAvailabilityWindow};
pub use billing_profile::BillingProfile;
pub use company_settings::{CompanySettings, UpsertCompanySettings};
pub use event::StoredEvent;
pub use reposition_task::RepositionTask;
