//! In-process domain event bus, durable persistence, and the notification
//! forwarder.

pub mod bus;
pub mod notifier;
pub mod persistence;

pub use bus::{DomainEvent, EventBus};
pub use notifier::NotificationForwarder;
pub use persistence::EventPersistence;
