//! Forwards user-facing domain events to the external notification
//! dispatcher. Channel selection (push/email/chat) is the dispatcher's
//! concern; this service only decides which events reach the student and
//! with what metadata.

use std::sync::Arc;

use tokio::sync::broadcast;

use autoscuola_core::ports::{NotificationDispatcher, NotificationRequest};

use crate::bus::{self, DomainEvent};

/// Background service mapping domain events to outbound notifications.
pub struct NotificationForwarder {
    dispatcher: Arc<dyn NotificationDispatcher>,
}

impl NotificationForwarder {
    pub fn new(dispatcher: Arc<dyn NotificationDispatcher>) -> Self {
        Self { dispatcher }
    }

    /// Run the forwarding loop until the bus is closed.
    pub async fn run(self, mut receiver: broadcast::Receiver<DomainEvent>) {
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    if let Some(request) = Self::to_notification(&event) {
                        self.dispatcher.notify(request).await;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "Notification forwarder lagged");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::info!("Event bus closed, notification forwarder shutting down");
                    break;
                }
            }
        }
    }

    /// Map an event to a notification, or `None` for internal-only events.
    fn to_notification(event: &DomainEvent) -> Option<NotificationRequest> {
        let student_id = event.student_id?;
        let (title, body) = match event.event_type.as_str() {
            bus::REPOSITION_PROPOSAL_CREATED => (
                "New lesson proposal",
                "Your cancelled lesson has a proposed replacement slot. \
                 Please confirm or decline it.",
            ),
            bus::PAYMENT_INSOLUTO => (
                "Payment overdue",
                "A lesson payment could not be collected. Booking is paused \
                 until the balance is settled.",
            ),
            bus::INVOICE_ISSUED => ("Invoice issued", "An invoice for your lesson is available."),
            _ => return None,
        };
        Some(NotificationRequest {
            company_id: event.company_id,
            user_id: student_id,
            title: title.to_string(),
            body: body.to_string(),
            kind: event.event_type.clone(),
            metadata: event.payload.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::EventBus;
    use std::sync::Mutex;

    struct RecordingDispatcher {
        sent: Mutex<Vec<NotificationRequest>>,
    }

    #[async_trait::async_trait]
    impl NotificationDispatcher for RecordingDispatcher {
        async fn notify(&self, request: NotificationRequest) {
            self.sent.lock().unwrap().push(request);
        }
    }

    #[tokio::test]
    async fn proposal_event_reaches_the_student() {
        let bus = EventBus::default();
        let dispatcher = Arc::new(RecordingDispatcher {
            sent: Mutex::new(Vec::new()),
        });
        let forwarder = NotificationForwarder::new(dispatcher.clone());
        let rx = bus.subscribe();
        let handle = tokio::spawn(forwarder.run(rx));

        bus.publish(
            crate::bus::DomainEvent::new(crate::bus::REPOSITION_PROPOSAL_CREATED, 1)
                .with_source("appointment", 10)
                .with_student(55),
        );
        drop(bus);
        handle.await.unwrap();

        let sent = dispatcher.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].user_id, 55);
        assert_eq!(sent[0].kind, crate::bus::REPOSITION_PROPOSAL_CREATED);
    }

    #[tokio::test]
    async fn internal_events_are_not_forwarded() {
        let bus = EventBus::default();
        let dispatcher = Arc::new(RecordingDispatcher {
            sent: Mutex::new(Vec::new()),
        });
        let forwarder = NotificationForwarder::new(dispatcher.clone());
        let rx = bus.subscribe();
        let handle = tokio::spawn(forwarder.run(rx));

        bus.publish(
            crate::bus::DomainEvent::new(crate::bus::APPOINTMENT_CREATED, 1).with_student(55),
        );
        drop(bus);
        handle.await.unwrap();

        assert!(dispatcher.sent.lock().unwrap().is_empty());
    }
}
