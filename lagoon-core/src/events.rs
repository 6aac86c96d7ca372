use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::booking::{Booking, BookingStatus, PaymentStatus};

/// Emitted after every committed status transition. Delivery is
/// fire-and-forget; a sink failure never rolls back the transition.
#[derive(Debug, Clone, Serialize)]
pub struct BookingEvent {
    pub booking_id: Uuid,
    pub reference: String,
    pub booking_status: BookingStatus,
    pub payment_status: PaymentStatus,
    pub occurred_at: DateTime<Utc>,
}

impl BookingEvent {
    pub fn from_booking(booking: &Booking) -> Self {
        Self {
            booking_id: booking.id,
            reference: booking.reference.clone(),
            booking_status: booking.booking_status,
            payment_status: booking.payment_status,
            occurred_at: Utc::now(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("notification delivery failed: {0}")]
pub struct NotifyError(pub String);

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn booking_updated(&self, event: &BookingEvent) -> Result<(), NotifyError>;
}

/// Sink that writes status changes to the log stream. Stands in for the
/// platform's messaging integrations in tests and local runs.
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn booking_updated(&self, event: &BookingEvent) -> Result<(), NotifyError> {
        tracing::info!(
            reference = %event.reference,
            booking_status = %event.booking_status,
            payment_status = %event.payment_status,
            "booking status changed"
        );
        Ok(())
    }
}
