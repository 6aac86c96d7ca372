use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::booking::{Booking, BookingStatus, PaymentStatus, TransitionUpdate};
use crate::occurrence::Occurrence;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,

    #[error("duplicate record: {0}")]
    Duplicate(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Result of the atomic reserve-and-insert write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReserveOutcome {
    Created,
    CapacityExceeded { available: u32 },
}

/// Persistent record store for bookings.
///
/// Implementations must make `insert_reserving` atomic with respect to the
/// occurrence capacity decrement, and `apply_transition` conditional on the
/// expected status pair so racing writers cannot both apply a payment
/// side-effect.
#[async_trait]
pub trait BookingRepository: Send + Sync {
    /// Atomically decrement the occurrence's remaining capacity by the
    /// booking's party size and insert the booking. Fails the reservation,
    /// without inserting, when capacity would go negative.
    async fn insert_reserving(&self, booking: &Booking) -> Result<ReserveOutcome, StoreError>;

    async fn get(&self, id: Uuid) -> Result<Option<Booking>, StoreError>;

    async fn get_by_reference(&self, reference: &str) -> Result<Option<Booking>, StoreError>;

    /// Conditional status write: applies `update` only if the stored pair
    /// still equals `expected`. Returns `false` when it no longer does.
    /// Timestamps in `update` are written only where the stored value is
    /// still unset.
    async fn apply_transition(
        &self,
        id: Uuid,
        expected: (BookingStatus, PaymentStatus),
        update: &TransitionUpdate,
    ) -> Result<bool, StoreError>;

    /// Confirmed, still-authorized bookings whose occurrence starts at or
    /// before `horizon` (deferred capture sweep).
    async fn list_due_for_capture(&self, horizon: DateTime<Utc>) -> Result<Vec<Booking>, StoreError>;

    /// Pending, authorized bookings whose confirmation deadline has passed.
    async fn list_overdue_pending(&self, now: DateTime<Utc>) -> Result<Vec<Booking>, StoreError>;

    /// Confirmed, captured bookings whose occurrence has already started.
    async fn list_completable(&self, now: DateTime<Utc>) -> Result<Vec<Booking>, StoreError>;
}

#[async_trait]
pub trait OccurrenceRepository: Send + Sync {
    async fn get_occurrence(&self, id: Uuid) -> Result<Option<Occurrence>, StoreError>;

    /// Return spots to an occurrence after a decline or cancellation, capped
    /// at its maximum capacity.
    async fn release_spots(&self, id: Uuid, spots: u32) -> Result<(), StoreError>;

    async fn upsert(&self, occurrence: &Occurrence) -> Result<(), StoreError>;
}
