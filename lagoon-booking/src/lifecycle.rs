use chrono::Utc;
use dashmap::DashMap;
use lagoon_core::booking::{Booking, BookingStatus, PaymentStatus, TransitionUpdate};
use lagoon_core::events::{BookingEvent, NotificationSink};
use lagoon_core::payment::{GatewayError, PaymentGateway};
use lagoon_core::repository::{BookingRepository, OccurrenceRepository, StoreError};
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// External events the state machine accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    OperatorConfirmed,
    OperatorDeclined,
    CaptureTriggered,
    CancellationRequested,
    OccurrencePassed,
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleEvent::OperatorConfirmed => "operator_confirmed",
            LifecycleEvent::OperatorDeclined => "operator_declined",
            LifecycleEvent::CaptureTriggered => "capture_triggered",
            LifecycleEvent::CancellationRequested => "cancellation_requested",
            LifecycleEvent::OccurrencePassed => "occurrence_passed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    Applied,
    /// The target state was already in effect; the duplicate event is a
    /// no-op and no gateway call was made.
    AlreadyApplied,
}

#[derive(Debug, thiserror::Error)]
pub enum TransitionError {
    #[error("booking not found: {0}")]
    NotFound(Uuid),

    /// A programming or integration error, never a retryable failure; logged
    /// and surfaced as a generic failure to external triggers.
    #[error("illegal transition: {event} on {from_booking}/{from_payment}")]
    Illegal {
        event: LifecycleEvent,
        from_booking: BookingStatus,
        from_payment: PaymentStatus,
    },

    #[error("booking {0} has a held payment status but no payment record")]
    MissingPayment(Uuid),

    /// The conditional status write found the booking changed between read
    /// and write. The losing action is rejected outright, never retried
    /// blindly.
    #[error("concurrent update lost for booking {0}")]
    Conflict(Uuid),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// The authoritative mapping of `(booking_status, payment_status)` to legal
/// transitions and payment side-effects.
///
/// Every handler acquires the booking's lock, re-reads current state, and
/// no-ops when the target side-effect was already applied, so re-delivered
/// events never double-capture or double-refund. The per-booking lock also
/// serializes capture/void so the gateway is never invoked concurrently for
/// the same charge.
pub struct LifecycleEngine {
    bookings: Arc<dyn BookingRepository>,
    occurrences: Arc<dyn OccurrenceRepository>,
    gateway: Arc<dyn PaymentGateway>,
    notifier: Arc<dyn NotificationSink>,
    locks: DashMap<Uuid, Arc<Mutex<()>>>,
}

impl LifecycleEngine {
    pub fn new(
        bookings: Arc<dyn BookingRepository>,
        occurrences: Arc<dyn OccurrenceRepository>,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            bookings,
            occurrences,
            gateway,
            notifier,
            locks: DashMap::new(),
        }
    }

    /// Operator accepts a pending booking. Capture stays deferred.
    pub async fn confirm(&self, booking_id: Uuid) -> Result<TransitionOutcome, TransitionError> {
        let lock = self.lock_for(booking_id);
        let _guard = lock.lock().await;

        let booking = self.load(booking_id).await?;
        match booking.status_pair() {
            (BookingStatus::Pending, PaymentStatus::Authorized) => {
                let update = TransitionUpdate {
                    confirmed_at: Some(Utc::now()),
                    ..TransitionUpdate::to(BookingStatus::Confirmed, PaymentStatus::Authorized)
                };
                self.commit(&booking, LifecycleEvent::OperatorConfirmed, &update)
                    .await?;
                Ok(TransitionOutcome::Applied)
            }
            (BookingStatus::Confirmed, _) => Ok(TransitionOutcome::AlreadyApplied),
            (from_booking, from_payment) => Err(TransitionError::Illegal {
                event: LifecycleEvent::OperatorConfirmed,
                from_booking,
                from_payment,
            }),
        }
    }

    /// Capture the full authorized amount of a confirmed booking, triggered
    /// near the occurrence date or manually.
    pub async fn capture(&self, booking_id: Uuid) -> Result<TransitionOutcome, TransitionError> {
        let lock = self.lock_for(booking_id);
        let _guard = lock.lock().await;

        let booking = self.load(booking_id).await?;
        match booking.status_pair() {
            (BookingStatus::Confirmed, PaymentStatus::Authorized) => {
                let payment = booking
                    .payment
                    .as_ref()
                    .ok_or(TransitionError::MissingPayment(booking.id))?;
                self.gateway.capture(&payment.external_ref).await?;

                let update = TransitionUpdate {
                    payment_captured_at: Some(Utc::now()),
                    ..TransitionUpdate::to(BookingStatus::Confirmed, PaymentStatus::Captured)
                };
                self.commit(&booking, LifecycleEvent::CaptureTriggered, &update)
                    .await?;
                Ok(TransitionOutcome::Applied)
            }
            (BookingStatus::Confirmed | BookingStatus::Completed, PaymentStatus::Captured) => {
                Ok(TransitionOutcome::AlreadyApplied)
            }
            (from_booking, from_payment) => Err(TransitionError::Illegal {
                event: LifecycleEvent::CaptureTriggered,
                from_booking,
                from_payment,
            }),
        }
    }

    /// Operator rejects a pending booking; the hold is released in full.
    pub async fn decline(&self, booking_id: Uuid) -> Result<TransitionOutcome, TransitionError> {
        let lock = self.lock_for(booking_id);
        let _guard = lock.lock().await;

        let booking = self.load(booking_id).await?;
        match booking.status_pair() {
            (BookingStatus::Pending, payment_status) if payment_status.money_held() => {
                let payment = booking
                    .payment
                    .as_ref()
                    .ok_or(TransitionError::MissingPayment(booking.id))?;
                self.gateway.void_or_refund(&payment.external_ref).await?;

                let update = TransitionUpdate {
                    declined_at: Some(Utc::now()),
                    ..TransitionUpdate::to(BookingStatus::Declined, PaymentStatus::Refunded)
                };
                self.commit(&booking, LifecycleEvent::OperatorDeclined, &update)
                    .await?;
                self.release_capacity(&booking).await;
                Ok(TransitionOutcome::Applied)
            }
            (BookingStatus::Declined, _) => Ok(TransitionOutcome::AlreadyApplied),
            (from_booking, from_payment) => Err(TransitionError::Illegal {
                event: LifecycleEvent::OperatorDeclined,
                from_booking,
                from_payment,
            }),
        }
    }

    /// Tourist-initiated cancellation from any pre-completion state. The
    /// refund path depends on the payment status, not the booking status: an
    /// uncaptured hold is voided, a captured charge is refunded, and a
    /// booking with no money held just flips state.
    pub async fn cancel(&self, booking_id: Uuid) -> Result<TransitionOutcome, TransitionError> {
        let lock = self.lock_for(booking_id);
        let _guard = lock.lock().await;

        let booking = self.load(booking_id).await?;
        match booking.status_pair() {
            (BookingStatus::Pending | BookingStatus::Confirmed, payment_status) => {
                let target_payment = if payment_status.money_held() {
                    let payment = booking
                        .payment
                        .as_ref()
                        .ok_or(TransitionError::MissingPayment(booking.id))?;
                    self.gateway.void_or_refund(&payment.external_ref).await?;
                    PaymentStatus::Refunded
                } else {
                    payment_status
                };

                let update = TransitionUpdate {
                    cancelled_at: Some(Utc::now()),
                    ..TransitionUpdate::to(BookingStatus::Cancelled, target_payment)
                };
                self.commit(&booking, LifecycleEvent::CancellationRequested, &update)
                    .await?;
                self.release_capacity(&booking).await;
                Ok(TransitionOutcome::Applied)
            }
            (BookingStatus::Cancelled, _) => Ok(TransitionOutcome::AlreadyApplied),
            (from_booking, from_payment) => Err(TransitionError::Illegal {
                event: LifecycleEvent::CancellationRequested,
                from_booking,
                from_payment,
            }),
        }
    }

    /// Occurrence date passed without incident; the booking settles. Only a
    /// captured booking may complete, so the sweep captures before it
    /// completes.
    pub async fn complete(&self, booking_id: Uuid) -> Result<TransitionOutcome, TransitionError> {
        let lock = self.lock_for(booking_id);
        let _guard = lock.lock().await;

        let booking = self.load(booking_id).await?;
        match booking.status_pair() {
            (BookingStatus::Confirmed, PaymentStatus::Captured) => {
                let update = TransitionUpdate {
                    completed_at: Some(Utc::now()),
                    ..TransitionUpdate::to(BookingStatus::Completed, PaymentStatus::Captured)
                };
                self.commit(&booking, LifecycleEvent::OccurrencePassed, &update)
                    .await?;
                Ok(TransitionOutcome::Applied)
            }
            (BookingStatus::Completed, _) => Ok(TransitionOutcome::AlreadyApplied),
            (from_booking, from_payment) => Err(TransitionError::Illegal {
                event: LifecycleEvent::OccurrencePassed,
                from_booking,
                from_payment,
            }),
        }
    }

    fn lock_for(&self, booking_id: Uuid) -> Arc<Mutex<()>> {
        self.locks
            .entry(booking_id)
            .or_insert_with(Default::default)
            .clone()
    }

    async fn load(&self, booking_id: Uuid) -> Result<Booking, TransitionError> {
        self.bookings
            .get(booking_id)
            .await?
            .ok_or(TransitionError::NotFound(booking_id))
    }

    /// Apply the conditional status write and emit the notification. A write
    /// losing its condition means an external writer raced between our read
    /// and write; the payment side-effect has already been taken at that
    /// point, so this is logged loudly and surfaced as a conflict.
    async fn commit(
        &self,
        booking: &Booking,
        event: LifecycleEvent,
        update: &TransitionUpdate,
    ) -> Result<(), TransitionError> {
        let applied = self
            .bookings
            .apply_transition(booking.id, booking.status_pair(), update)
            .await?;
        if !applied {
            tracing::error!(
                reference = %booking.reference,
                %event,
                "conditional transition write lost its precondition"
            );
            return Err(TransitionError::Conflict(booking.id));
        }

        tracing::info!(
            reference = %booking.reference,
            %event,
            booking_status = %update.booking_status,
            payment_status = %update.payment_status,
            "booking transition applied"
        );

        let event = BookingEvent {
            booking_id: booking.id,
            reference: booking.reference.clone(),
            booking_status: update.booking_status,
            payment_status: update.payment_status,
            occurred_at: Utc::now(),
        };
        if let Err(err) = self.notifier.booking_updated(&event).await {
            tracing::warn!(reference = %event.reference, error = %err, "status notification failed");
        }

        Ok(())
    }

    /// Return the party's spots to the occurrence. Capacity bookkeeping must
    /// never roll back a committed money transition, so failures only warn.
    async fn release_capacity(&self, booking: &Booking) {
        if let Err(err) = self
            .occurrences
            .release_spots(booking.occurrence_id, booking.party_size())
            .await
        {
            tracing::warn!(
                reference = %booking.reference,
                error = %err,
                "failed to release occurrence capacity"
            );
        }
    }
}
