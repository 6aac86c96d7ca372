use chrono::{Duration, Utc};
use lagoon_core::booking::{Booking, BookingStatus, PaymentStatus, BASE_CURRENCY};
use lagoon_core::events::{BookingEvent, NotificationSink};
use lagoon_core::identity::{AccountError, AccountResolver};
use lagoon_core::payment::{
    AuthorizeRequest, DeclineReason, GatewayError, PaymentGateway, PaymentRecord,
};
use lagoon_core::repository::{BookingRepository, OccurrenceRepository, ReserveOutcome, StoreError};
use std::sync::Arc;
use uuid::Uuid;

use crate::reference;
use crate::split::{self, CommissionRate, SplitError};
use crate::validate::{validate_intake, BookingIntake, FieldViolation};

/// Engine-level knobs resolved from configuration at startup.
#[derive(Debug, Clone)]
pub struct BookingPolicy {
    /// Applied when the occurrence carries no per-operator override.
    pub default_commission: CommissionRate,
    /// How long the operator has to decide before the sweep auto-declines.
    pub confirmation_window: Duration,
}

impl Default for BookingPolicy {
    fn default() -> Self {
        Self {
            default_commission: CommissionRate::default(),
            confirmation_window: Duration::hours(24),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    /// Every violated field at once, so the caller can highlight all of them.
    #[error("intake validation failed")]
    Validation(Vec<FieldViolation>),

    #[error("occurrence not found: {0}")]
    OccurrenceNotFound(Uuid),

    #[error(transparent)]
    Account(#[from] AccountError),

    #[error("no operator resolvable for occurrence {0}")]
    OperatorResolution(Uuid),

    #[error("insufficient capacity: requested {requested}, available {available}")]
    CapacityExceeded { requested: u32, available: u32 },

    #[error("payment declined ({0})")]
    PaymentDeclined(DeclineReason),

    #[error("payment processor unavailable: {0}")]
    GatewayUnavailable(String),

    #[error(transparent)]
    Split(#[from] SplitError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Turns a validated intake form into an authorized, persisted booking.
///
/// Exactly one account call, one authorization call, and one persistence
/// write per attempt. Any failure after a successful authorization voids the
/// hold before the error is returned, so no paid-but-unrecorded charge can
/// remain.
pub struct BookingOrchestrator {
    occurrences: Arc<dyn OccurrenceRepository>,
    bookings: Arc<dyn BookingRepository>,
    accounts: Arc<dyn AccountResolver>,
    gateway: Arc<dyn PaymentGateway>,
    notifier: Arc<dyn NotificationSink>,
    policy: BookingPolicy,
}

impl BookingOrchestrator {
    pub fn new(
        occurrences: Arc<dyn OccurrenceRepository>,
        bookings: Arc<dyn BookingRepository>,
        accounts: Arc<dyn AccountResolver>,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn NotificationSink>,
        policy: BookingPolicy,
    ) -> Self {
        Self {
            occurrences,
            bookings,
            accounts,
            gateway,
            notifier,
            policy,
        }
    }

    pub async fn create_booking(&self, intake: BookingIntake) -> Result<Booking, BookingError> {
        let occurrence = self
            .occurrences
            .get_occurrence(intake.occurrence_id)
            .await?
            .ok_or(BookingError::OccurrenceNotFound(intake.occurrence_id))?;

        let now = Utc::now();
        let violations = validate_intake(&intake, &occurrence, now);
        if !violations.is_empty() {
            return Err(BookingError::Validation(violations));
        }

        // Hard stop: no payment step without an account reference.
        let tourist_id = self
            .accounts
            .resolve_or_create(
                intake.customer_first_name.trim(),
                intake.customer_last_name.trim(),
                intake.customer_email.trim(),
                intake.customer_phone.as_deref(),
            )
            .await?;

        let operator_id = occurrence
            .operator_id()
            .ok_or(BookingError::OperatorResolution(occurrence.id))?;

        // Never trust a client-supplied total.
        let subtotal = occurrence.price_per_adult * intake.adult_count as i64
            + occurrence.price_per_child * intake.child_count as i64;

        let rate = match occurrence.commission_rate_bps {
            Some(bps) => CommissionRate::from_bps(bps)?,
            None => self.policy.default_commission,
        };
        let payment_split = split::split(subtotal, rate)?;

        let booking_reference = reference::generate_reference();

        let request = AuthorizeRequest {
            amount: subtotal,
            currency: BASE_CURRENCY.to_string(),
            reference: booking_reference.clone(),
            idempotency_key: format!("auth-{booking_reference}"),
            operator_id,
            split: payment_split,
            commission_rate_bps: rate.bps(),
            metadata: serde_json::json!({
                "occurrence_id": occurrence.id,
                "adult_count": intake.adult_count,
                "child_count": intake.child_count,
                "customer_email": intake.customer_email.trim(),
            }),
        };

        let authorized = self.gateway.authorize(&request).await.map_err(|err| match err {
            GatewayError::Declined(reason) => BookingError::PaymentDeclined(reason),
            GatewayError::Unavailable(message) | GatewayError::Rejected(message) => {
                BookingError::GatewayUnavailable(message)
            }
        })?;

        let booking = Booking {
            id: Uuid::new_v4(),
            reference: booking_reference,
            occurrence_id: occurrence.id,
            operator_id,
            tourist_id,
            occurrence_starts_at: occurrence.starts_at,
            customer_first_name: intake.customer_first_name.trim().to_string(),
            customer_last_name: intake.customer_last_name.trim().to_string(),
            customer_email: intake.customer_email.trim().to_string(),
            customer_phone: intake.customer_phone.clone(),
            adult_count: intake.adult_count,
            child_count: intake.child_count,
            adult_price: occurrence.price_per_adult,
            child_price: occurrence.price_per_child,
            subtotal,
            total_amount: subtotal,
            currency: BASE_CURRENCY.to_string(),
            booking_status: BookingStatus::Pending,
            payment_status: PaymentStatus::Authorized,
            payment: Some(PaymentRecord {
                external_ref: authorized.external_ref.clone(),
                amount_authorized: authorized.amount,
                operator_amount: authorized.split.operator_amount,
                platform_fee: authorized.split.platform_fee,
                commission_rate_bps: rate.bps(),
            }),
            confirmation_deadline: now + self.policy.confirmation_window,
            created_at: now,
            confirmed_at: None,
            declined_at: None,
            payment_captured_at: None,
            cancelled_at: None,
            completed_at: None,
        };

        match self.bookings.insert_reserving(&booking).await {
            Ok(ReserveOutcome::Created) => {}
            Ok(ReserveOutcome::CapacityExceeded { available }) => {
                self.void_after_failure(&authorized.external_ref, &booking.reference)
                    .await;
                return Err(BookingError::CapacityExceeded {
                    requested: booking.party_size(),
                    available,
                });
            }
            Err(err) => {
                self.void_after_failure(&authorized.external_ref, &booking.reference)
                    .await;
                return Err(err.into());
            }
        }

        tracing::info!(
            reference = %booking.reference,
            total = booking.total_amount,
            operator_amount = authorized.split.operator_amount,
            platform_fee = authorized.split.platform_fee,
            "booking authorized and persisted"
        );

        let event = BookingEvent::from_booking(&booking);
        if let Err(err) = self.notifier.booking_updated(&event).await {
            tracing::warn!(reference = %booking.reference, error = %err, "status notification failed");
        }

        Ok(booking)
    }

    /// Compensating void after a failed reservation or persistence write.
    /// A failure here leaves a dangling hold and is the one condition that
    /// demands operator attention, hence the error-level log.
    async fn void_after_failure(&self, external_ref: &str, booking_reference: &str) {
        if let Err(err) = self.gateway.void_or_refund(external_ref).await {
            tracing::error!(
                reference = booking_reference,
                external_ref,
                error = %err,
                "failed to void authorization after aborted booking"
            );
        } else {
            tracing::info!(
                reference = booking_reference,
                external_ref,
                "voided authorization after aborted booking"
            );
        }
    }
}

#[cfg(test)]
pub(crate) mod tests_support {
    use super::*;
    use lagoon_core::occurrence::{Occurrence, OccurrenceSource};

    pub fn seeded_occurrence(spots: u32) -> Occurrence {
        let now = Utc::now();
        Occurrence {
            id: Uuid::new_v4(),
            name: "Lagoon snorkeling".to_string(),
            source: OccurrenceSource::Listing {
                operator_id: Uuid::new_v4(),
            },
            starts_at: now + Duration::days(3),
            booking_deadline: now + Duration::days(2),
            price_per_adult: 15_000,
            price_per_child: 7_500,
            max_capacity: spots,
            available_spots: spots,
            commission_rate_bps: None,
        }
    }

    /// A booking exactly as the orchestrator leaves it after a successful
    /// authorization: pending/authorized with the split persisted verbatim.
    pub async fn booking_fixture(occurrence: &Occurrence, gateway: &dyn PaymentGateway) -> Booking {
        let booking_reference = reference::generate_reference();
        let rate = CommissionRate::default();
        let subtotal = occurrence.price_per_adult * 2;
        let payment_split = split::split(subtotal, rate).unwrap();

        let operator_id = occurrence.operator_id().unwrap();
        let request = AuthorizeRequest {
            amount: subtotal,
            currency: BASE_CURRENCY.to_string(),
            reference: booking_reference.clone(),
            idempotency_key: format!("auth-{booking_reference}"),
            operator_id,
            split: payment_split,
            commission_rate_bps: rate.bps(),
            metadata: serde_json::json!({}),
        };
        let authorized = gateway.authorize(&request).await.unwrap();

        let now = Utc::now();
        Booking {
            id: Uuid::new_v4(),
            reference: booking_reference,
            occurrence_id: occurrence.id,
            operator_id,
            tourist_id: Uuid::new_v4(),
            occurrence_starts_at: occurrence.starts_at,
            customer_first_name: "Moea".to_string(),
            customer_last_name: "Tehani".to_string(),
            customer_email: "moea@example.com".to_string(),
            customer_phone: None,
            adult_count: 2,
            child_count: 0,
            adult_price: occurrence.price_per_adult,
            child_price: occurrence.price_per_child,
            subtotal,
            total_amount: subtotal,
            currency: BASE_CURRENCY.to_string(),
            booking_status: BookingStatus::Pending,
            payment_status: PaymentStatus::Authorized,
            payment: Some(PaymentRecord {
                external_ref: authorized.external_ref,
                amount_authorized: subtotal,
                operator_amount: payment_split.operator_amount,
                platform_fee: payment_split.platform_fee,
                commission_rate_bps: rate.bps(),
            }),
            confirmation_deadline: now + Duration::hours(24),
            created_at: now,
            confirmed_at: None,
            declined_at: None,
            payment_captured_at: None,
            cancelled_at: None,
            completed_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::tests_support::seeded_occurrence;
    use super::*;
    use crate::gateway::{GatewayCall, MockGateway};
    use async_trait::async_trait;
    use chrono::DateTime;
    use lagoon_core::booking::TransitionUpdate;
    use lagoon_core::events::LogSink;
    use lagoon_core::occurrence::{Occurrence, OccurrenceSource};
    use lagoon_store::memory::MemoryStore;

    fn intake_for(occurrence: &Occurrence, adults: u32, children: u32) -> BookingIntake {
        BookingIntake {
            occurrence_id: occurrence.id,
            customer_first_name: "Moea".to_string(),
            customer_last_name: "Tehani".to_string(),
            customer_email: "moea@example.com".to_string(),
            customer_email_confirm: "moea@example.com".to_string(),
            customer_phone: Some("+689 87 12 34 56".to_string()),
            adult_count: adults,
            child_count: children,
        }
    }

    fn orchestrator(
        store: Arc<MemoryStore>,
        gateway: Arc<MockGateway>,
    ) -> BookingOrchestrator {
        BookingOrchestrator::new(
            store.clone(),
            store.clone(),
            store,
            gateway,
            Arc::new(LogSink),
            BookingPolicy::default(),
        )
    }

    #[tokio::test]
    async fn successful_booking_persists_pending_authorized_with_frozen_split() {
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(MockGateway::new());
        let occurrence = seeded_occurrence(4);
        store.upsert(&occurrence).await.unwrap();

        let orch = orchestrator(store.clone(), gateway.clone());
        let booking = orch
            .create_booking(intake_for(&occurrence, 1, 0))
            .await
            .unwrap();

        assert_eq!(booking.booking_status, BookingStatus::Pending);
        assert_eq!(booking.payment_status, PaymentStatus::Authorized);
        assert_eq!(booking.total_amount, 15_000);

        let payment = booking.payment.as_ref().unwrap();
        assert_eq!(payment.operator_amount, 13_350);
        assert_eq!(payment.platform_fee, 1_650);
        assert_eq!(payment.commission_rate_bps, 1_100);

        let stored = store.get(booking.id).await.unwrap().unwrap();
        assert_eq!(stored.reference, booking.reference);

        let remaining = store
            .get_occurrence(occurrence.id)
            .await
            .unwrap()
            .unwrap()
            .available_spots;
        assert_eq!(remaining, 3);
        assert_eq!(gateway.call_count(GatewayCall::Authorize), 1);
        assert_eq!(gateway.call_count(GatewayCall::VoidOrRefund), 0);
    }

    #[tokio::test]
    async fn two_simultaneous_bookings_fill_the_last_two_spots() {
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(MockGateway::new());
        let occurrence = seeded_occurrence(2);
        store.upsert(&occurrence).await.unwrap();

        let orch = orchestrator(store.clone(), gateway.clone());
        let (a, b) = tokio::join!(
            orch.create_booking(intake_for(&occurrence, 1, 0)),
            orch.create_booking(intake_for(&occurrence, 1, 0)),
        );

        let a = a.unwrap();
        let b = b.unwrap();
        for booking in [&a, &b] {
            let payment = booking.payment.as_ref().unwrap();
            assert_eq!(payment.operator_amount, 13_350);
            assert_eq!(payment.platform_fee, 1_650);
        }
        assert_ne!(a.reference, b.reference);

        let remaining = store
            .get_occurrence(occurrence.id)
            .await
            .unwrap()
            .unwrap()
            .available_spots;
        assert_eq!(remaining, 0);
    }

    #[tokio::test]
    async fn losing_a_capacity_race_voids_the_authorization() {
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(MockGateway::new());
        let occurrence = seeded_occurrence(1);
        store.upsert(&occurrence).await.unwrap();

        let orch = orchestrator(store.clone(), gateway.clone());
        let (a, b) = tokio::join!(
            orch.create_booking(intake_for(&occurrence, 1, 0)),
            orch.create_booking(intake_for(&occurrence, 1, 0)),
        );

        let (winner, loser) = if a.is_ok() { (a, b) } else { (b, a) };
        winner.unwrap();
        match loser.unwrap_err() {
            BookingError::CapacityExceeded {
                requested,
                available,
            } => {
                assert_eq!(requested, 1);
                assert_eq!(available, 0);
            }
            other => panic!("unexpected error: {other}"),
        }

        // Both holds were taken, the loser's was released again.
        assert_eq!(gateway.call_count(GatewayCall::Authorize), 2);
        assert_eq!(gateway.call_count(GatewayCall::VoidOrRefund), 1);

        let remaining = store
            .get_occurrence(occurrence.id)
            .await
            .unwrap()
            .unwrap()
            .available_spots;
        assert_eq!(remaining, 0);
    }

    #[tokio::test]
    async fn invalid_intake_reports_every_field_and_never_reaches_the_gateway() {
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(MockGateway::new());
        let occurrence = seeded_occurrence(4);
        store.upsert(&occurrence).await.unwrap();

        let mut intake = intake_for(&occurrence, 1, 0);
        intake.customer_first_name = String::new();
        intake.customer_email_confirm = "other@example.com".to_string();

        let orch = orchestrator(store.clone(), gateway.clone());
        match orch.create_booking(intake).await.unwrap_err() {
            BookingError::Validation(violations) => {
                let fields: Vec<&str> = violations.iter().map(|v| v.field).collect();
                assert!(fields.contains(&"customer_first_name"));
                assert!(fields.contains(&"customer_email_confirm"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(gateway.calls().is_empty());
    }

    #[tokio::test]
    async fn declined_card_surfaces_reason_and_persists_nothing() {
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(MockGateway::declining(DeclineReason::ExpiredCard));
        let occurrence = seeded_occurrence(4);
        store.upsert(&occurrence).await.unwrap();

        let orch = orchestrator(store.clone(), gateway.clone());
        match orch
            .create_booking(intake_for(&occurrence, 1, 0))
            .await
            .unwrap_err()
        {
            BookingError::PaymentDeclined(reason) => {
                assert_eq!(reason, DeclineReason::ExpiredCard)
            }
            other => panic!("unexpected error: {other}"),
        }

        // No booking row, no spot consumed, nothing to void.
        let remaining = store
            .get_occurrence(occurrence.id)
            .await
            .unwrap()
            .unwrap()
            .available_spots;
        assert_eq!(remaining, 4);
        assert_eq!(gateway.call_count(GatewayCall::VoidOrRefund), 0);
    }

    #[tokio::test]
    async fn unreachable_processor_is_reported_as_unavailable() {
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(MockGateway::unreachable());
        let occurrence = seeded_occurrence(4);
        store.upsert(&occurrence).await.unwrap();

        let orch = orchestrator(store.clone(), gateway.clone());
        let err = orch
            .create_booking(intake_for(&occurrence, 1, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::GatewayUnavailable(_)));
    }

    #[tokio::test]
    async fn occurrence_without_operator_fails_before_payment() {
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(MockGateway::new());
        let mut occurrence = seeded_occurrence(4);
        occurrence.source = OccurrenceSource::TemplateInstance {
            template_id: Uuid::new_v4(),
            schedule_id: Uuid::new_v4(),
            operator_id: None,
        };
        store.upsert(&occurrence).await.unwrap();

        let orch = orchestrator(store.clone(), gateway.clone());
        let err = orch
            .create_booking(intake_for(&occurrence, 1, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::OperatorResolution(_)));
        assert!(gateway.calls().is_empty());
    }

    /// Booking repository whose write path is down; occurrence reads still
    /// work so the flow reaches the persistence step.
    struct BrokenWrites(Arc<MemoryStore>);

    #[async_trait]
    impl BookingRepository for BrokenWrites {
        async fn insert_reserving(&self, _booking: &Booking) -> Result<ReserveOutcome, StoreError> {
            Err(StoreError::Backend("write timed out".to_string()))
        }

        async fn get(&self, id: Uuid) -> Result<Option<Booking>, StoreError> {
            self.0.get(id).await
        }

        async fn get_by_reference(&self, reference: &str) -> Result<Option<Booking>, StoreError> {
            self.0.get_by_reference(reference).await
        }

        async fn apply_transition(
            &self,
            id: Uuid,
            expected: (BookingStatus, PaymentStatus),
            update: &TransitionUpdate,
        ) -> Result<bool, StoreError> {
            self.0.apply_transition(id, expected, update).await
        }

        async fn list_due_for_capture(
            &self,
            horizon: DateTime<Utc>,
        ) -> Result<Vec<Booking>, StoreError> {
            self.0.list_due_for_capture(horizon).await
        }

        async fn list_overdue_pending(
            &self,
            now: DateTime<Utc>,
        ) -> Result<Vec<Booking>, StoreError> {
            self.0.list_overdue_pending(now).await
        }

        async fn list_completable(&self, now: DateTime<Utc>) -> Result<Vec<Booking>, StoreError> {
            self.0.list_completable(now).await
        }
    }

    #[tokio::test]
    async fn persistence_failure_after_authorization_voids_the_hold() {
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(MockGateway::new());
        let occurrence = seeded_occurrence(4);
        store.upsert(&occurrence).await.unwrap();

        let orch = BookingOrchestrator::new(
            store.clone(),
            Arc::new(BrokenWrites(store.clone())),
            store.clone(),
            gateway.clone(),
            Arc::new(LogSink),
            BookingPolicy::default(),
        );

        let err = orch
            .create_booking(intake_for(&occurrence, 1, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::Store(_)));
        assert_eq!(gateway.call_count(GatewayCall::Authorize), 1);
        assert_eq!(gateway.call_count(GatewayCall::VoidOrRefund), 1);
    }
}
