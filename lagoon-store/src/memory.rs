use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use lagoon_core::booking::{Booking, BookingStatus, PaymentStatus, TransitionUpdate};
use lagoon_core::identity::{AccountError, AccountResolver, TouristAccount};
use lagoon_core::occurrence::Occurrence;
use lagoon_core::repository::{
    BookingRepository, OccurrenceRepository, ReserveOutcome, StoreError,
};

#[derive(Default)]
struct Inner {
    bookings: HashMap<Uuid, Booking>,
    reference_index: HashMap<String, Uuid>,
    occurrences: HashMap<Uuid, Occurrence>,
    accounts: HashMap<String, TouristAccount>,
}

/// In-memory record store, authoritative for tests and local runs.
///
/// One mutex guards all tables, which is what makes `insert_reserving` a
/// single atomic check-decrement-insert: two racing bookings can never both
/// observe the same spare capacity.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BookingRepository for MemoryStore {
    async fn insert_reserving(&self, booking: &Booking) -> Result<ReserveOutcome, StoreError> {
        let mut inner = self.inner.lock().await;

        if inner.reference_index.contains_key(&booking.reference) {
            return Err(StoreError::Duplicate(booking.reference.clone()));
        }

        let spots = booking.party_size();
        let occurrence = inner
            .occurrences
            .get_mut(&booking.occurrence_id)
            .ok_or(StoreError::NotFound)?;

        if occurrence.available_spots < spots {
            return Ok(ReserveOutcome::CapacityExceeded {
                available: occurrence.available_spots,
            });
        }
        occurrence.available_spots -= spots;

        inner
            .reference_index
            .insert(booking.reference.clone(), booking.id);
        inner.bookings.insert(booking.id, booking.clone());
        Ok(ReserveOutcome::Created)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Booking>, StoreError> {
        Ok(self.inner.lock().await.bookings.get(&id).cloned())
    }

    async fn get_by_reference(&self, reference: &str) -> Result<Option<Booking>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .reference_index
            .get(reference)
            .and_then(|id| inner.bookings.get(id))
            .cloned())
    }

    async fn apply_transition(
        &self,
        id: Uuid,
        expected: (BookingStatus, PaymentStatus),
        update: &TransitionUpdate,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        let booking = inner.bookings.get_mut(&id).ok_or(StoreError::NotFound)?;

        if booking.status_pair() != expected {
            return Ok(false);
        }

        booking.booking_status = update.booking_status;
        booking.payment_status = update.payment_status;
        // Timestamps are set exactly once, never rewritten.
        if booking.confirmed_at.is_none() {
            booking.confirmed_at = update.confirmed_at;
        }
        if booking.declined_at.is_none() {
            booking.declined_at = update.declined_at;
        }
        if booking.payment_captured_at.is_none() {
            booking.payment_captured_at = update.payment_captured_at;
        }
        if booking.cancelled_at.is_none() {
            booking.cancelled_at = update.cancelled_at;
        }
        if booking.completed_at.is_none() {
            booking.completed_at = update.completed_at;
        }

        Ok(true)
    }

    async fn list_due_for_capture(
        &self,
        horizon: DateTime<Utc>,
    ) -> Result<Vec<Booking>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .bookings
            .values()
            .filter(|b| {
                b.status_pair() == (BookingStatus::Confirmed, PaymentStatus::Authorized)
                    && b.occurrence_starts_at <= horizon
            })
            .cloned()
            .collect())
    }

    async fn list_overdue_pending(&self, now: DateTime<Utc>) -> Result<Vec<Booking>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .bookings
            .values()
            .filter(|b| {
                b.status_pair() == (BookingStatus::Pending, PaymentStatus::Authorized)
                    && b.confirmation_deadline <= now
            })
            .cloned()
            .collect())
    }

    async fn list_completable(&self, now: DateTime<Utc>) -> Result<Vec<Booking>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .bookings
            .values()
            .filter(|b| {
                b.status_pair() == (BookingStatus::Confirmed, PaymentStatus::Captured)
                    && b.occurrence_starts_at <= now
            })
            .cloned()
            .collect())
    }
}

#[async_trait]
impl OccurrenceRepository for MemoryStore {
    async fn get_occurrence(&self, id: Uuid) -> Result<Option<Occurrence>, StoreError> {
        Ok(self.inner.lock().await.occurrences.get(&id).cloned())
    }

    async fn release_spots(&self, id: Uuid, spots: u32) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        let occurrence = inner.occurrences.get_mut(&id).ok_or(StoreError::NotFound)?;
        occurrence.available_spots =
            (occurrence.available_spots + spots).min(occurrence.max_capacity);
        Ok(())
    }

    async fn upsert(&self, occurrence: &Occurrence) -> Result<(), StoreError> {
        self.inner
            .lock()
            .await
            .occurrences
            .insert(occurrence.id, occurrence.clone());
        Ok(())
    }
}

#[async_trait]
impl AccountResolver for MemoryStore {
    async fn resolve_or_create(
        &self,
        first_name: &str,
        last_name: &str,
        email: &str,
        phone: Option<&str>,
    ) -> Result<Uuid, AccountError> {
        let key = email.trim().to_ascii_lowercase();
        if key.is_empty() {
            return Err(AccountError::InvalidIdentity(
                "email must not be empty".to_string(),
            ));
        }

        let mut inner = self.inner.lock().await;
        if let Some(account) = inner.accounts.get(&key) {
            return Ok(account.id);
        }

        let account = TouristAccount {
            id: Uuid::new_v4(),
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            email: key.clone(),
            phone: phone.map(str::to_string),
            created_at: Utc::now(),
        };
        let id = account.id;
        inner.accounts.insert(key, account);
        Ok(id)
    }
}
