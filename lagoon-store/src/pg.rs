use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use std::time::Duration;
use uuid::Uuid;

use lagoon_core::booking::{Booking, BookingStatus, PaymentStatus, TransitionUpdate};
use lagoon_core::identity::{AccountError, AccountResolver};
use lagoon_core::occurrence::{Occurrence, OccurrenceSource};
use lagoon_core::payment::PaymentRecord;
use lagoon_core::repository::{
    BookingRepository, OccurrenceRepository, ReserveOutcome, StoreError,
};

/// Postgres-backed record store. See `schema.sql` for the expected tables.
///
/// The capacity invariant lives in the conditional
/// `available_spots >= $n` decrement and the transition invariant in the
/// status-pair condition of the UPDATE, so concurrent engine instances are
/// safe without any cross-process lock.
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(url: &str) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(3))
            .connect(url)
            .await?;
        tracing::info!("connected to Postgres booking store");
        Ok(Self { pool })
    }

    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn backend(err: sqlx::Error) -> StoreError {
    StoreError::Backend(err.to_string())
}

fn parse_status(raw: &str) -> Result<BookingStatus, StoreError> {
    raw.parse().map_err(StoreError::Backend)
}

fn parse_payment_status(raw: &str) -> Result<PaymentStatus, StoreError> {
    raw.parse().map_err(StoreError::Backend)
}

const BOOKING_COLUMNS: &str = "id, reference, occurrence_id, operator_id, tourist_id, \
    occurrence_starts_at, customer_first_name, customer_last_name, customer_email, \
    customer_phone, adult_count, child_count, adult_price, child_price, subtotal, \
    total_amount, currency, booking_status, payment_status, payment_external_ref, \
    payment_amount_authorized, payment_operator_amount, payment_platform_fee, \
    payment_commission_rate_bps, confirmation_deadline, created_at, confirmed_at, \
    declined_at, payment_captured_at, cancelled_at, completed_at";

#[derive(sqlx::FromRow)]
struct BookingRow {
    id: Uuid,
    reference: String,
    occurrence_id: Uuid,
    operator_id: Uuid,
    tourist_id: Uuid,
    occurrence_starts_at: DateTime<Utc>,
    customer_first_name: String,
    customer_last_name: String,
    customer_email: String,
    customer_phone: Option<String>,
    adult_count: i32,
    child_count: i32,
    adult_price: i64,
    child_price: i64,
    subtotal: i64,
    total_amount: i64,
    currency: String,
    booking_status: String,
    payment_status: String,
    payment_external_ref: Option<String>,
    payment_amount_authorized: Option<i64>,
    payment_operator_amount: Option<i64>,
    payment_platform_fee: Option<i64>,
    payment_commission_rate_bps: Option<i32>,
    confirmation_deadline: DateTime<Utc>,
    created_at: DateTime<Utc>,
    confirmed_at: Option<DateTime<Utc>>,
    declined_at: Option<DateTime<Utc>>,
    payment_captured_at: Option<DateTime<Utc>>,
    cancelled_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
}

impl BookingRow {
    fn into_booking(self) -> Result<Booking, StoreError> {
        let payment = self.payment_external_ref.map(|external_ref| PaymentRecord {
            external_ref,
            amount_authorized: self.payment_amount_authorized.unwrap_or_default(),
            operator_amount: self.payment_operator_amount.unwrap_or_default(),
            platform_fee: self.payment_platform_fee.unwrap_or_default(),
            commission_rate_bps: self.payment_commission_rate_bps.unwrap_or_default() as u32,
        });

        Ok(Booking {
            id: self.id,
            reference: self.reference,
            occurrence_id: self.occurrence_id,
            operator_id: self.operator_id,
            tourist_id: self.tourist_id,
            occurrence_starts_at: self.occurrence_starts_at,
            customer_first_name: self.customer_first_name,
            customer_last_name: self.customer_last_name,
            customer_email: self.customer_email,
            customer_phone: self.customer_phone,
            adult_count: self.adult_count.max(0) as u32,
            child_count: self.child_count.max(0) as u32,
            adult_price: self.adult_price,
            child_price: self.child_price,
            subtotal: self.subtotal,
            total_amount: self.total_amount,
            currency: self.currency,
            booking_status: parse_status(&self.booking_status)?,
            payment_status: parse_payment_status(&self.payment_status)?,
            payment,
            confirmation_deadline: self.confirmation_deadline,
            created_at: self.created_at,
            confirmed_at: self.confirmed_at,
            declined_at: self.declined_at,
            payment_captured_at: self.payment_captured_at,
            cancelled_at: self.cancelled_at,
            completed_at: self.completed_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct OccurrenceRow {
    id: Uuid,
    name: String,
    source_kind: String,
    operator_id: Option<Uuid>,
    template_id: Option<Uuid>,
    schedule_id: Option<Uuid>,
    starts_at: DateTime<Utc>,
    booking_deadline: DateTime<Utc>,
    price_per_adult: i64,
    price_per_child: i64,
    max_capacity: i32,
    available_spots: i32,
    commission_rate_bps: Option<i32>,
}

impl OccurrenceRow {
    fn into_occurrence(self) -> Result<Occurrence, StoreError> {
        let source = match self.source_kind.as_str() {
            "LISTING" => OccurrenceSource::Listing {
                operator_id: self.operator_id.ok_or_else(|| {
                    StoreError::Backend(format!("listing occurrence {} has no operator", self.id))
                })?,
            },
            "TEMPLATE_INSTANCE" => OccurrenceSource::TemplateInstance {
                template_id: self.template_id.ok_or_else(|| {
                    StoreError::Backend(format!("instance occurrence {} has no template", self.id))
                })?,
                schedule_id: self.schedule_id.ok_or_else(|| {
                    StoreError::Backend(format!("instance occurrence {} has no schedule", self.id))
                })?,
                operator_id: self.operator_id,
            },
            other => {
                return Err(StoreError::Backend(format!(
                    "unknown occurrence source kind: {other}"
                )))
            }
        };

        Ok(Occurrence {
            id: self.id,
            name: self.name,
            source,
            starts_at: self.starts_at,
            booking_deadline: self.booking_deadline,
            price_per_adult: self.price_per_adult,
            price_per_child: self.price_per_child,
            max_capacity: self.max_capacity.max(0) as u32,
            available_spots: self.available_spots.max(0) as u32,
            commission_rate_bps: self.commission_rate_bps.map(|bps| bps.max(0) as u32),
        })
    }
}

#[async_trait]
impl BookingRepository for PgStore {
    async fn insert_reserving(&self, booking: &Booking) -> Result<ReserveOutcome, StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;

        let spots = booking.party_size() as i32;
        let reserved = sqlx::query(
            "UPDATE occurrences SET available_spots = available_spots - $1 \
             WHERE id = $2 AND available_spots >= $1",
        )
        .bind(spots)
        .bind(booking.occurrence_id)
        .execute(&mut *tx)
        .await
        .map_err(backend)?;

        if reserved.rows_affected() == 0 {
            let row = sqlx::query("SELECT available_spots FROM occurrences WHERE id = $1")
                .bind(booking.occurrence_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(backend)?;
            return match row {
                None => Err(StoreError::NotFound),
                Some(row) => {
                    let available: i32 = row.get("available_spots");
                    Ok(ReserveOutcome::CapacityExceeded {
                        available: available.max(0) as u32,
                    })
                }
            };
        }

        let payment = booking.payment.as_ref();
        let insert = sqlx::query(
            "INSERT INTO bookings (id, reference, occurrence_id, operator_id, tourist_id, \
             occurrence_starts_at, customer_first_name, customer_last_name, customer_email, \
             customer_phone, adult_count, child_count, adult_price, child_price, subtotal, \
             total_amount, currency, booking_status, payment_status, payment_external_ref, \
             payment_amount_authorized, payment_operator_amount, payment_platform_fee, \
             payment_commission_rate_bps, confirmation_deadline, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, \
             $17, $18, $19, $20, $21, $22, $23, $24, $25, $26)",
        )
        .bind(booking.id)
        .bind(&booking.reference)
        .bind(booking.occurrence_id)
        .bind(booking.operator_id)
        .bind(booking.tourist_id)
        .bind(booking.occurrence_starts_at)
        .bind(&booking.customer_first_name)
        .bind(&booking.customer_last_name)
        .bind(&booking.customer_email)
        .bind(&booking.customer_phone)
        .bind(booking.adult_count as i32)
        .bind(booking.child_count as i32)
        .bind(booking.adult_price)
        .bind(booking.child_price)
        .bind(booking.subtotal)
        .bind(booking.total_amount)
        .bind(&booking.currency)
        .bind(booking.booking_status.as_str())
        .bind(booking.payment_status.as_str())
        .bind(payment.map(|p| p.external_ref.clone()))
        .bind(payment.map(|p| p.amount_authorized))
        .bind(payment.map(|p| p.operator_amount))
        .bind(payment.map(|p| p.platform_fee))
        .bind(payment.map(|p| p.commission_rate_bps as i32))
        .bind(booking.confirmation_deadline)
        .bind(booking.created_at)
        .execute(&mut *tx)
        .await;

        if let Err(err) = insert {
            if let Some(db_err) = err.as_database_error() {
                if db_err.is_unique_violation() {
                    return Err(StoreError::Duplicate(booking.reference.clone()));
                }
            }
            return Err(backend(err));
        }

        tx.commit().await.map_err(backend)?;
        Ok(ReserveOutcome::Created)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Booking>, StoreError> {
        let row = sqlx::query_as::<_, BookingRow>(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        row.map(BookingRow::into_booking).transpose()
    }

    async fn get_by_reference(&self, reference: &str) -> Result<Option<Booking>, StoreError> {
        let row = sqlx::query_as::<_, BookingRow>(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE reference = $1"
        ))
        .bind(reference)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        row.map(BookingRow::into_booking).transpose()
    }

    async fn apply_transition(
        &self,
        id: Uuid,
        expected: (BookingStatus, PaymentStatus),
        update: &TransitionUpdate,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE bookings SET \
             booking_status = $1, \
             payment_status = $2, \
             confirmed_at = COALESCE(confirmed_at, $3), \
             declined_at = COALESCE(declined_at, $4), \
             payment_captured_at = COALESCE(payment_captured_at, $5), \
             cancelled_at = COALESCE(cancelled_at, $6), \
             completed_at = COALESCE(completed_at, $7) \
             WHERE id = $8 AND booking_status = $9 AND payment_status = $10",
        )
        .bind(update.booking_status.as_str())
        .bind(update.payment_status.as_str())
        .bind(update.confirmed_at)
        .bind(update.declined_at)
        .bind(update.payment_captured_at)
        .bind(update.cancelled_at)
        .bind(update.completed_at)
        .bind(id)
        .bind(expected.0.as_str())
        .bind(expected.1.as_str())
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        if result.rows_affected() > 0 {
            return Ok(true);
        }

        let exists = sqlx::query("SELECT 1 FROM bookings WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        match exists {
            Some(_) => Ok(false),
            None => Err(StoreError::NotFound),
        }
    }

    async fn list_due_for_capture(
        &self,
        horizon: DateTime<Utc>,
    ) -> Result<Vec<Booking>, StoreError> {
        let rows = sqlx::query_as::<_, BookingRow>(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings \
             WHERE booking_status = 'CONFIRMED' AND payment_status = 'AUTHORIZED' \
             AND occurrence_starts_at <= $1"
        ))
        .bind(horizon)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        rows.into_iter().map(BookingRow::into_booking).collect()
    }

    async fn list_overdue_pending(&self, now: DateTime<Utc>) -> Result<Vec<Booking>, StoreError> {
        let rows = sqlx::query_as::<_, BookingRow>(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings \
             WHERE booking_status = 'PENDING' AND payment_status = 'AUTHORIZED' \
             AND confirmation_deadline <= $1"
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        rows.into_iter().map(BookingRow::into_booking).collect()
    }

    async fn list_completable(&self, now: DateTime<Utc>) -> Result<Vec<Booking>, StoreError> {
        let rows = sqlx::query_as::<_, BookingRow>(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings \
             WHERE booking_status = 'CONFIRMED' AND payment_status = 'CAPTURED' \
             AND occurrence_starts_at <= $1"
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        rows.into_iter().map(BookingRow::into_booking).collect()
    }
}

#[async_trait]
impl OccurrenceRepository for PgStore {
    async fn get_occurrence(&self, id: Uuid) -> Result<Option<Occurrence>, StoreError> {
        let row = sqlx::query_as::<_, OccurrenceRow>(
            "SELECT id, name, source_kind, operator_id, template_id, schedule_id, starts_at, \
             booking_deadline, price_per_adult, price_per_child, max_capacity, available_spots, \
             commission_rate_bps FROM occurrences WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        row.map(OccurrenceRow::into_occurrence).transpose()
    }

    async fn release_spots(&self, id: Uuid, spots: u32) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE occurrences SET available_spots = \
             LEAST(available_spots + $1, max_capacity) WHERE id = $2",
        )
        .bind(spots as i32)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn upsert(&self, occurrence: &Occurrence) -> Result<(), StoreError> {
        let (source_kind, operator_id, template_id, schedule_id) = match &occurrence.source {
            OccurrenceSource::Listing { operator_id } => {
                ("LISTING", Some(*operator_id), None, None)
            }
            OccurrenceSource::TemplateInstance {
                template_id,
                schedule_id,
                operator_id,
            } => (
                "TEMPLATE_INSTANCE",
                *operator_id,
                Some(*template_id),
                Some(*schedule_id),
            ),
        };

        sqlx::query(
            "INSERT INTO occurrences (id, name, source_kind, operator_id, template_id, \
             schedule_id, starts_at, booking_deadline, price_per_adult, price_per_child, \
             max_capacity, available_spots, commission_rate_bps) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13) \
             ON CONFLICT (id) DO UPDATE SET \
             name = EXCLUDED.name, source_kind = EXCLUDED.source_kind, \
             operator_id = EXCLUDED.operator_id, template_id = EXCLUDED.template_id, \
             schedule_id = EXCLUDED.schedule_id, starts_at = EXCLUDED.starts_at, \
             booking_deadline = EXCLUDED.booking_deadline, \
             price_per_adult = EXCLUDED.price_per_adult, \
             price_per_child = EXCLUDED.price_per_child, \
             max_capacity = EXCLUDED.max_capacity, \
             available_spots = EXCLUDED.available_spots, \
             commission_rate_bps = EXCLUDED.commission_rate_bps",
        )
        .bind(occurrence.id)
        .bind(&occurrence.name)
        .bind(source_kind)
        .bind(operator_id)
        .bind(template_id)
        .bind(schedule_id)
        .bind(occurrence.starts_at)
        .bind(occurrence.booking_deadline)
        .bind(occurrence.price_per_adult)
        .bind(occurrence.price_per_child)
        .bind(occurrence.max_capacity as i32)
        .bind(occurrence.available_spots as i32)
        .bind(occurrence.commission_rate_bps.map(|bps| bps as i32))
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        Ok(())
    }
}

#[async_trait]
impl AccountResolver for PgStore {
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

        // One round trip, race-safe: a concurrent insert for the same email
        // resolves to the existing row.
        let row = sqlx::query(
            "INSERT INTO tourist_accounts (id, first_name, last_name, email, phone, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (email) DO UPDATE SET email = EXCLUDED.email \
             RETURNING id",
        )
        .bind(Uuid::new_v4())
        .bind(first_name)
        .bind(last_name)
        .bind(&key)
        .bind(phone)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(|err| AccountError::Lookup(err.to_string()))?;

        Ok(row.get("id"))
    }
}
