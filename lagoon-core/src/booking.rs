use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::payment::PaymentRecord;

/// All monetary authority is in one base currency; other currencies are
/// display-only estimates handled outside the engine.
pub const BASE_CURRENCY: &str = "XPF";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Declined,
    Completed,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "PENDING",
            BookingStatus::Confirmed => "CONFIRMED",
            BookingStatus::Declined => "DECLINED",
            BookingStatus::Completed => "COMPLETED",
            BookingStatus::Cancelled => "CANCELLED",
        }
    }

    /// Terminal states admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BookingStatus::Completed | BookingStatus::Declined | BookingStatus::Cancelled
        )
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(BookingStatus::Pending),
            "CONFIRMED" => Ok(BookingStatus::Confirmed),
            "DECLINED" => Ok(BookingStatus::Declined),
            "COMPLETED" => Ok(BookingStatus::Completed),
            "CANCELLED" => Ok(BookingStatus::Cancelled),
            other => Err(format!("unknown booking status: {other}")),
        }
    }
}

/// `None` exists only before an authorization has succeeded; every persisted
/// booking starts at `Authorized`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    None,
    Authorized,
    Captured,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::None => "NONE",
            PaymentStatus::Authorized => "AUTHORIZED",
            PaymentStatus::Captured => "CAPTURED",
            PaymentStatus::Refunded => "REFUNDED",
        }
    }

    /// True while the processor is holding or has transferred money.
    pub fn money_held(&self) -> bool {
        matches!(self, PaymentStatus::Authorized | PaymentStatus::Captured)
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NONE" => Ok(PaymentStatus::None),
            "AUTHORIZED" => Ok(PaymentStatus::Authorized),
            "CAPTURED" => Ok(PaymentStatus::Captured),
            "REFUNDED" => Ok(PaymentStatus::Refunded),
            other => Err(format!("unknown payment status: {other}")),
        }
    }
}

/// One reservation request for one activity occurrence.
///
/// Monetary fields are minor units of [`BASE_CURRENCY`] and immutable once the
/// payment is authorized. Each timestamp is set exactly once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: Uuid,
    /// Human-shareable token, stable once the booking is persisted.
    pub reference: String,
    pub occurrence_id: Uuid,
    pub operator_id: Uuid,
    pub tourist_id: Uuid,
    /// Copied from the occurrence at creation time so lifecycle sweeps do not
    /// need a join against the occurrence source.
    pub occurrence_starts_at: DateTime<Utc>,
    pub customer_first_name: String,
    pub customer_last_name: String,
    pub customer_email: String,
    pub customer_phone: Option<String>,
    pub adult_count: u32,
    pub child_count: u32,
    pub adult_price: i64,
    pub child_price: i64,
    pub subtotal: i64,
    pub total_amount: i64,
    pub currency: String,
    pub booking_status: BookingStatus,
    pub payment_status: PaymentStatus,
    pub payment: Option<PaymentRecord>,
    /// Pending bookings the operator has not decided by this instant are
    /// auto-declined by the sweep.
    pub confirmation_deadline: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub declined_at: Option<DateTime<Utc>>,
    pub payment_captured_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Booking {
    pub fn status_pair(&self) -> (BookingStatus, PaymentStatus) {
        (self.booking_status, self.payment_status)
    }

    pub fn party_size(&self) -> u32 {
        self.adult_count + self.child_count
    }
}

/// A single status transition as applied to the record store.
///
/// Timestamp fields are only written when the stored value is still unset;
/// the store enforces set-exactly-once semantics.
#[derive(Debug, Clone)]
pub struct TransitionUpdate {
    pub booking_status: BookingStatus,
    pub payment_status: PaymentStatus,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub declined_at: Option<DateTime<Utc>>,
    pub payment_captured_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl TransitionUpdate {
    pub fn to(booking_status: BookingStatus, payment_status: PaymentStatus) -> Self {
        Self {
            booking_status,
            payment_status,
            confirmed_at: None,
            declined_at: None,
            payment_captured_at: None,
            cancelled_at: None,
            completed_at: None,
        }
    }
}
