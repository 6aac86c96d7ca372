use lagoon_core::booking::{BookingStatus, PaymentStatus};
use serde::Serialize;

/// Coarse progress bucket shown to the tourist. Derived from the status
/// pair, never from `booking_status` alone: a pending booking with a held
/// payment communicates very differently from one with no payment yet.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProgressStage {
    AwaitingPayment,
    AwaitingConfirmation,
    Confirmed,
    Completed,
    Declined,
    Cancelled,
}

/// Which user-facing actions the current state permits.
///
/// The single source of truth for every presentation surface; consumers look
/// this up, they never re-derive it from raw statuses.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct ActionEligibility {
    pub can_contact_operator: bool,
    pub can_rebook: bool,
    pub show_payment_info: bool,
    pub show_refund_info: bool,
    pub stage: ProgressStage,
    pub label: &'static str,
}

impl ActionEligibility {
    pub fn derive(booking_status: BookingStatus, payment_status: PaymentStatus) -> Self {
        let (stage, label) = match (booking_status, payment_status) {
            (BookingStatus::Pending, PaymentStatus::None) => {
                (ProgressStage::AwaitingPayment, "awaiting payment")
            }
            (BookingStatus::Pending, _) => (
                ProgressStage::AwaitingConfirmation,
                "payment held, awaiting operator decision",
            ),
            (BookingStatus::Confirmed, PaymentStatus::Captured) => {
                (ProgressStage::Confirmed, "confirmed, payment captured")
            }
            (BookingStatus::Confirmed, _) => {
                (ProgressStage::Confirmed, "confirmed, payment held")
            }
            (BookingStatus::Completed, _) => (ProgressStage::Completed, "completed"),
            (BookingStatus::Declined, PaymentStatus::Refunded) => {
                (ProgressStage::Declined, "declined by operator, payment refunded")
            }
            (BookingStatus::Declined, _) => (ProgressStage::Declined, "declined by operator"),
            (BookingStatus::Cancelled, PaymentStatus::Refunded) => {
                (ProgressStage::Cancelled, "cancelled, payment refunded")
            }
            (BookingStatus::Cancelled, _) => (ProgressStage::Cancelled, "cancelled"),
        };

        Self {
            can_contact_operator: matches!(
                booking_status,
                BookingStatus::Pending | BookingStatus::Confirmed
            ),
            can_rebook: booking_status.is_terminal(),
            show_payment_info: payment_status != PaymentStatus::None,
            show_refund_info: payment_status == PaymentStatus::Refunded,
            stage,
            label,
        }
    }
}
