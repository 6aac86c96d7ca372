use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Division of an authorized amount between the fulfilling operator and the
/// platform. Always sums to the authorized total.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PaymentSplit {
    pub operator_amount: i64,
    pub platform_fee: i64,
}

/// The processor-side authorization as persisted on the booking. The split
/// and rate are frozen at authorization time and never recomputed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PaymentRecord {
    pub external_ref: String,
    pub amount_authorized: i64,
    pub operator_amount: i64,
    pub platform_fee: i64,
    pub commission_rate_bps: u32,
}

/// User-facing decline taxonomy. Processor-specific codes are opaque to the
/// engine and collapsed into these buckets at the adapter boundary.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeclineReason {
    Declined,
    ExpiredCard,
    BadCvc,
    InsufficientFunds,
    Unknown,
}

impl DeclineReason {
    pub fn from_processor_code(code: &str) -> Self {
        match code {
            "card_declined" | "generic_decline" | "do_not_honor" | "call_issuer" => {
                DeclineReason::Declined
            }
            "expired_card" => DeclineReason::ExpiredCard,
            "incorrect_cvc" | "invalid_cvc" => DeclineReason::BadCvc,
            "insufficient_funds" => DeclineReason::InsufficientFunds,
            _ => DeclineReason::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DeclineReason::Declined => "declined",
            DeclineReason::ExpiredCard => "expired_card",
            DeclineReason::BadCvc => "bad_cvc",
            DeclineReason::InsufficientFunds => "insufficient_funds",
            DeclineReason::Unknown => "unknown",
        }
    }
}

impl fmt::Display for DeclineReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("payment declined ({0})")]
    Declined(DeclineReason),

    /// Transport-level failure; the processor may or may not have seen the
    /// request. Safe to retry the authorize step only, with a fresh
    /// idempotency key, after confirming no prior authorization succeeded.
    #[error("payment processor unavailable: {0}")]
    Unavailable(String),

    /// The processor understood and refused the request itself. Indicates an
    /// integration bug or a stale external reference, never retryable.
    #[error("payment processor rejected the request: {0}")]
    Rejected(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct AuthorizeRequest {
    pub amount: i64,
    pub currency: String,
    /// Booking reference; also the basis for the idempotency key.
    pub reference: String,
    pub idempotency_key: String,
    pub operator_id: Uuid,
    pub split: PaymentSplit,
    pub commission_rate_bps: u32,
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizedPayment {
    pub external_ref: String,
    pub amount: i64,
    pub split: PaymentSplit,
}

/// Boundary to the external card-payment processor.
///
/// Callers must serialize `capture`/`void_or_refund` per external reference;
/// the engine holds a per-booking lock around every terminal operation.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Create a held (authorized, uncaptured) charge.
    async fn authorize(&self, request: &AuthorizeRequest) -> Result<AuthorizedPayment, GatewayError>;

    /// Convert a held authorization into an actual transfer.
    async fn capture(&self, external_ref: &str) -> Result<(), GatewayError>;

    /// Release a hold, or reverse an already-captured transfer. The processor
    /// picks void vs. refund from the charge's own state; the engine gates
    /// WHEN this may be called by the booking's payment status.
    async fn void_or_refund(&self, external_ref: &str) -> Result<(), GatewayError>;
}
