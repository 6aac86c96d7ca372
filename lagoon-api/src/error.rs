use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use lagoon_booking::{BookingError, TransitionError};
use lagoon_core::payment::GatewayError;
use serde_json::json;

#[derive(Debug)]
pub enum AppError {
    Booking(BookingError),
    Transition(TransitionError),
    NotFound(String),
    Internal(anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AppError::Booking(BookingError::Validation(violations)) => (
                StatusCode::BAD_REQUEST,
                json!({ "error": "validation_failed", "fields": violations }),
            ),
            AppError::Booking(BookingError::OccurrenceNotFound(id)) => (
                StatusCode::NOT_FOUND,
                json!({ "error": "occurrence_not_found", "occurrence_id": id }),
            ),
            AppError::Booking(BookingError::CapacityExceeded {
                requested,
                available,
            }) => (
                StatusCode::CONFLICT,
                json!({
                    "error": "capacity_exceeded",
                    "requested": requested,
                    "available": available,
                }),
            ),
            AppError::Booking(BookingError::PaymentDeclined(reason)) => (
                StatusCode::PAYMENT_REQUIRED,
                json!({ "error": "payment_declined", "reason": reason.as_str() }),
            ),
            AppError::Booking(BookingError::GatewayUnavailable(message)) => {
                tracing::warn!(%message, "payment processor unavailable");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    json!({ "error": "payment_processor_unavailable" }),
                )
            }
            AppError::Booking(err) => {
                tracing::error!(error = %err, "booking creation failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "internal_error" }),
                )
            }
            AppError::Transition(TransitionError::NotFound(id)) => (
                StatusCode::NOT_FOUND,
                json!({ "error": "booking_not_found", "booking_id": id }),
            ),
            AppError::Transition(TransitionError::Conflict(id)) => (
                StatusCode::CONFLICT,
                json!({ "error": "concurrent_update", "booking_id": id }),
            ),
            AppError::Transition(TransitionError::Gateway(GatewayError::Declined(reason))) => (
                StatusCode::PAYMENT_REQUIRED,
                json!({ "error": "payment_declined", "reason": reason.as_str() }),
            ),
            AppError::Transition(TransitionError::Gateway(GatewayError::Unavailable(message))) => {
                tracing::warn!(%message, "payment processor unavailable");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    json!({ "error": "payment_processor_unavailable" }),
                )
            }
            // Illegal transitions indicate a correlated-state bug: logged
            // loudly, surfaced as a generic failure, never swallowed.
            AppError::Transition(err) => {
                tracing::error!(error = %err, "booking transition failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "internal_error" }),
                )
            }
            AppError::NotFound(message) => {
                (StatusCode::NOT_FOUND, json!({ "error": message }))
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "internal_error" }),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}

impl From<BookingError> for AppError {
    fn from(err: BookingError) -> Self {
        Self::Booking(err)
    }
}

impl From<TransitionError> for AppError {
    fn from(err: TransitionError) -> Self {
        Self::Transition(err)
    }
}

impl From<lagoon_core::repository::StoreError> for AppError {
    fn from(err: lagoon_core::repository::StoreError) -> Self {
        Self::Internal(err.into())
    }
}
