use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use lagoon_booking::eligibility::ActionEligibility;
use lagoon_booking::lifecycle::TransitionOutcome;
use lagoon_booking::validate::BookingIntake;
use lagoon_core::booking::Booking;
use serde::Serialize;

use crate::error::AppError;
use crate::state::AppState;

/// Booking as presented to clients: the record plus the derived action
/// flags, so no presentation surface re-derives status logic itself.
#[derive(Debug, Serialize)]
pub struct BookingView {
    #[serde(flatten)]
    pub booking: Booking,
    pub actions: ActionEligibility,
}

impl BookingView {
    pub fn new(booking: Booking) -> Self {
        let actions = ActionEligibility::derive(booking.booking_status, booking.payment_status);
        Self { booking, actions }
    }
}

#[derive(Debug, Serialize)]
pub struct TransitionResponse {
    pub outcome: &'static str,
    #[serde(flatten)]
    pub view: BookingView,
}

pub fn outcome_str(outcome: TransitionOutcome) -> &'static str {
    match outcome {
        TransitionOutcome::Applied => "APPLIED",
        TransitionOutcome::AlreadyApplied => "ALREADY_APPLIED",
    }
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/bookings", post(create_booking))
        .route("/v1/bookings/{reference}", get(get_booking))
        .route("/v1/bookings/{reference}/cancel", post(cancel_booking))
}

async fn create_booking(
    State(state): State<AppState>,
    Json(intake): Json<BookingIntake>,
) -> Result<(StatusCode, Json<BookingView>), AppError> {
    let booking = state.orchestrator.create_booking(intake).await?;
    Ok((StatusCode::CREATED, Json(BookingView::new(booking))))
}

async fn get_booking(
    State(state): State<AppState>,
    Path(reference): Path<String>,
) -> Result<Json<BookingView>, AppError> {
    let booking = state
        .bookings
        .get_by_reference(&reference)
        .await?
        .ok_or_else(|| AppError::NotFound("booking_not_found".to_string()))?;
    Ok(Json(BookingView::new(booking)))
}

async fn cancel_booking(
    State(state): State<AppState>,
    Path(reference): Path<String>,
) -> Result<Json<TransitionResponse>, AppError> {
    let booking = state
        .bookings
        .get_by_reference(&reference)
        .await?
        .ok_or_else(|| AppError::NotFound("booking_not_found".to_string()))?;

    let outcome = state.lifecycle.cancel(booking.id).await?;

    let refreshed = state
        .bookings
        .get(booking.id)
        .await?
        .ok_or_else(|| AppError::NotFound("booking_not_found".to_string()))?;
    Ok(Json(TransitionResponse {
        outcome: outcome_str(outcome),
        view: BookingView::new(refreshed),
    }))
}
