use axum::{
    extract::{Path, State},
    routing::post,
    Json, Router,
};
use uuid::Uuid;

use crate::bookings::{outcome_str, BookingView, TransitionResponse};
use crate::error::AppError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/operator/bookings/{id}/confirm", post(confirm_booking))
        .route("/v1/operator/bookings/{id}/decline", post(decline_booking))
        .route("/v1/operator/bookings/{id}/capture", post(capture_booking))
}

async fn confirm_booking(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<TransitionResponse>, AppError> {
    let outcome = state.lifecycle.confirm(id).await?;
    respond(&state, id, outcome_str(outcome)).await
}

async fn decline_booking(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<TransitionResponse>, AppError> {
    let outcome = state.lifecycle.decline(id).await?;
    respond(&state, id, outcome_str(outcome)).await
}

/// Manual capture trigger; the sweep performs the same transition near the
/// occurrence date.
async fn capture_booking(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<TransitionResponse>, AppError> {
    let outcome = state.lifecycle.capture(id).await?;
    respond(&state, id, outcome_str(outcome)).await
}

async fn respond(
    state: &AppState,
    id: Uuid,
    outcome: &'static str,
) -> Result<Json<TransitionResponse>, AppError> {
    let booking = state
        .bookings
        .get(id)
        .await?
        .ok_or_else(|| AppError::NotFound("booking_not_found".to_string()))?;
    Ok(Json(TransitionResponse {
        outcome,
        view: BookingView::new(booking),
    }))
}
