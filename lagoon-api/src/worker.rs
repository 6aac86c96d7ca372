use chrono::{Duration, Utc};
use tokio::time::sleep;
use tracing::{error, info};

use crate::state::AppState;
use lagoon_booking::lifecycle::TransitionOutcome;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub declined: usize,
    pub captured: usize,
    pub completed: usize,
}

/// Time-based sweep over the booking table. Every action goes through the
/// state machine, so a raced or duplicated sweep degrades to no-ops.
pub async fn run_sweeper(state: AppState) {
    let interval = std::time::Duration::from_secs(state.rules.sweep_interval_seconds.max(1));
    info!(interval_seconds = interval.as_secs(), "lifecycle sweeper started");

    loop {
        sleep(interval).await;
        match sweep_once(&state).await {
            Ok(report) if report != SweepReport::default() => {
                info!(
                    declined = report.declined,
                    captured = report.captured,
                    completed = report.completed,
                    "sweep applied transitions"
                );
            }
            Ok(_) => {}
            Err(err) => error!(error = %err, "lifecycle sweep failed"),
        }
    }
}

pub async fn sweep_once(state: &AppState) -> anyhow::Result<SweepReport> {
    let now = Utc::now();
    let mut report = SweepReport::default();

    // Operators who never answered: decline and release the hold.
    for booking in state.bookings.list_overdue_pending(now).await? {
        match state.lifecycle.decline(booking.id).await {
            Ok(TransitionOutcome::Applied) => {
                info!(reference = %booking.reference, "auto-declined overdue pending booking");
                report.declined += 1;
            }
            Ok(TransitionOutcome::AlreadyApplied) => {}
            Err(err) => {
                error!(reference = %booking.reference, error = %err, "auto-decline failed")
            }
        }
    }

    // Deferred capture once the occurrence is close enough.
    let horizon = now + Duration::hours(state.rules.capture_lead_hours as i64);
    for booking in state.bookings.list_due_for_capture(horizon).await? {
        match state.lifecycle.capture(booking.id).await {
            Ok(TransitionOutcome::Applied) => {
                info!(reference = %booking.reference, "captured payment ahead of occurrence");
                report.captured += 1;
            }
            Ok(TransitionOutcome::AlreadyApplied) => {}
            Err(err) => error!(reference = %booking.reference, error = %err, "capture failed"),
        }
    }

    // Occurrences that have passed with a captured payment settle.
    for booking in state.bookings.list_completable(now).await? {
        match state.lifecycle.complete(booking.id).await {
            Ok(TransitionOutcome::Applied) => {
                info!(reference = %booking.reference, "booking completed");
                report.completed += 1;
            }
            Ok(TransitionOutcome::AlreadyApplied) => {}
            Err(err) => error!(reference = %booking.reference, error = %err, "completion failed"),
        }
    }

    Ok(report)
}
