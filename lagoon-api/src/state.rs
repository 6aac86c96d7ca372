use std::sync::Arc;

use lagoon_booking::{BookingOrchestrator, LifecycleEngine};
use lagoon_core::repository::BookingRepository;
use lagoon_store::app_config::BusinessRules;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<BookingOrchestrator>,
    pub lifecycle: Arc<LifecycleEngine>,
    pub bookings: Arc<dyn BookingRepository>,
    pub rules: BusinessRules,
}
