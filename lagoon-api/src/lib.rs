use axum::{http::Method, Router};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod bookings;
pub mod error;
pub mod operator;
pub mod state;
pub mod worker;

pub use state::AppState;

use lagoon_booking::split::CommissionRate;
use lagoon_booking::{BookingOrchestrator, BookingPolicy, LifecycleEngine};
use lagoon_core::events::{LogSink, NotificationSink};
use lagoon_core::identity::AccountResolver;
use lagoon_core::payment::PaymentGateway;
use lagoon_core::repository::{BookingRepository, OccurrenceRepository};
use lagoon_store::app_config::BusinessRules;

pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
            axum::http::header::USER_AGENT,
        ]);

    Router::new()
        .merge(bookings::routes())
        .merge(operator::routes())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Wire the engine parts over one backing store. The store serves as
/// booking repository, occurrence source, and account resolver at once,
/// which is what both `MemoryStore` and `PgStore` provide.
pub fn build_state<S>(
    store: Arc<S>,
    gateway: Arc<dyn PaymentGateway>,
    rules: &BusinessRules,
) -> anyhow::Result<AppState>
where
    S: BookingRepository + OccurrenceRepository + AccountResolver + 'static,
{
    let policy = BookingPolicy {
        default_commission: CommissionRate::from_percent(rules.default_commission_percent)?,
        confirmation_window: chrono::Duration::hours(rules.confirmation_deadline_hours as i64),
    };
    let notifier: Arc<dyn NotificationSink> = Arc::new(LogSink);

    let orchestrator = BookingOrchestrator::new(
        store.clone(),
        store.clone(),
        store.clone(),
        gateway.clone(),
        notifier.clone(),
        policy,
    );
    let lifecycle = LifecycleEngine::new(store.clone(), store.clone(), gateway, notifier);

    Ok(AppState {
        orchestrator: Arc::new(orchestrator),
        lifecycle: Arc::new(lifecycle),
        bookings: store,
        rules: rules.clone(),
    })
}
