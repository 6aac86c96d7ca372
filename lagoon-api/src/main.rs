use std::net::SocketAddr;
use std::sync::Arc;

use lagoon_api::{app, build_state, worker};
use lagoon_booking::gateway::{HttpGateway, MockGateway};
use lagoon_core::payment::PaymentGateway;
use lagoon_store::{MemoryStore, PgStore};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lagoon_api=debug,lagoon_booking=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = lagoon_store::app_config::Config::load().expect("Failed to load config");
    tracing::info!("Starting Lagoon API on port {}", config.server.port);

    let gateway: Arc<dyn PaymentGateway> = match &config.processor.base_url {
        Some(base_url) => Arc::new(HttpGateway::new(base_url.clone())),
        None => {
            tracing::warn!("no payment processor configured, using in-process mock gateway");
            Arc::new(MockGateway::new())
        }
    };

    let state = match &config.database {
        Some(database) => {
            let store = PgStore::connect(&database.url)
                .await
                .expect("Failed to connect to Postgres");
            build_state(Arc::new(store), gateway, &config.business_rules)
                .expect("Invalid business rules")
        }
        None => {
            tracing::warn!("no database configured, using in-memory store");
            build_state(Arc::new(MemoryStore::new()), gateway, &config.business_rules)
                .expect("Invalid business rules")
        }
    };

    tokio::spawn(worker::run_sweeper(state.clone()));

    let router = app(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, router.into_make_service()).await.unwrap();
}
