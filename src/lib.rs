pub mod api;
pub mod config;
pub mod logic;
pub mod model;
pub mod store;

// Export API types
pub use api::handlers;
pub use api::routes;

// Export broker logic
pub use logic::{BrokerError, PostgresBroker};

// Export all model types
pub use model::*;

// Export store types
pub use store::{MemoryStore, PostgresStore, Store};

use axum::Router;
use std::sync::Arc;
use std::time::Duration;

use crate::api::{AppState, AuthState, BrokerState, SecurityPolicy};
use crate::config::AppConfig;
use crate::store::traits::SessionStore;
use crate::store::{
    InMemoryBrokerRegistry, InMemorySessionStore, PgDatabaseAdmin, StaticCredentialStore,
};

/// Logging for both binaries: `info` by default, sqlx only at `warn`.
/// `RUST_LOG` takes precedence when set.
pub fn init_logging() {
    use env_logger::Builder;
    use log::LevelFilter;

    let mut builder = Builder::new();
    builder
        .filter_level(LevelFilter::Info)
        .filter_module("sqlx", LevelFilter::Warn);
    if let Ok(filters) = std::env::var("RUST_LOG") {
        builder.parse_filters(&filters);
    }
    let _ = builder.try_init();
}

/// Security wiring of the stock service from configuration
pub fn auth_state(config: &AppConfig) -> AuthState {
    let sessions = InMemorySessionStore::new(Duration::from_secs(config.security.session_ttl_secs));
    AuthState::new(
        Arc::new(StaticCredentialStore::new(config.security.users.clone())),
        Arc::new(sessions),
        SecurityPolicy::from_config(&config.security),
    )
}

/// Stock router over any item store
pub fn stock_app<S: Store + 'static>(store: Arc<S>, config: &AppConfig) -> Router {
    let state = AppState::new(store, auth_state(config), config.stock.clone());
    spawn_session_reaper(state.auth.sessions.clone(), config.security.session_ttl_secs);
    crate::api::routes::create_router(state)
}

/// Resolves on Ctrl-C so `serve` can drain in-flight requests
pub async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    log::info!("shutting down");
}

/// Periodically drop sessions that outlived their idle timeout
fn spawn_session_reaper(sessions: Arc<dyn SessionStore>, ttl_secs: u64) {
    let period = Duration::from_secs(ttl_secs.clamp(1, 60));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            let purged = sessions.purge_expired().await;
            if purged > 0 {
                log::debug!("purged {} expired sessions", purged);
            }
        }
    });
}

/// Broker router provisioning on the configured cluster
pub async fn broker_app(config: &AppConfig) -> anyhow::Result<Router> {
    let target = &config.broker.postgres;
    let admin = PgDatabaseAdmin::new(
        &target.connection_url(),
        target.max_connections.unwrap_or(5),
    )
    .await?;

    let broker = PostgresBroker::new(Arc::new(admin), config.broker.uri_base())
        .with_drop_user_on_unbind(config.broker.drop_user_on_unbind);
    let state = BrokerState::new(broker, Arc::new(InMemoryBrokerRegistry::new()), &config.broker);

    Ok(crate::api::routes::create_broker_router(state))
}
