use axum::{
    middleware,
    routing::{get, put},
    Router,
};

use crate::api::broker_handlers::{self, BrokerState};
use crate::api::handlers::{self, AppState};
use crate::api::{broker_guard, security};
use crate::store::traits::Store;

pub fn create_router<S: Store + 'static>(state: AppState<S>) -> Router {
    let admin_prefix = state.auth.policy.admin_prefix.clone();
    let user_prefix = state.auth.policy.user_prefix.clone();

    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Stock items
        .route(
            "/stock",
            get(handlers::list_items::<S>)
                .post(handlers::create_item::<S>)
                .put(handlers::update_item::<S>),
        )
        .route("/stock/ping", get(handlers::ping))
        .route("/stock/get-env", get(handlers::get_env::<S>))
        .route(
            "/stock/:id",
            get(handlers::get_item::<S>).delete(handlers::delete_item::<S>),
        )
        // Session
        .route("/logout", get(handlers::logout::<S>))
        // Protected areas
        .route(&admin_prefix, get(handlers::whoami))
        .route(&user_prefix, get(handlers::whoami))
        .layer(middleware::from_fn_with_state(
            state.auth.clone(),
            security::enforce_policy,
        ))
        .with_state(state)
}

pub fn create_broker_router(state: BrokerState) -> Router {
    Router::new()
        .route("/v2/catalog", get(broker_handlers::catalog))
        .route(
            "/v2/service_instances/:instance_id",
            put(broker_handlers::provision)
                .patch(broker_handlers::update)
                .delete(broker_handlers::deprovision),
        )
        .route(
            "/v2/service_instances/:instance_id/last_operation",
            get(broker_handlers::last_operation),
        )
        .route(
            "/v2/service_instances/:instance_id/service_bindings/:binding_id",
            put(broker_handlers::bind)
                .get(broker_handlers::get_binding)
                .delete(broker_handlers::unbind),
        )
        .layer(middleware::from_fn(broker_guard::require_api_version))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            broker_guard::require_broker_auth,
        ))
        .with_state(state)
}
