use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    Json as RequestJson,
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::api::security::AuthState;
use crate::config::StockConfig;
use crate::model::{ItemType, Principal, StockItem};
use crate::store::traits::Store;

/// Shared state of the stock service
pub struct AppState<S> {
    pub store: Arc<S>,
    pub auth: AuthState,
    pub stock: Arc<StockConfig>,
}

impl<S> AppState<S> {
    pub fn new(store: Arc<S>, auth: AuthState, stock: StockConfig) -> Self {
        Self {
            store,
            auth,
            stock: Arc::new(stock),
        }
    }
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            auth: self.auth.clone(),
            stock: Arc::clone(&self.stock),
        }
    }
}

/// Simple health check endpoint
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: &str) -> Self {
        Self {
            error: message.to_string(),
        }
    }
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn internal_error(e: anyhow::Error) -> ApiError {
    log::error!("store failure: {:#}", e);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse::new(&format!("{:#}", e))),
    )
}

fn not_found() -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse::new("Stock item not found")),
    )
}

#[derive(Debug, Deserialize)]
pub struct StockQuery {
    #[serde(rename = "type")]
    pub item_type: Option<ItemType>,
}

#[derive(Debug, Deserialize)]
pub struct EnvQuery {
    pub env: String,
}

pub async fn ping() -> &'static str {
    "Ping"
}

/// GET /stock/get-env?env=KEY
/// Leaks process environment; answers only when `stock.expose_env` is set
pub async fn get_env<S: Store>(
    State(state): State<AppState<S>>,
    Query(query): Query<EnvQuery>,
) -> Result<String, ApiError> {
    if !state.stock.expose_env {
        return Err((StatusCode::NOT_FOUND, Json(ErrorResponse::new("Not found"))));
    }
    log::warn!("exposing environment value {}", query.env);
    let value = std::env::var(&query.env).unwrap_or_else(|_| "null".to_string());
    Ok(format!("Env {}", value))
}

/// GET /stock/{id}
pub async fn get_item<S: Store>(
    Path(id): Path<i64>,
    State(state): State<AppState<S>>,
) -> Result<Json<StockItem>, ApiError> {
    log::info!("Starting search of stock item(id={})", id);

    match state.store.get_item(id).await {
        Ok(Some(item)) => {
            log::info!("Finishing search of stock item(id={})", id);
            Ok(Json(item))
        }
        Ok(None) => {
            log::info!("Stock item(id={}) has not been found", id);
            Err(not_found())
        }
        Err(e) => Err(internal_error(e)),
    }
}

/// GET /stock
pub async fn list_items<S: Store>(
    State(state): State<AppState<S>>,
    Query(query): Query<StockQuery>,
) -> Result<Json<Vec<StockItem>>, ApiError> {
    state
        .store
        .list_items(query.item_type)
        .await
        .map(Json)
        .map_err(internal_error)
}

/// POST /stock
/// The id is always assigned by the store
pub async fn create_item<S: Store>(
    State(state): State<AppState<S>>,
    RequestJson(mut item): RequestJson<StockItem>,
) -> Result<(StatusCode, Json<StockItem>), ApiError> {
    item.id = None;
    if let Err(msg) = item.validate() {
        return Err((StatusCode::BAD_REQUEST, Json(ErrorResponse::new(&msg))));
    }

    let stored = state.store.save_item(item).await.map_err(internal_error)?;
    log::info!("Stored stock item(id={:?})", stored.id);
    Ok((StatusCode::CREATED, Json(stored)))
}

/// PUT /stock
/// Full replace of an existing item; unknown ids get the body echoed with 404
pub async fn update_item<S: Store>(
    State(state): State<AppState<S>>,
    RequestJson(item): RequestJson<StockItem>,
) -> Response {
    let exists = match item.id {
        Some(id) => match state.store.item_exists(id).await {
            Ok(exists) => exists,
            Err(e) => return internal_error(e).into_response(),
        },
        None => false,
    };
    if !exists {
        log::info!("Stock item(id={:?}) has not been found for update", item.id);
        return (StatusCode::NOT_FOUND, Json(item)).into_response();
    }
    if let Err(msg) = item.validate() {
        return (StatusCode::BAD_REQUEST, Json(ErrorResponse::new(&msg))).into_response();
    }

    match state.store.save_item(item).await {
        Ok(stored) => Json(stored).into_response(),
        Err(e) => internal_error(e).into_response(),
    }
}

/// DELETE /stock/{id}
pub async fn delete_item<S: Store>(
    Path(id): Path<i64>,
    State(state): State<AppState<S>>,
) -> Result<StatusCode, ApiError> {
    match state.store.delete_item(id).await {
        Ok(true) => {
            log::info!("Removed stock item(id={})", id);
            Ok(StatusCode::OK)
        }
        Ok(false) => {
            log::info!("Stock item(id={}) has not been found for removal", id);
            Err(not_found())
        }
        Err(e) => Err(internal_error(e)),
    }
}

/// GET /logout
/// Drops the server-side session, whether or not one existed
pub async fn logout<S: Store>(
    State(state): State<AppState<S>>,
    jar: CookieJar,
) -> (CookieJar, &'static str) {
    let cookie_name = state.auth.policy.cookie_name.clone();
    if let Some(cookie) = jar.get(&cookie_name) {
        if state.auth.sessions.invalidate(cookie.value()).await {
            log::info!("session invalidated");
        }
    }
    let jar = jar.remove(Cookie::build((cookie_name, "")).path("/"));
    (jar, "Logout done!")
}

/// The principal admitted by the security policy
pub async fn whoami(principal: Principal) -> Json<Principal> {
    Json(principal)
}
