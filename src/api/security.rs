use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use axum_extra::headers::{authorization::Basic, Authorization, HeaderMapExt};
use std::sync::Arc;

use crate::api::handlers::ErrorResponse;
use crate::config::SecurityConfig;
use crate::model::{Principal, Role};
use crate::store::traits::{CredentialStore, SessionStore};

/// What a request path requires from its caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Public,
    Authenticated,
    Role(Role),
}

/// URL-prefix rules of the stock service
#[derive(Debug, Clone)]
pub struct SecurityPolicy {
    pub realm: String,
    pub cookie_name: String,
    pub admin_prefix: String,
    pub user_prefix: String,
}

impl SecurityPolicy {
    pub fn from_config(config: &SecurityConfig) -> Self {
        Self {
            realm: config.realm.clone(),
            cookie_name: config.cookie_name.clone(),
            admin_prefix: config.admin_prefix.clone(),
            user_prefix: config.user_prefix.clone(),
        }
    }

    pub fn required_access(&self, path: &str) -> Access {
        if under_prefix(path, &self.admin_prefix) {
            Access::Role(Role::Admin)
        } else if under_prefix(path, &self.user_prefix) {
            Access::Authenticated
        } else {
            Access::Public
        }
    }

    /// 401 asking for basic credentials
    pub fn challenge(&self) -> Response {
        let mut response = (
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse::new("Full authentication is required")),
        )
            .into_response();
        if let Ok(value) = HeaderValue::from_str(&format!("Basic realm=\"{}\"", self.realm)) {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, value);
        }
        response
    }
}

fn under_prefix(path: &str, prefix: &str) -> bool {
    let prefix = prefix.trim_end_matches('/');
    path == prefix
        || path
            .strip_prefix(prefix)
            .map_or(false, |rest| rest.starts_with('/'))
}

/// Everything the policy middleware needs
#[derive(Clone)]
pub struct AuthState {
    pub credentials: Arc<dyn CredentialStore>,
    pub sessions: Arc<dyn SessionStore>,
    pub policy: Arc<SecurityPolicy>,
}

impl AuthState {
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        sessions: Arc<dyn SessionStore>,
        policy: SecurityPolicy,
    ) -> Self {
        Self {
            credentials,
            sessions,
            policy: Arc::new(policy),
        }
    }
}

/// Username and password from an `Authorization: Basic` header
pub fn basic_credentials(headers: &HeaderMap) -> Option<(String, String)> {
    headers
        .typed_get::<Authorization<Basic>>()
        .map(|auth| (auth.username().to_string(), auth.password().to_string()))
}

/// Gate protected prefixes.
///
/// A session cookie wins over basic credentials. A successful basic login
/// opens a session and sets its cookie. Unauthenticated requests are
/// rejected at once; nothing is saved for replay after login.
pub async fn enforce_policy(
    State(auth): State<AuthState>,
    jar: CookieJar,
    mut req: Request,
    next: Next,
) -> Response {
    let access = auth.policy.required_access(req.uri().path());
    if access == Access::Public {
        return next.run(req).await;
    }

    let mut from_session = None;
    if let Some(cookie) = jar.get(&auth.policy.cookie_name) {
        from_session = auth.sessions.get(cookie.value()).await;
    }

    let mut new_session = None;
    let principal = match from_session {
        Some(principal) => Some(principal),
        None => match basic_credentials(req.headers()) {
            Some((username, password)) => {
                let principal = auth.credentials.authenticate(&username, &password).await;
                if let Some(principal) = &principal {
                    log::info!("user {} logged in", principal.username);
                    new_session = Some(auth.sessions.create(principal.clone()).await);
                }
                principal
            }
            None => None,
        },
    };

    let Some(principal) = principal else {
        log::info!("rejected unauthenticated request to {}", req.uri().path());
        return auth.policy.challenge();
    };

    if let Access::Role(role) = access {
        if !principal.has_role(role) {
            log::info!(
                "user {} denied access to {}",
                principal.username,
                req.uri().path()
            );
            return (
                StatusCode::FORBIDDEN,
                Json(ErrorResponse::new("Access is denied")),
            )
                .into_response();
        }
    }

    req.extensions_mut().insert(principal);
    let response = next.run(req).await;

    match new_session {
        Some(token) => {
            let cookie = Cookie::build((auth.policy.cookie_name.clone(), token))
                .path("/")
                .http_only(true);
            (jar.add(cookie), response).into_response()
        }
        None => response,
    }
}

/// Axum extractor for the principal admitted by [`enforce_policy`]
#[async_trait]
impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Principal>()
            .cloned()
            .ok_or(StatusCode::UNAUTHORIZED)
    }
}
