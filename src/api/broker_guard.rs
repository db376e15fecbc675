use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Json, Response},
};

use crate::api::broker_handlers::{BrokerErrorBody, BrokerState};
use crate::api::security::basic_credentials;

pub const API_VERSION_HEADER: &str = "x-broker-api-version";
pub const SUPPORTED_MAJOR_VERSION: u32 = 2;

/// Major part of a `X-Broker-API-Version` value such as `2.13`
fn major_version(headers: &HeaderMap) -> Option<u32> {
    headers
        .get(API_VERSION_HEADER)?
        .to_str()
        .ok()?
        .trim()
        .split('.')
        .next()?
        .parse()
        .ok()
}

/// Reject platforms that do not speak version 2 of the broker API
pub async fn require_api_version(req: Request, next: Next) -> Response {
    if major_version(req.headers()) == Some(SUPPORTED_MAJOR_VERSION) {
        return next.run(req).await;
    }

    log::warn!(
        "rejected {} {}: unsupported broker API version",
        req.method(),
        req.uri().path()
    );
    (
        StatusCode::PRECONDITION_FAILED,
        Json(BrokerErrorBody::new(
            None,
            format!(
                "The provided service broker API version is not supported: expected {}.x",
                SUPPORTED_MAJOR_VERSION
            ),
        )),
    )
        .into_response()
}

/// Platform credentials, checked only when the broker has some configured
pub async fn require_broker_auth(
    State(state): State<BrokerState>,
    req: Request,
    next: Next,
) -> Response {
    let Some((user, password)) = &state.basic_auth else {
        return next.run(req).await;
    };

    match basic_credentials(req.headers()) {
        Some((u, p)) if &u == user && &p == password => next.run(req).await,
        _ => {
            let mut response = (
                StatusCode::UNAUTHORIZED,
                Json(BrokerErrorBody::new(None, "Full authentication is required")),
            )
                .into_response();
            response.headers_mut().insert(
                header::WWW_AUTHENTICATE,
                HeaderValue::from_static("Basic realm=\"broker\""),
            );
            response
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_major_version() {
        let mut headers = HeaderMap::new();
        assert_eq!(major_version(&headers), None);

        headers.insert(API_VERSION_HEADER, HeaderValue::from_static("2.13"));
        assert_eq!(major_version(&headers), Some(2));

        headers.insert(API_VERSION_HEADER, HeaderValue::from_static("1.0"));
        assert_eq!(major_version(&headers), Some(1));

        headers.insert(API_VERSION_HEADER, HeaderValue::from_static("latest"));
        assert_eq!(major_version(&headers), None);
    }
}
