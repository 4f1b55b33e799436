use crate::core::error::AppError;
use crate::features::auth::JwtValidator;
use axum::{
    extract::{Query, Request, State},
    http::{header, HeaderMap, HeaderValue, StatusCode, Uri},
    middleware::Next,
    response::{IntoResponse, Response},
};
use base64::prelude::*;
use serde::Deserialize;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::request_id::{MakeRequestId, RequestId};
use tracing::Span;
use uuid::Uuid;

/// Name of the cookie the web dashboard stores its session token in
pub const TOKEN_COOKIE: &str = "token";

/// Request ID generator using UUID v7 (time-ordered)
#[derive(Clone, Copy)]
pub struct MakeRequestUuid;

impl MakeRequestId for MakeRequestUuid {
    fn make_request_id<B>(&mut self, _request: &axum::http::Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&Uuid::now_v7().to_string())
            .ok()
            .map(RequestId::new)
    }
}

/// Custom MakeSpan that includes request_id in the tracing span
#[derive(Clone, Debug)]
pub struct MakeSpanWithRequestId;

impl<B> tower_http::trace::MakeSpan<B> for MakeSpanWithRequestId {
    fn make_span(&mut self, request: &axum::http::Request<B>) -> Span {
        let request_id = request
            .headers()
            .get("x-request-id")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("-");

        tracing::info_span!(
            "request",
            method = %request.method(),
            uri = %request.uri().path(),
            request_id = %request_id,
        )
    }
}

pub fn cors_layer(allowed_origins: Vec<String>) -> CorsLayer {
    let cors = CorsLayer::new().allow_methods(Any).allow_headers(Any);

    if allowed_origins.iter().any(|o| o == "*") {
        cors.allow_origin(Any)
    } else {
        let origins: Vec<HeaderValue> = allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        cors.allow_origin(AllowOrigin::list(origins))
    }
}

pub fn basic_auth_middleware(
    valid_credentials: Arc<String>,
) -> impl Fn(
    Request,
    Next,
)
    -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Response, Response>> + Send>>
       + Clone {
    move |req: Request, next: Next| {
        let credentials = valid_credentials.clone();
        Box::pin(async move {
            let decoded = req
                .headers()
                .get(header::AUTHORIZATION)
                .and_then(|h| h.to_str().ok())
                .and_then(|h| h.strip_prefix("Basic "))
                .and_then(|encoded| BASE64_STANDARD.decode(encoded).ok())
                .and_then(|bytes| String::from_utf8(bytes).ok());

            if decoded.as_deref() == Some(credentials.as_str()) {
                return Ok(next.run(req).await);
            }

            Err((
                StatusCode::UNAUTHORIZED,
                [(header::WWW_AUTHENTICATE, "Basic realm=\"Swagger UI\"")],
                "Unauthorized",
            )
                .into_response())
        })
    }
}

/// Pull a bearer token out of a request.
///
/// Order: `Authorization: Bearer`, then the `token` cookie, then (only when
/// `allow_query` is set) a `token` query parameter. Browsers cannot attach
/// headers to a WebSocket handshake, hence the query fallback.
pub fn extract_token(headers: &HeaderMap, uri: &Uri, allow_query: bool) -> Option<String> {
    if let Some(auth_header) = headers.get(header::AUTHORIZATION).and_then(|h| h.to_str().ok()) {
        if let Some(token) = auth_header.strip_prefix("Bearer ") {
            let token = token.trim();
            if !token.is_empty() {
                return Some(token.to_string());
            }
        }
    }

    let from_cookie = headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == TOKEN_COOKIE && !value.is_empty())
        .map(|(_, value)| value.to_string());
    if from_cookie.is_some() {
        return from_cookie;
    }

    if allow_query {
        return Query::<TokenQuery>::try_from_uri(uri)
            .ok()
            .and_then(|Query(query)| query.token)
            .filter(|token| !token.is_empty());
    }

    None
}

#[derive(Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

pub async fn auth_middleware(
    State(validator): State<Arc<JwtValidator>>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = extract_token(req.headers(), req.uri(), false)
        .ok_or_else(|| AppError::Unauthorized("Missing authorization token".to_string()))?;

    let user = validator.validate_token(&token)?;

    req.extensions_mut().insert(user);
    Ok(next.run(req).await)
}

/// Same as `auth_middleware`, but also accepts `?token=` for WebSocket
/// handshakes. Unauthenticated handshakes are rejected before the upgrade.
pub async fn socket_auth_middleware(
    State(validator): State<Arc<JwtValidator>>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = extract_token(req.headers(), req.uri(), true)
        .ok_or_else(|| AppError::Unauthorized("Missing authorization token".to_string()))?;

    let user = validator.validate_token(&token)?;

    req.extensions_mut().insert(user);
    Ok(next.run(req).await)
}

/// Attach the user when a valid token is present; anonymous requests pass
/// through untouched. An invalid token is treated as anonymous.
pub async fn optional_auth_middleware(
    State(validator): State<Arc<JwtValidator>>,
    mut req: Request,
    next: Next,
) -> Response {
    if let Some(token) = extract_token(req.headers(), req.uri(), false) {
        match validator.validate_token(&token) {
            Ok(user) => {
                req.extensions_mut().insert(user);
            }
            Err(e) => tracing::debug!("Ignoring invalid token on public route: {}", e),
        }
    }
    next.run(req).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(header::HeaderName, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.append(name.clone(), HeaderValue::from_str(value).unwrap());
        }
        map
    }

    #[test]
    fn test_extract_token_prefers_bearer_header() {
        let map = headers(&[
            (header::AUTHORIZATION, "Bearer header-token"),
            (header::COOKIE, "token=cookie-token"),
        ]);
        let uri: Uri = "/ws/dispatch?token=query-token".parse().unwrap();
        assert_eq!(
            extract_token(&map, &uri, true).as_deref(),
            Some("header-token")
        );
    }

    #[test]
    fn test_extract_token_reads_cookie() {
        let map = headers(&[(header::COOKIE, "theme=dark; token=cookie-token")]);
        let uri: Uri = "/api/v1/accident/accidents".parse().unwrap();
        assert_eq!(
            extract_token(&map, &uri, false).as_deref(),
            Some("cookie-token")
        );
    }

    #[test]
    fn test_extract_token_query_only_when_allowed() {
        let map = HeaderMap::new();
        let uri: Uri = "/ws/dispatch?v=2&token=query-token".parse().unwrap();
        assert_eq!(extract_token(&map, &uri, false), None);
        assert_eq!(
            extract_token(&map, &uri, true).as_deref(),
            Some("query-token")
        );
    }

    #[test]
    fn test_extract_token_decodes_query_value() {
        let map = HeaderMap::new();
        let uri: Uri = "/ws/dispatch?token=eyJhbGci%2Eabc%2Bdef%3D%3D&v=2"
            .parse()
            .unwrap();
        assert_eq!(
            extract_token(&map, &uri, true).as_deref(),
            Some("eyJhbGci.abc+def==")
        );

        let uri: Uri = "/ws/dispatch?token=&v=2".parse().unwrap();
        assert_eq!(extract_token(&map, &uri, true), None);
    }

    #[test]
    fn test_extract_token_rejects_non_bearer_scheme() {
        let map = headers(&[(header::AUTHORIZATION, "Basic b3BzOnNlY3JldA==")]);
        let uri: Uri = "/".parse().unwrap();
        assert_eq!(extract_token(&map, &uri, true), None);
    }
}
