use std::net::SocketAddr;
use std::time::Instant;

use axum::{
    body::Body,
    extract::{ConnectInfo, MatchedPath, State},
    http::{HeaderMap, HeaderValue, Request, header::AUTHORIZATION},
    middleware::Next,
    response::{IntoResponse, Response},
};
use socialfeed_cache::{RateDecision, RateScope, UserId};

use crate::error::{ApiError, RATE_LIMIT_LIMIT, RATE_LIMIT_REMAINING};
use crate::server::AppState;

const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Caller resolved from a valid, unrevoked bearer token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub id: UserId,
    pub username: String,
    pub token: String,
}

// =============================================================================
// Authentication
// =============================================================================

/// Validates the bearer token and stores an [`AuthenticatedUser`] in request
/// extensions.
///
/// Logged-out tokens are rejected before the session lookup. With the cache
/// degraded the revocation list reads as empty and only the session lookup
/// applies.
pub async fn authenticate(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let token = match bearer_token(req.headers()) {
        Some(token) => token.to_string(),
        None => {
            tracing::debug!(path = %req.uri().path(), "No Authorization header");
            return ApiError::Unauthorized("Authentication required").into_response();
        }
    };

    if state.cache.revocations.is_revoked(&token).await {
        tracing::debug!("Rejected revoked token");
        return ApiError::Unauthorized("Token has been revoked").into_response();
    }

    match state.store.resolve_session(&token).await {
        Some(identity) => {
            req.extensions_mut().insert(AuthenticatedUser {
                id: identity.id,
                username: identity.username,
                token,
            });
            next.run(req).await
        }
        None => ApiError::Unauthorized("Invalid or expired token").into_response(),
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

// =============================================================================
// Rate limiting
// =============================================================================

/// Per-user fixed-window limit. Must run after [`authenticate`].
pub async fn user_rate_limit(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let Some(user) = req.extensions().get::<AuthenticatedUser>() else {
        return ApiError::Unauthorized("Unauthorized").into_response();
    };
    let identity = user.id.to_string();

    let decision = state.cache.limiter.check(RateScope::User, &identity).await;
    apply_decision(decision, req, next).await
}

/// Per-address fixed-window limit for unauthenticated endpoints.
pub async fn ip_rate_limit(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let identity = client_ip(&req, state.trust_forwarded_for);
    let decision = state.cache.limiter.check(RateScope::Ip, &identity).await;
    apply_decision(decision, req, next).await
}

async fn apply_decision(decision: RateDecision, req: Request<Body>, next: Next) -> Response {
    match decision {
        RateDecision::Throttled { limit, retry_after } => {
            tracing::info!(path = %req.uri().path(), limit, "request throttled");
            ApiError::TooManyRequests { limit, retry_after }.into_response()
        }
        RateDecision::Allowed { limit, remaining } => {
            let mut response = next.run(req).await;
            let headers = response.headers_mut();
            headers.insert(RATE_LIMIT_LIMIT, HeaderValue::from(limit));
            headers.insert(RATE_LIMIT_REMAINING, HeaderValue::from(remaining));
            response
        }
    }
}

/// Client address: first `X-Forwarded-For` hop when trusted, else the peer.
pub fn client_ip(req: &Request<Body>, trust_forwarded_for: bool) -> String {
    if trust_forwarded_for {
        let forwarded = req
            .headers()
            .get(X_FORWARDED_FOR)
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.split(',').next())
            .map(str::trim)
            .filter(|ip| !ip.is_empty());
        if let Some(ip) = forwarded {
            return ip.to_string();
        }
    }

    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

// =============================================================================
// Metrics
// =============================================================================

pub async fn track_http_metrics(req: Request<Body>, next: Next) -> Response {
    let method = req.method().clone();
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());
    let start = Instant::now();

    let response = next.run(req).await;

    crate::metrics::record_http_request(
        method.as_str(),
        &route,
        response.status().as_u16(),
        start.elapsed(),
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(forwarded: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri("/api/auth/login");
        if let Some(value) = forwarded {
            builder = builder.header(X_FORWARDED_FOR, value);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[test]
    fn test_client_ip_prefers_first_forwarded_hop() {
        let req = request(Some("203.0.113.7, 10.0.0.1"));
        assert_eq!(client_ip(&req, true), "203.0.113.7");
    }

    #[test]
    fn test_client_ip_falls_back_to_peer() {
        let mut req = request(Some("203.0.113.7"));
        req.extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([192, 0, 2, 1], 40000))));
        assert_eq!(client_ip(&req, false), "192.0.2.1");
        assert_eq!(client_ip(&request(None), true), "unknown");
    }

    #[test]
    fn test_bearer_token() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        assert_eq!(bearer_token(&headers), Some("abc"));
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(bearer_token(&headers), None);
    }
}
