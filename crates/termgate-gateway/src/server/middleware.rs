//! Request admission: bearer extraction and the two rate-limit gates.

use axum::extract::{ConnectInfo, FromRequestParts, Request, State};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::net::SocketAddr;

use crate::auth::{Claims, RateLimitDecision, RateLimiter};

use super::AppState;
use super::error::ApiError;

/// Authenticated caller, extracted from the `Authorization` bearer header.
pub struct AuthUser(pub Claims);

#[axum::async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).ok_or(ApiError::Unauthorized)?;
        let claims = state
            .tokens
            .verify(&token)
            .map_err(|_| ApiError::Unauthorized)?;
        Ok(Self(claims))
    }
}

/// Pull the token out of `Authorization: Bearer <token>`.
pub fn bearer_token(parts: &Parts) -> Option<String> {
    let header = parts.headers.get(AUTHORIZATION)?.to_str().ok()?;
    header.strip_prefix("Bearer ").map(str::to_string)
}

/// Global admission gate for `/api` routes.
pub async fn global_rate_limit(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Response {
    check(&state.global_limiter, addr, request, next).await
}

/// Stricter gate for the credential-bearing auth endpoints.
pub async fn auth_rate_limit(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Response {
    check(&state.auth_limiter, addr, request, next).await
}

async fn check(
    limiter: &RateLimiter,
    addr: SocketAddr,
    request: Request,
    next: Next,
) -> Response {
    match limiter.check(addr.ip()) {
        RateLimitDecision::Allowed => next.run(request).await,
        RateLimitDecision::Limited { retry_after } => ApiError::RateLimited {
            retry_after_secs: retry_after.as_secs().max(1),
        }
        .into_response(),
    }
}
