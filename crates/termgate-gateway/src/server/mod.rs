//! HTTP/WebSocket front door: shared state, router assembly and serving.

mod auth_routes;
mod error;
mod health;
mod middleware;
mod profile_routes;
mod ws;

#[cfg(test)]
mod tests;

pub use error::ApiError;

use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::http::HeaderValue;
use axum::routing::{get, post, put};
use tower_http::cors::{Any, CorsLayer};
use tracing::warn;

use crate::assistant::AssistantBridge;
use crate::auth::{RateLimiter, TokenService};
use crate::profiles::ProfileStore;
use crate::ssh::ConnectionManager;
use crate::storage::GatewayDatabase;

/// Shared handles for every request handler. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub db: GatewayDatabase,
    pub tokens: Arc<TokenService>,
    pub profiles: ProfileStore,
    pub manager: ConnectionManager,
    pub assistant: Option<Arc<AssistantBridge>>,
    pub global_limiter: Arc<RateLimiter>,
    pub auth_limiter: Arc<RateLimiter>,
    pub started_at: Instant,
}

/// Assemble the full router. `/health` sits outside the rate-limit gates;
/// everything under `/api` passes the global bucket, and the two
/// credential endpoints additionally pass the auth bucket.
pub fn build_router(state: AppState, cors_origin: Option<&str>) -> Router {
    let strict = axum::middleware::from_fn_with_state(state.clone(), middleware::auth_rate_limit);

    let api = Router::new()
        .route(
            "/auth/register",
            post(auth_routes::register).layer(strict.clone()),
        )
        .route("/auth/login", post(auth_routes::login).layer(strict))
        .route("/auth/verify", get(auth_routes::verify))
        .route(
            "/profiles",
            get(profile_routes::list_profiles).post(profile_routes::create_profile),
        )
        .route(
            "/profiles/:id",
            put(profile_routes::update_profile).delete(profile_routes::delete_profile),
        )
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::global_rate_limit,
        ));

    Router::new()
        .nest("/api", api)
        .route("/health", get(health::health))
        .route("/ws", get(ws::ws_handler))
        .fallback(|| async { ApiError::NotFound("Route".into()) })
        .layer(cors_layer(cors_origin))
        .with_state(state)
}

fn cors_layer(origin: Option<&str>) -> CorsLayer {
    match origin {
        Some(raw) => match raw.parse::<HeaderValue>() {
            Ok(value) => CorsLayer::new()
                .allow_origin(value)
                .allow_methods(Any)
                .allow_headers(Any),
            Err(_) => {
                warn!(origin = %raw, "CORS_ORIGIN is not a valid header value, allowing any origin");
                CorsLayer::permissive()
            }
        },
        None => CorsLayer::permissive(),
    }
}
