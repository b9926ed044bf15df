//! HTTP error taxonomy and the response envelope.
//!
//! Every success body is `{success: true, data}`; every error body is
//! `{success: false, error, retryAfter?}`. Crypto and internal failures
//! are logged server-side and surfaced with a generic message only.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::json;
use termgate_core::db::DatabaseError;
use tracing::error;

use crate::auth::AuthError;
use crate::profiles::ProfileError;

/// Failures surfaced by control endpoints.
#[derive(Debug)]
pub enum ApiError {
    Validation(String),
    Unauthorized,
    NotFound(String),
    Conflict(String),
    RateLimited { retry_after_secs: u64 },
    Internal,
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> String {
        match self {
            Self::Validation(message) => message.clone(),
            Self::Unauthorized => "Unauthorized".into(),
            Self::NotFound(what) => format!("{what} not found"),
            Self::Conflict(message) => message.clone(),
            Self::RateLimited { .. } => "Too many requests".into(),
            Self::Internal => "Internal server error".into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut body = json!({
            "success": false,
            "error": self.message(),
        });
        if let Self::RateLimited { retry_after_secs } = &self
            && let Some(map) = body.as_object_mut()
        {
            map.insert("retryAfter".into(), json!(retry_after_secs));
        }
        (self.status(), Json(body)).into_response()
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials | AuthError::InvalidToken => Self::Unauthorized,
            AuthError::TokenIssue(message) | AuthError::Hashing(message) => {
                error!(error = %message, "Auth internals failed");
                Self::Internal
            }
        }
    }
}

impl From<ProfileError> for ApiError {
    fn from(err: ProfileError) -> Self {
        match err {
            ProfileError::NotFound => Self::NotFound("Profile".into()),
            ProfileError::NameConflict => {
                Self::Conflict("A profile with this name already exists".into())
            }
            ProfileError::Validation(message) => Self::Validation(message),
            ProfileError::Crypto(inner) => {
                error!(error = %inner, "Credential decryption failed");
                Self::Internal
            }
            ProfileError::Database(inner) => {
                error!(error = %inner, "Profile storage failed");
                Self::Internal
            }
        }
    }
}

impl From<DatabaseError> for ApiError {
    fn from(err: DatabaseError) -> Self {
        error!(error = %err, "Storage failed");
        Self::Internal
    }
}

impl From<termgate_core::Error> for ApiError {
    fn from(err: termgate_core::Error) -> Self {
        match err {
            termgate_core::Error::Validation(message) => Self::Validation(message),
            other => {
                error!(error = %other, "Unexpected core error");
                Self::Internal
            }
        }
    }
}

/// Wrap payload data in the success envelope.
pub fn success<T: Serialize>(data: T) -> Json<serde_json::Value> {
    Json(json!({"success": true, "data": data}))
}
