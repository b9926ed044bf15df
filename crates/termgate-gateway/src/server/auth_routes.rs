//! Registration, login and token verification endpoints.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::{Deserialize, Serialize};
use serde_json::json;
use termgate_core::validate;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::auth::{AuthError, password};
use crate::storage::UserRow;

use super::AppState;
use super::error::{ApiError, success};
use super::middleware::AuthUser;

#[derive(Debug, Deserialize)]
pub struct RegisterBody {
    email: String,
    password: String,
    name: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginBody {
    email: String,
    password: String,
}

/// Client-facing user representation. The password hash never leaves the
/// storage layer.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    id: String,
    email: String,
    name: String,
    preferences: serde_json::Value,
    created_at: i64,
    last_login: Option<i64>,
}

impl From<UserRow> for UserView {
    fn from(row: UserRow) -> Self {
        let preferences =
            serde_json::from_str(&row.preferences).unwrap_or_else(|_| json!({}));
        Self {
            id: row.id,
            email: row.email,
            name: row.name,
            preferences,
            created_at: row.created_at,
            last_login: row.last_login,
        }
    }
}

#[instrument(skip_all, fields(endpoint = "register"))]
pub async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterBody>,
) -> Result<impl IntoResponse, ApiError> {
    validate::email(&body.email)?;
    validate::password_strength(&body.password)?;
    validate::display_name(&body.name)?;

    if state.db.get_user_by_email(&body.email).await?.is_some() {
        return Err(ApiError::Conflict("Email is already registered".into()));
    }

    let hash = password::hash_password(&body.password)?;
    let user_id = Uuid::new_v4().to_string();
    let user = state
        .db
        .create_user(&user_id, &body.email, body.name.trim(), &hash)
        .await?;

    let issued = state.tokens.issue(&user.id, &user.email)?;
    info!(user_id = %user.id, "User registered");

    Ok((
        StatusCode::CREATED,
        success(json!({
            "user": UserView::from(user),
            "token": issued.token,
            "expiresAt": issued.expires_at,
        })),
    ))
}

#[instrument(skip_all, fields(endpoint = "login"))]
pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginBody>,
) -> Result<impl IntoResponse, ApiError> {
    let user = state
        .db
        .get_user_by_email(&body.email)
        .await?
        .ok_or(AuthError::InvalidCredentials)
        .map_err(|err| {
            debug!("Login attempt for unknown email");
            ApiError::from(err)
        })?;

    let valid = password::verify_password(&body.password, &user.password_hash)?;
    if !valid {
        debug!(user_id = %user.id, "Failed login attempt");
        return Err(AuthError::InvalidCredentials.into());
    }

    state.db.touch_last_login(&user.id).await?;
    let issued = state.tokens.issue(&user.id, &user.email)?;
    info!(user_id = %user.id, "User logged in");

    let user = state.db.get_user(&user.id).await?;
    Ok(success(json!({
        "user": UserView::from(user),
        "token": issued.token,
        "expiresAt": issued.expires_at,
    })))
}

#[instrument(skip_all, fields(endpoint = "verify"))]
pub async fn verify(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    let user = state
        .db
        .get_user(&claims.sub)
        .await
        .map_err(|_| ApiError::Unauthorized)?;
    Ok(success(json!({ "user": UserView::from(user) })))
}
