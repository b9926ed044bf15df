//! SSH profile CRUD endpoints.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Deserialize;
use serde_json::json;

use crate::profiles::{NewCredentials, NewProfile};
use crate::storage::ProfileUpdate;

use super::AppState;
use super::error::{ApiError, success};
use super::middleware::AuthUser;

#[derive(Debug, Deserialize)]
pub struct CreateProfileBody {
    profile: NewProfile,
    credentials: NewCredentials,
}

pub async fn list_profiles(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    let profiles = state.profiles.list(&claims.sub).await?;
    Ok(success(profiles))
}

pub async fn create_profile(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Json(body): Json<CreateProfileBody>,
) -> Result<impl IntoResponse, ApiError> {
    let profile = state
        .profiles
        .create(&claims.sub, &body.profile, &body.credentials)
        .await?;
    Ok((StatusCode::CREATED, success(profile)))
}

pub async fn update_profile(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Path(profile_id): Path<String>,
    Json(update): Json<ProfileUpdate>,
) -> Result<impl IntoResponse, ApiError> {
    let profile = state
        .profiles
        .update(&claims.sub, &profile_id, &update)
        .await?;
    Ok(success(profile))
}

pub async fn delete_profile(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Path(profile_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state.profiles.delete(&claims.sub, &profile_id).await?;
    Ok(success(json!({"ok": true})))
}
