//! Profile CRUD scoped to the calling user.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use termgate_core::db::DatabaseError;
use termgate_core::validate;
use termgate_crypto::{CredentialVault, CryptoError};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::ssh::SshCredential;
use crate::storage::{GatewayDatabase, ProfileUpdate, SshProfileRow};

use super::bundle::{AuthMethod, CredentialBundle, NewCredentials};

/// Profile store failures, mapped onto the HTTP taxonomy at the boundary.
#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("Profile not found")]
    NotFound,

    #[error("A profile with this name already exists")]
    NameConflict,

    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

impl From<termgate_core::Error> for ProfileError {
    fn from(err: termgate_core::Error) -> Self {
        Self::Validation(err.to_string())
    }
}

/// Fields accepted when creating a profile.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProfile {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub auth_method: AuthMethod,
}

/// Client-facing profile representation. Never carries credentials.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileView {
    pub id: String,
    pub name: String,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub auth_method: String,
    pub created_at: i64,
    pub last_used: Option<i64>,
}

impl From<SshProfileRow> for ProfileView {
    fn from(row: SshProfileRow) -> Self {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let port = row.port as u16;
        Self {
            id: row.id,
            name: row.name,
            host: row.host,
            port,
            username: row.username,
            auth_method: row.auth_method,
            created_at: row.created_at,
            last_used: row.last_used,
        }
    }
}

/// Decrypted snapshot handed to the connection manager.
pub struct ResolvedProfile {
    pub profile_id: String,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub credential: SshCredential,
}

/// Profile CRUD with credential sealing. Cheap to clone.
#[derive(Clone)]
pub struct ProfileStore {
    db: GatewayDatabase,
    vault: Arc<CredentialVault>,
}

impl ProfileStore {
    pub fn new(db: GatewayDatabase, vault: Arc<CredentialVault>) -> Self {
        Self { db, vault }
    }

    /// Active profiles for this user, most recently used first.
    pub async fn list(&self, user_id: &str) -> Result<Vec<ProfileView>, ProfileError> {
        let rows = self.db.list_profiles(user_id).await?;
        Ok(rows.into_iter().map(ProfileView::from).collect())
    }

    /// Validate, seal and store a new profile.
    pub async fn create(
        &self,
        user_id: &str,
        profile: &NewProfile,
        credentials: &NewCredentials,
    ) -> Result<ProfileView, ProfileError> {
        validate::display_name(&profile.name)?;
        validate::host(&profile.host)?;
        validate::port(profile.port)?;
        validate::remote_username(&profile.username)?;
        check_credential_consistency(profile.auth_method, credentials)?;

        if self
            .db
            .get_profile_by_name(user_id, profile.name.trim())
            .await?
            .is_some()
        {
            return Err(ProfileError::NameConflict);
        }

        let bundle = CredentialBundle::seal(&self.vault, profile.auth_method, credentials)?;
        let bundle_json = serde_json::to_string(&bundle)
            .map_err(|e| ProfileError::Validation(e.to_string()))?;

        let id = Uuid::new_v4().to_string();
        let row = self
            .db
            .insert_profile(
                &id,
                user_id,
                profile.name.trim(),
                &profile.host,
                profile.port,
                &profile.username,
                profile.auth_method.as_str(),
                &bundle_json,
            )
            .await?;

        debug!(profile_id = %id, user_id = %user_id, "Profile created");
        Ok(ProfileView::from(row))
    }

    /// Apply a partial update. Credentials are never touched.
    pub async fn update(
        &self,
        user_id: &str,
        profile_id: &str,
        update: &ProfileUpdate,
    ) -> Result<ProfileView, ProfileError> {
        if update.is_empty() {
            return Err(ProfileError::Validation(
                "at least one of name, host, port or username must be supplied".into(),
            ));
        }
        if let Some(name) = &update.name {
            validate::display_name(name)?;
            if let Some(existing) = self.db.get_profile_by_name(user_id, name.trim()).await?
                && existing.id != profile_id
            {
                return Err(ProfileError::NameConflict);
            }
        }
        if let Some(host) = &update.host {
            validate::host(host)?;
        }
        if let Some(port) = update.port {
            validate::port(port)?;
        }
        if let Some(username) = &update.username {
            validate::remote_username(username)?;
        }

        let row = self
            .db
            .update_profile(user_id, profile_id, update)
            .await?
            .ok_or(ProfileError::NotFound)?;
        Ok(ProfileView::from(row))
    }

    /// Soft-delete a profile.
    pub async fn delete(&self, user_id: &str, profile_id: &str) -> Result<(), ProfileError> {
        let deleted = self.db.soft_delete_profile(user_id, profile_id).await?;
        if deleted {
            debug!(profile_id = %profile_id, user_id = %user_id, "Profile deleted");
            Ok(())
        } else {
            Err(ProfileError::NotFound)
        }
    }

    /// Decrypt the credentials for a connect on behalf of the owning user
    /// and stamp `last_used`.
    pub async fn resolve_for_connect(
        &self,
        user_id: &str,
        profile_id: &str,
    ) -> Result<ResolvedProfile, ProfileError> {
        let row = self
            .db
            .get_profile(user_id, profile_id)
            .await?
            .ok_or(ProfileError::NotFound)?;

        let bundle: CredentialBundle = serde_json::from_str(&row.encrypted_credentials)
            .map_err(|_| ProfileError::Crypto(CryptoError::MalformedSealed))?;
        let credential = bundle.unseal(&self.vault)?;

        self.db.touch_profile_last_used(&row.id).await?;

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let port = row.port as u16;
        Ok(ResolvedProfile {
            profile_id: row.id,
            host: row.host,
            port,
            username: row.username,
            credential,
        })
    }
}

fn check_credential_consistency(
    auth_method: AuthMethod,
    credentials: &NewCredentials,
) -> Result<(), ProfileError> {
    match auth_method {
        AuthMethod::Password => {
            if credentials.password.as_deref().unwrap_or_default().is_empty() {
                return Err(ProfileError::Validation(
                    "password auth requires a password".into(),
                ));
            }
            if credentials.private_key.is_some() || credentials.passphrase.is_some() {
                return Err(ProfileError::Validation(
                    "password auth must not carry key material".into(),
                ));
            }
        }
        AuthMethod::PublicKey => {
            if credentials
                .private_key
                .as_deref()
                .unwrap_or_default()
                .is_empty()
            {
                return Err(ProfileError::Validation(
                    "publicKey auth requires a private key".into(),
                ));
            }
            if credentials.password.is_some() {
                return Err(ProfileError::Validation(
                    "publicKey auth must not carry a password".into(),
                ));
            }
        }
    }
    Ok(())
}
