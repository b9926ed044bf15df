//! SSH profile storage. Deletion is soft: rows stay, `active` is cleared,
//! and every read is filtered to active rows.

use serde::Deserialize;
use termgate_core::db::{DatabaseError, unix_now};

use super::db::GatewayDatabase;
use super::models::SshProfileRow;

/// Partial update for the mutable profile fields. Credentials are never
/// touched by updates.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub username: Option<String>,
}

impl ProfileUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.host.is_none() && self.port.is_none() && self.username.is_none()
    }
}

impl GatewayDatabase {
    /// Insert a profile with sealed credentials.
    #[allow(clippy::too_many_arguments)]
    pub async fn insert_profile(
        &self,
        id: &str,
        user_id: &str,
        name: &str,
        host: &str,
        port: u16,
        username: &str,
        auth_method: &str,
        encrypted_credentials: &str,
    ) -> Result<SshProfileRow, DatabaseError> {
        sqlx::query(
            "INSERT INTO ssh_profiles \
             (id, user_id, name, host, port, username, auth_method, encrypted_credentials, created_at, active) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 1)",
        )
        .bind(id)
        .bind(user_id)
        .bind(name)
        .bind(host)
        .bind(i64::from(port))
        .bind(username)
        .bind(auth_method)
        .bind(encrypted_credentials)
        .bind(unix_now())
        .execute(self.pool())
        .await?;

        self.get_profile(user_id, id)
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Profile {id}")))
    }

    /// Get an active profile scoped to its owner.
    pub async fn get_profile(
        &self,
        user_id: &str,
        id: &str,
    ) -> Result<Option<SshProfileRow>, DatabaseError> {
        let profile = sqlx::query_as::<_, SshProfileRow>(
            "SELECT * FROM ssh_profiles WHERE id = ? AND user_id = ? AND active = 1",
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(self.pool())
        .await?;
        Ok(profile)
    }

    /// Look up an active profile by display name (uniqueness check).
    pub async fn get_profile_by_name(
        &self,
        user_id: &str,
        name: &str,
    ) -> Result<Option<SshProfileRow>, DatabaseError> {
        let profile = sqlx::query_as::<_, SshProfileRow>(
            "SELECT * FROM ssh_profiles WHERE user_id = ? AND name = ? AND active = 1",
        )
        .bind(user_id)
        .bind(name)
        .fetch_optional(self.pool())
        .await?;
        Ok(profile)
    }

    /// List active profiles, most recently used first.
    pub async fn list_profiles(&self, user_id: &str) -> Result<Vec<SshProfileRow>, DatabaseError> {
        let profiles = sqlx::query_as::<_, SshProfileRow>(
            "SELECT * FROM ssh_profiles WHERE user_id = ? AND active = 1 \
             ORDER BY last_used IS NULL, last_used DESC, created_at DESC",
        )
        .bind(user_id)
        .fetch_all(self.pool())
        .await?;
        Ok(profiles)
    }

    /// Apply a partial update to an active profile. Returns the updated row,
    /// or `None` when the profile does not exist for this user.
    pub async fn update_profile(
        &self,
        user_id: &str,
        id: &str,
        update: &ProfileUpdate,
    ) -> Result<Option<SshProfileRow>, DatabaseError> {
        let Some(current) = self.get_profile(user_id, id).await? else {
            return Ok(None);
        };

        let name = update.name.as_deref().unwrap_or(&current.name);
        let host = update.host.as_deref().unwrap_or(&current.host);
        let port = update.port.map_or(current.port, i64::from);
        let username = update.username.as_deref().unwrap_or(&current.username);

        sqlx::query(
            "UPDATE ssh_profiles SET name = ?, host = ?, port = ?, username = ? \
             WHERE id = ? AND user_id = ? AND active = 1",
        )
        .bind(name)
        .bind(host)
        .bind(port)
        .bind(username)
        .bind(id)
        .bind(user_id)
        .execute(self.pool())
        .await?;

        self.get_profile(user_id, id).await
    }

    /// Soft-delete a profile. Returns whether a row was affected.
    pub async fn soft_delete_profile(
        &self,
        user_id: &str,
        id: &str,
    ) -> Result<bool, DatabaseError> {
        let result =
            sqlx::query("UPDATE ssh_profiles SET active = 0 WHERE id = ? AND user_id = ? AND active = 1")
                .bind(id)
                .bind(user_id)
                .execute(self.pool())
                .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Stamp a profile as used (connect time).
    pub async fn touch_profile_last_used(&self, id: &str) -> Result<(), DatabaseError> {
        sqlx::query("UPDATE ssh_profiles SET last_used = ? WHERE id = ?")
            .bind(unix_now())
            .bind(id)
            .execute(self.pool())
            .await?;
        Ok(())
    }
}
