//! User and assistant-query storage.

use termgate_core::db::{DatabaseError, unix_now};

use super::db::GatewayDatabase;
use super::models::{AiQueryRecord, UserRow};

impl GatewayDatabase {
    // =========================================================================
    // User queries
    // =========================================================================

    /// Create a new user with default preferences.
    pub async fn create_user(
        &self,
        id: &str,
        email: &str,
        name: &str,
        password_hash: &str,
    ) -> Result<UserRow, DatabaseError> {
        let now = unix_now();

        sqlx::query(
            "INSERT INTO users (id, email, name, password_hash, preferences, created_at) \
             VALUES (?, ?, ?, ?, '{}', ?)",
        )
        .bind(id)
        .bind(email)
        .bind(name)
        .bind(password_hash)
        .bind(now)
        .execute(self.pool())
        .await?;

        self.get_user(id).await
    }

    /// Get a user by ID.
    pub async fn get_user(&self, id: &str) -> Result<UserRow, DatabaseError> {
        sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("User {id}")))
    }

    /// Get a user by email. Matching is case-insensitive (NOCASE column).
    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>, DatabaseError> {
        let user = sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE email = ?")
            .bind(email)
            .fetch_optional(self.pool())
            .await?;
        Ok(user)
    }

    /// Stamp a successful login.
    pub async fn touch_last_login(&self, id: &str) -> Result<(), DatabaseError> {
        sqlx::query("UPDATE users SET last_login = ? WHERE id = ?")
            .bind(unix_now())
            .bind(id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    // =========================================================================
    // Assistant query log
    // =========================================================================

    /// Persist an assistant exchange for auditing.
    #[allow(clippy::too_many_arguments)]
    pub async fn insert_ai_query(
        &self,
        id: &str,
        user_id: &str,
        session_id: Option<&str>,
        prompt: &str,
        response: &str,
        commands_json: &str,
        explanation: &str,
        warnings_json: &str,
        confidence: f64,
    ) -> Result<(), DatabaseError> {
        sqlx::query(
            "INSERT INTO ai_queries \
             (id, user_id, session_id, prompt, response, commands, explanation, warnings, confidence, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(id)
        .bind(user_id)
        .bind(session_id)
        .bind(prompt)
        .bind(response)
        .bind(commands_json)
        .bind(explanation)
        .bind(warnings_json)
        .bind(confidence)
        .bind(unix_now())
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Fetch a stored assistant exchange.
    pub async fn get_ai_query(&self, id: &str) -> Result<AiQueryRecord, DatabaseError> {
        sqlx::query_as::<_, AiQueryRecord>("SELECT * FROM ai_queries WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("AiQuery {id}")))
    }
}
