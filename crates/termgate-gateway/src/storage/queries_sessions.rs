//! Terminal session records. These are history rows: they outlive the
//! in-memory connection and are kept after disconnect.

use termgate_core::db::{DatabaseError, unix_now};

use super::db::GatewayDatabase;
use super::models::TerminalSessionRow;

impl GatewayDatabase {
    /// Create or refresh a session record. Session IDs are supplied by the
    /// client, so reconnecting a tab with the same ID reuses the row.
    pub async fn upsert_session(
        &self,
        id: &str,
        user_id: &str,
        profile_id: &str,
        status: &str,
        title: Option<&str>,
    ) -> Result<TerminalSessionRow, DatabaseError> {
        let now = unix_now();

        sqlx::query(
            "INSERT INTO terminal_sessions (id, user_id, profile_id, status, title, created_at, last_activity) \
             VALUES (?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(id) DO UPDATE SET \
               profile_id = excluded.profile_id, \
               status = excluded.status, \
               title = COALESCE(excluded.title, terminal_sessions.title), \
               last_activity = excluded.last_activity",
        )
        .bind(id)
        .bind(user_id)
        .bind(profile_id)
        .bind(status)
        .bind(title)
        .bind(now)
        .bind(now)
        .execute(self.pool())
        .await?;

        self.get_session(id)
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Session {id}")))
    }

    /// Get a session record by ID.
    pub async fn get_session(&self, id: &str) -> Result<Option<TerminalSessionRow>, DatabaseError> {
        let session =
            sqlx::query_as::<_, TerminalSessionRow>("SELECT * FROM terminal_sessions WHERE id = ?")
                .bind(id)
                .fetch_optional(self.pool())
                .await?;
        Ok(session)
    }

    /// Update a session's status and stamp activity.
    pub async fn update_session_status(
        &self,
        id: &str,
        status: &str,
    ) -> Result<(), DatabaseError> {
        sqlx::query("UPDATE terminal_sessions SET status = ?, last_activity = ? WHERE id = ?")
            .bind(status)
            .bind(unix_now())
            .bind(id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// List a user's sessions that are not disconnected, most recent first.
    pub async fn list_active_sessions(
        &self,
        user_id: &str,
    ) -> Result<Vec<TerminalSessionRow>, DatabaseError> {
        let sessions = sqlx::query_as::<_, TerminalSessionRow>(
            "SELECT * FROM terminal_sessions WHERE user_id = ? AND status != 'disconnected' \
             ORDER BY last_activity DESC",
        )
        .bind(user_id)
        .fetch_all(self.pool())
        .await?;
        Ok(sessions)
    }
}
