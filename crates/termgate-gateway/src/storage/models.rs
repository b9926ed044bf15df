//! Row types for gateway storage.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct UserRow {
    pub id: String,
    pub email: String,
    pub name: String,
    pub password_hash: String,
    /// Opaque JSON blob the gateway persists verbatim.
    pub preferences: String,
    pub created_at: i64,
    pub last_login: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SshProfileRow {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub host: String,
    pub port: i64,
    pub username: String,
    pub auth_method: String,
    pub encrypted_credentials: String,
    pub created_at: i64,
    pub last_used: Option<i64>,
    pub active: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TerminalSessionRow {
    pub id: String,
    pub user_id: String,
    pub profile_id: String,
    pub status: String,
    pub title: Option<String>,
    pub created_at: i64,
    pub last_activity: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AiQueryRecord {
    pub id: String,
    pub user_id: String,
    pub session_id: Option<String>,
    pub prompt: String,
    pub response: String,
    /// JSON array of extracted commands.
    pub commands: String,
    pub explanation: String,
    /// JSON array of operator warnings.
    pub warnings: String,
    pub confidence: f64,
    pub created_at: i64,
}
