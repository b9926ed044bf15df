//! Durable storage for the gateway: users, SSH profiles, terminal
//! sessions and assistant queries, backed by SQLite via sqlx.

mod db;
mod models;
mod queries;
mod queries_profiles;
mod queries_sessions;


pub use db::GatewayDatabase;
pub use models::{AiQueryRecord, SshProfileRow, TerminalSessionRow, UserRow};
pub use queries_profiles::ProfileUpdate;
