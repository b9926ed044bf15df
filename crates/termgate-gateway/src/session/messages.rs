//! Stream channel frames.
//!
//! Discrete JSON messages with a `type` tag. Unknown payload fields are
//! ignored; unknown `type` values are rejected with a protocol error at
//! the socket layer rather than silently dropped.

use serde::{Deserialize, Serialize};

use crate::ssh::ConnectionStatus;
use crate::storage::TerminalSessionRow;

/// Frames the client sends to the gateway.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "ssh:connect", rename_all = "camelCase")]
    SshConnect {
        session_id: String,
        profile_id: String,
        #[serde(default)]
        cols: Option<u16>,
        #[serde(default)]
        rows: Option<u16>,
        #[serde(default)]
        title: Option<String>,
    },

    #[serde(rename = "ssh:disconnect", rename_all = "camelCase")]
    SshDisconnect { session_id: String },

    #[serde(rename = "terminal:input", rename_all = "camelCase")]
    TerminalInput { session_id: String, data: String },

    #[serde(rename = "terminal:resize", rename_all = "camelCase")]
    TerminalResize {
        session_id: String,
        cols: u16,
        rows: u16,
    },

    /// Advisory; the visual clear happens client-side.
    #[serde(rename = "terminal:clear", rename_all = "camelCase")]
    TerminalClear { session_id: String },

    #[serde(rename = "ai:translate", rename_all = "camelCase")]
    AiTranslate {
        prompt: String,
        #[serde(default)]
        session_id: Option<String>,
        #[serde(default)]
        context: Option<String>,
    },

    #[serde(rename = "ai:explain", rename_all = "camelCase")]
    AiExplain {
        command: String,
        #[serde(default)]
        session_id: Option<String>,
    },

    #[serde(rename = "ai:query", rename_all = "camelCase")]
    AiQuery {
        prompt: String,
        #[serde(default)]
        session_id: Option<String>,
    },

    #[serde(rename = "session:list")]
    SessionList,
}

/// Frames the gateway sends to the client.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// Shell output. `data` carries the chunk when it is valid UTF-8;
    /// otherwise `binary` carries the exact bytes as base64, so split
    /// multi-byte sequences and raw binary output are never mangled.
    #[serde(rename = "terminal:output", rename_all = "camelCase")]
    TerminalOutput {
        session_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        data: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        binary: Option<String>,
    },

    #[serde(rename = "ssh:status", rename_all = "camelCase")]
    SshStatus {
        session_id: String,
        status: ConnectionStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    #[serde(rename = "ai:response", rename_all = "camelCase")]
    AiResponse {
        commands: Vec<String>,
        explanation: String,
        warnings: Vec<String>,
        confidence: f64,
    },

    #[serde(rename = "session:list", rename_all = "camelCase")]
    SessionList { sessions: Vec<SessionSummary> },

    #[serde(rename = "error", rename_all = "camelCase")]
    Error { message: String },
}

/// Durable session record as listed to the client.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub id: String,
    pub profile_id: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub created_at: i64,
    pub last_activity: i64,
}

impl From<TerminalSessionRow> for SessionSummary {
    fn from(row: TerminalSessionRow) -> Self {
        Self {
            id: row.id,
            profile_id: row.profile_id,
            status: row.status,
            title: row.title,
            created_at: row.created_at,
            last_activity: row.last_activity,
        }
    }
}

impl ServerMessage {
    /// Build a `terminal:output` frame without altering the chunk: UTF-8
    /// chunks go out as text, anything else as base64.
    pub fn terminal_output(session_id: String, bytes: Vec<u8>) -> Self {
        match String::from_utf8(bytes) {
            Ok(text) => Self::TerminalOutput {
                session_id,
                data: Some(text),
                binary: None,
            },
            Err(err) => Self::TerminalOutput {
                session_id,
                data: None,
                binary: Some(termgate_crypto::encoding::encode(&err.into_bytes())),
            },
        }
    }
}
