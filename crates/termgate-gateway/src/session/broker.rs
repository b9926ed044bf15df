//! Per-client session broker.
//!
//! One broker instance lives for the duration of one authenticated stream.
//! It owns the mapping from client-visible session IDs to connection IDs,
//! subscribes to exactly the connections it created, and mirrors status
//! transitions into the durable session records. A client can never drive
//! a connection outside its own mapping.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use crate::assistant::{AssistantBridge, AssistantError, AssistantReply};
use crate::profiles::{ProfileError, ProfileStore};
use crate::ssh::{
    ConnectParams, ConnectionEvent, ConnectionManager, ConnectionStatus, DEFAULT_COLS,
    DEFAULT_ROWS,
};
use crate::storage::GatewayDatabase;

use super::messages::{ClientMessage, ServerMessage, SessionSummary};

pub struct SessionBroker {
    user_id: String,
    db: GatewayDatabase,
    profiles: ProfileStore,
    manager: ConnectionManager,
    assistant: Option<Arc<AssistantBridge>>,
    outbound: mpsc::Sender<ServerMessage>,
    /// session-id -> connection-id
    sessions: HashMap<String, String>,
}

impl SessionBroker {
    pub fn new(
        user_id: String,
        db: GatewayDatabase,
        profiles: ProfileStore,
        manager: ConnectionManager,
        assistant: Option<Arc<AssistantBridge>>,
        outbound: mpsc::Sender<ServerMessage>,
    ) -> Self {
        Self {
            user_id,
            db,
            profiles,
            manager,
            assistant,
            outbound,
            sessions: HashMap::new(),
        }
    }

    /// Dispatch one inbound frame.
    pub async fn handle(&mut self, message: ClientMessage) {
        match message {
            ClientMessage::SshConnect {
                session_id,
                profile_id,
                cols,
                rows,
                title,
            } => {
                self.connect(session_id, profile_id, cols, rows, title)
                    .await;
            }
            ClientMessage::SshDisconnect { session_id } => self.disconnect(&session_id).await,
            ClientMessage::TerminalInput { session_id, data } => {
                self.input(&session_id, data).await;
            }
            ClientMessage::TerminalResize {
                session_id,
                cols,
                rows,
            } => self.resize(&session_id, cols, rows).await,
            ClientMessage::TerminalClear { session_id } => {
                // client-side visual clear; nothing to do server-side
                debug!(session_id = %session_id, "Terminal clear (advisory)");
            }
            ClientMessage::AiTranslate {
                prompt,
                session_id,
                context,
            } => {
                let reply = match &self.assistant {
                    Some(bridge) => {
                        bridge
                            .translate(
                                &self.user_id,
                                session_id.as_deref(),
                                &prompt,
                                context.as_deref(),
                            )
                            .await
                    }
                    None => Err(AssistantError::NotConfigured),
                };
                self.send(reply_frame(reply)).await;
            }
            ClientMessage::AiExplain {
                command,
                session_id,
            } => {
                let reply = match &self.assistant {
                    Some(bridge) => {
                        bridge
                            .explain(&self.user_id, session_id.as_deref(), &command)
                            .await
                    }
                    None => Err(AssistantError::NotConfigured),
                };
                self.send(reply_frame(reply)).await;
            }
            ClientMessage::AiQuery { prompt, session_id } => {
                let reply = match &self.assistant {
                    Some(bridge) => {
                        bridge
                            .query(&self.user_id, session_id.as_deref(), &prompt)
                            .await
                    }
                    None => Err(AssistantError::NotConfigured),
                };
                self.send(reply_frame(reply)).await;
            }
            ClientMessage::SessionList => self.list_sessions().await,
        }
    }

    /// Tear down every session owned by this broker. Called when the
    /// client stream closes; durable records keep their last status.
    pub async fn shutdown(mut self) {
        let sessions = std::mem::take(&mut self.sessions);
        for (session_id, connection_id) in sessions {
            debug!(session_id = %session_id, "Closing session on stream teardown");
            self.manager.close_connection(&connection_id).await;
        }
        info!(user_id = %self.user_id, "Session broker closed");
    }

    /// Report a frame the gateway could not parse.
    pub async fn protocol_error(&self, detail: &str) {
        self.send(ServerMessage::Error {
            message: format!("unrecognized message: {detail}"),
        })
        .await;
    }

    async fn connect(
        &mut self,
        session_id: String,
        profile_id: String,
        cols: Option<u16>,
        rows: Option<u16>,
        title: Option<String>,
    ) {
        if self.sessions.contains_key(&session_id) {
            self.send(ServerMessage::Error {
                message: format!("session {session_id} is already connected"),
            })
            .await;
            return;
        }

        let resolved = match self
            .profiles
            .resolve_for_connect(&self.user_id, &profile_id)
            .await
        {
            Ok(resolved) => resolved,
            Err(err) => {
                self.fail_session(&session_id, &profile_id, &err.to_string(), matches!(err, ProfileError::NotFound))
                    .await;
                return;
            }
        };

        if let Err(err) = self
            .db
            .upsert_session(
                &session_id,
                &self.user_id,
                &resolved.profile_id,
                ConnectionStatus::Connecting.as_str(),
                title.as_deref(),
            )
            .await
        {
            warn!(error = %err, session_id = %session_id, "Failed to record session");
        }

        let params = ConnectParams {
            host: resolved.host,
            port: resolved.port,
            username: resolved.username,
            credential: resolved.credential,
            cols: cols.unwrap_or(DEFAULT_COLS),
            rows: rows.unwrap_or(DEFAULT_ROWS),
        };

        match self.manager.create_connection(&self.user_id, params).await {
            Ok((connection_id, events)) => {
                self.sessions.insert(session_id.clone(), connection_id);
                self.spawn_forwarder(session_id, events);
            }
            Err(err) => {
                // create_connection already emitted error on its channel,
                // but no forwarder was attached yet; report directly.
                let _ = self
                    .db
                    .update_session_status(&session_id, ConnectionStatus::Error.as_str())
                    .await;
                self.send(ServerMessage::SshStatus {
                    session_id,
                    status: ConnectionStatus::Error,
                    error: Some(err.to_string()),
                })
                .await;
            }
        }
    }

    async fn disconnect(&mut self, session_id: &str) {
        let Some(connection_id) = self.sessions.remove(session_id) else {
            self.unknown_session(session_id).await;
            return;
        };
        self.manager.close_connection(&connection_id).await;
        // the forwarder mirrors the final disconnected status; the durable
        // update here covers the case where it already exited
        let _ = self
            .db
            .update_session_status(session_id, ConnectionStatus::Disconnected.as_str())
            .await;
    }

    async fn input(&self, session_id: &str, data: String) {
        let Some(connection_id) = self.sessions.get(session_id) else {
            self.unknown_session(session_id).await;
            return;
        };
        if let Err(err) = self
            .manager
            .send_input(connection_id, data.into_bytes())
            .await
        {
            self.send(ServerMessage::Error {
                message: format!("input to {session_id} failed: {err}"),
            })
            .await;
        }
    }

    async fn resize(&self, session_id: &str, cols: u16, rows: u16) {
        let Some(connection_id) = self.sessions.get(session_id) else {
            self.unknown_session(session_id).await;
            return;
        };
        if let Err(err) = self.manager.resize(connection_id, cols, rows).await {
            self.send(ServerMessage::Error {
                message: format!("resize of {session_id} failed: {err}"),
            })
            .await;
        }
    }

    async fn list_sessions(&self) {
        match self.db.list_active_sessions(&self.user_id).await {
            Ok(rows) => {
                let sessions = rows.into_iter().map(SessionSummary::from).collect();
                self.send(ServerMessage::SessionList { sessions }).await;
            }
            Err(err) => {
                warn!(error = %err, "Session listing failed");
                self.send(ServerMessage::Error {
                    message: "session listing failed".into(),
                })
                .await;
            }
        }
    }

    /// Relay connection events to this client and mirror status changes
    /// into the durable record. Ends when the connection's event channel
    /// closes.
    fn spawn_forwarder(
        &self,
        session_id: String,
        mut events: broadcast::Receiver<ConnectionEvent>,
    ) {
        let outbound = self.outbound.clone();
        let db = self.db.clone();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(ConnectionEvent::Data(bytes)) => {
                        let frame = ServerMessage::terminal_output(session_id.clone(), bytes);
                        if outbound.send(frame).await.is_err() {
                            break;
                        }
                    }
                    Ok(ConnectionEvent::Status { status, message }) => {
                        if let Err(err) =
                            db.update_session_status(&session_id, status.as_str()).await
                        {
                            warn!(error = %err, session_id = %session_id, "Status persist failed");
                        }
                        let frame = ServerMessage::SshStatus {
                            session_id: session_id.clone(),
                            status,
                            error: message,
                        };
                        if outbound.send(frame).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(session_id = %session_id, skipped, "Event stream lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            debug!(session_id = %session_id, "Forwarder finished");
        });
    }

    async fn fail_session(
        &self,
        session_id: &str,
        profile_id: &str,
        message: &str,
        not_found: bool,
    ) {
        if not_found {
            debug!(session_id = %session_id, profile_id = %profile_id, "Connect to unknown profile");
        } else {
            warn!(session_id = %session_id, profile_id = %profile_id, error = %message, "Connect failed");
        }
        self.send(ServerMessage::SshStatus {
            session_id: session_id.to_string(),
            status: ConnectionStatus::Error,
            error: Some(message.to_string()),
        })
        .await;
    }

    async fn unknown_session(&self, session_id: &str) {
        self.send(ServerMessage::Error {
            message: format!("unknown session {session_id}"),
        })
        .await;
    }

    async fn send(&self, frame: ServerMessage) {
        if self.outbound.send(frame).await.is_err() {
            debug!("Outbound channel closed");
        }
    }
}

/// Turn an assistant outcome into the response frame. Failures become a
/// degraded reply with zero confidence and a diagnostic warning; the
/// session is unaffected.
fn reply_frame(result: Result<AssistantReply, AssistantError>) -> ServerMessage {
    match result {
        Ok(reply) => ServerMessage::AiResponse {
            commands: reply.commands,
            explanation: reply.explanation,
            warnings: reply.warnings,
            confidence: reply.confidence,
        },
        Err(err) => ServerMessage::AiResponse {
            commands: Vec::new(),
            explanation: String::new(),
            warnings: vec![err.to_string()],
            confidence: 0.0,
        },
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::profiles::{AuthMethod, NewCredentials, NewProfile};
    use termgate_crypto::CredentialVault;

    async fn test_broker() -> (SessionBroker, mpsc::Receiver<ServerMessage>, ProfileStore) {
        let db = GatewayDatabase::open_in_memory().await.unwrap();
        db.create_user("u1", "alice@example.com", "Alice", "hash")
            .await
            .unwrap();
        let vault = Arc::new(CredentialVault::new(b"broker-test-secret").unwrap());
        let profiles = ProfileStore::new(db.clone(), vault);
        let manager = ConnectionManager::with_defaults();
        let (out_tx, out_rx) = mpsc::channel(64);
        let broker = SessionBroker::new(
            "u1".into(),
            db,
            profiles.clone(),
            manager,
            None,
            out_tx,
        );
        (broker, out_rx, profiles)
    }

    #[tokio::test]
    async fn connect_to_unknown_profile_reports_error_status() {
        let (mut broker, mut out_rx, _profiles) = test_broker().await;

        broker
            .handle(ClientMessage::SshConnect {
                session_id: "S1".into(),
                profile_id: "missing".into(),
                cols: None,
                rows: None,
                title: None,
            })
            .await;

        match out_rx.recv().await.unwrap() {
            ServerMessage::SshStatus {
                session_id,
                status,
                error,
            } => {
                assert_eq!(session_id, "S1");
                assert_eq!(status, ConnectionStatus::Error);
                assert!(error.is_some());
            }
            other => panic!("expected ssh:status, got {other:?}"),
        }
        assert!(broker.sessions.is_empty());
    }

    #[tokio::test]
    async fn input_to_unknown_session_is_rejected() {
        let (mut broker, mut out_rx, _profiles) = test_broker().await;

        broker
            .handle(ClientMessage::TerminalInput {
                session_id: "S9".into(),
                data: "ls\n".into(),
            })
            .await;

        match out_rx.recv().await.unwrap() {
            ServerMessage::Error { message } => assert!(message.contains("S9")),
            other => panic!("expected error frame, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn assistant_without_provider_degrades() {
        let (mut broker, mut out_rx, _profiles) = test_broker().await;

        broker
            .handle(ClientMessage::AiTranslate {
                prompt: "list files".into(),
                session_id: None,
                context: None,
            })
            .await;

        match out_rx.recv().await.unwrap() {
            ServerMessage::AiResponse {
                commands,
                warnings,
                confidence,
                ..
            } => {
                assert!(commands.is_empty());
                assert!((confidence - 0.0).abs() < f64::EPSILON);
                assert!(!warnings.is_empty());
            }
            other => panic!("expected ai:response, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn session_list_is_scoped_and_empty_initially() {
        let (mut broker, mut out_rx, _profiles) = test_broker().await;

        broker.handle(ClientMessage::SessionList).await;
        match out_rx.recv().await.unwrap() {
            ServerMessage::SessionList { sessions } => assert!(sessions.is_empty()),
            other => panic!("expected session:list, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn failed_connect_still_lists_errored_session() {
        let (mut broker, mut out_rx, profiles) = test_broker().await;

        // a real profile pointing at an unreachable target
        let view = profiles
            .create(
                "u1",
                &NewProfile {
                    name: "dead".into(),
                    host: "127.0.0.1".into(),
                    port: 9,
                    username: "nobody".into(),
                    auth_method: AuthMethod::Password,
                },
                &NewCredentials {
                    password: Some("pw".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        broker
            .handle(ClientMessage::SshConnect {
                session_id: "S1".into(),
                profile_id: view.id,
                cols: None,
                rows: None,
                title: Some("dead host".into()),
            })
            .await;

        // the dial failure surfaces as an error status frame
        let frame = out_rx.recv().await.unwrap();
        assert!(matches!(
            frame,
            ServerMessage::SshStatus {
                status: ConnectionStatus::Error,
                ..
            }
        ));

        // the durable record exists in error state and appears in listings
        broker.handle(ClientMessage::SessionList).await;
        match out_rx.recv().await.unwrap() {
            ServerMessage::SessionList { sessions } => {
                assert_eq!(sessions.len(), 1);
                assert_eq!(sessions[0].id, "S1");
                assert_eq!(sessions[0].status, "error");
                assert_eq!(sessions[0].title.as_deref(), Some("dead host"));
            }
            other => panic!("expected session:list, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn disconnect_of_unknown_session_is_an_error_frame() {
        let (mut broker, mut out_rx, _profiles) = test_broker().await;

        broker
            .handle(ClientMessage::SshDisconnect {
                session_id: "S1".into(),
            })
            .await;
        assert!(matches!(
            out_rx.recv().await.unwrap(),
            ServerMessage::Error { .. }
        ));
    }
}
