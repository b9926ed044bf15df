//! Pool of live SSH connections and the lifecycle state machine.
//!
//! Each connection is driven by one pump task that owns the russh channel
//! and serializes writes; the manager map holds only status, dimensions,
//! the credential snapshot for reconnects, and the channel endpoints.
//! Remote close or a transport error triggers a single reconnection
//! attempt after a fixed delay; a background sweeper reaps idle
//! connections.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant};

use russh::ChannelMsg;
use tokio::sync::{RwLock, broadcast, mpsc, watch};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::connection::{self, EstablishedShell};
use super::types::{
    ConnectParams, ConnectionError, ConnectionEvent, ConnectionStatus, clamp_dimensions,
};

/// Buffered events per connection. Chunky shell output is coalesced by the
/// client; a lagging subscriber skips ahead rather than blocking the pump.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Buffered input writes per connection.
const INPUT_CHANNEL_CAPACITY: usize = 64;

/// Timing knobs for the connection state machine.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Bound on dial + auth + channel setup.
    pub dial_timeout: Duration,
    /// SSH-level keepalive interval for established transports.
    pub keepalive_interval: Duration,
    /// Wait before the single automatic reconnection attempt.
    pub reconnect_delay: Duration,
    /// Connections idle longer than this are reaped.
    pub idle_timeout: Duration,
    /// How often the sweeper looks for idle connections.
    pub sweep_interval: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            dial_timeout: Duration::from_secs(30),
            keepalive_interval: Duration::from_secs(60),
            reconnect_delay: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(30 * 60),
            sweep_interval: Duration::from_secs(60),
        }
    }
}

struct ConnectionEntry {
    user_id: String,
    status: ConnectionStatus,
    cols: u16,
    rows: u16,
    params: ConnectParams,
    last_activity: Arc<StdMutex<Instant>>,
    event_tx: broadcast::Sender<ConnectionEvent>,
    input_tx: mpsc::Sender<Vec<u8>>,
    resize_tx: watch::Sender<(u16, u16)>,
    shutdown_tx: watch::Sender<bool>,
}

impl ConnectionEntry {
    fn emit_status(&self, status: ConnectionStatus, message: Option<String>) {
        let _ = self.event_tx.send(ConnectionEvent::Status { status, message });
    }

    fn touch(&self) {
        if let Ok(mut guard) = self.last_activity.lock() {
            *guard = Instant::now();
        }
    }
}

struct ManagerInner {
    connections: RwLock<HashMap<String, ConnectionEntry>>,
    config: ManagerConfig,
}

/// Owner of every live SSH connection in the process.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<ManagerInner>,
}

impl ConnectionManager {
    pub fn new(config: ManagerConfig) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                connections: RwLock::new(HashMap::new()),
                config,
            }),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(ManagerConfig::default())
    }

    /// Start the background idle sweeper. Runs until the manager is
    /// dropped and the task is aborted by the returned handle's owner.
    pub fn spawn_idle_sweeper(&self) -> tokio::task::JoinHandle<()> {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(inner.config.sweep_interval);
            ticker.tick().await; // skip the immediate tick
            loop {
                ticker.tick().await;
                ManagerInner::sweep_idle(&inner).await;
            }
        })
    }

    /// Open a connection and shell for the given user.
    ///
    /// Emits `connecting` on insert and `connected` on success; both are
    /// buffered on the returned receiver so subscribers observe the full
    /// transition sequence. Dial and auth failures are returned to the
    /// caller, emit `error`, and drop the record.
    pub async fn create_connection(
        &self,
        user_id: &str,
        params: ConnectParams,
    ) -> Result<(String, broadcast::Receiver<ConnectionEvent>), ConnectionError> {
        let id = Uuid::new_v4().to_string();
        let (cols, rows) = clamp_dimensions(params.cols, params.rows);

        let (event_tx, event_rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (input_tx, input_rx) = mpsc::channel(INPUT_CHANNEL_CAPACITY);
        let (resize_tx, resize_rx) = watch::channel((cols, rows));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let entry = ConnectionEntry {
            user_id: user_id.to_string(),
            status: ConnectionStatus::Connecting,
            cols,
            rows,
            params: params.clone(),
            last_activity: Arc::new(StdMutex::new(Instant::now())),
            event_tx,
            input_tx,
            resize_tx,
            shutdown_tx,
        };
        entry.emit_status(ConnectionStatus::Connecting, None);

        {
            let mut connections = self.inner.connections.write().await;
            connections.insert(id.clone(), entry);
        }

        info!(connection_id = %id, host = %params.host, port = params.port, "Connecting");

        let dial = connection::establish(
            &params,
            cols,
            rows,
            self.inner.config.dial_timeout,
            self.inner.config.keepalive_interval,
        )
        .await;

        let shell = match dial {
            Ok(shell) => shell,
            Err(err) => {
                let mut connections = self.inner.connections.write().await;
                if let Some(entry) = connections.remove(&id) {
                    entry.status_to_error(&err);
                }
                warn!(connection_id = %id, error = %err, "Connection failed");
                return Err(err);
            }
        };

        {
            let mut connections = self.inner.connections.write().await;
            // the entry can only be gone if close raced the dial
            if let Some(entry) = connections.get_mut(&id) {
                entry.status = ConnectionStatus::Connected;
                entry.touch();
                entry.emit_status(ConnectionStatus::Connected, None);
                ManagerInner::spawn_pump(
                    &self.inner,
                    id.clone(),
                    shell,
                    entry.event_tx.clone(),
                    Arc::clone(&entry.last_activity),
                    input_rx,
                    resize_rx,
                    shutdown_rx,
                );
            } else {
                drop(connections);
                shell.disconnect().await;
                return Err(ConnectionError::NotFound(id));
            }
        }

        info!(connection_id = %id, "Connected");
        Ok((id, event_rx))
    }

    /// Write user input to the shell, preserving byte boundaries.
    pub async fn send_input(&self, id: &str, bytes: Vec<u8>) -> Result<(), ConnectionError> {
        let input_tx = {
            let connections = self.inner.connections.read().await;
            let entry = connections
                .get(id)
                .ok_or_else(|| ConnectionError::NotFound(id.to_string()))?;
            if entry.status != ConnectionStatus::Connected {
                return Err(ConnectionError::NotConnected(id.to_string()));
            }
            entry.touch();
            entry.input_tx.clone()
        };

        input_tx
            .send(bytes)
            .await
            .map_err(|_| ConnectionError::NotConnected(id.to_string()))
    }

    /// Update terminal dimensions and issue a window-change. Dimensions
    /// are clamped; the stored size is updated even while reconnecting.
    pub async fn resize(&self, id: &str, cols: u16, rows: u16) -> Result<(), ConnectionError> {
        let (cols, rows) = clamp_dimensions(cols, rows);
        let mut connections = self.inner.connections.write().await;
        let entry = connections
            .get_mut(id)
            .ok_or_else(|| ConnectionError::NotFound(id.to_string()))?;
        entry.cols = cols;
        entry.rows = rows;
        entry.touch();
        // no receiver just means the pump is between generations
        let _ = entry.resize_tx.send((cols, rows));
        Ok(())
    }

    /// Close a connection: signal the pump, emit the final `disconnected`
    /// and remove the record. Calling this twice is a no-op.
    pub async fn close_connection(&self, id: &str) {
        let removed = {
            let mut connections = self.inner.connections.write().await;
            connections.remove(id)
        };
        if let Some(entry) = removed {
            let _ = entry.shutdown_tx.send(true);
            entry.emit_status(ConnectionStatus::Disconnected, None);
            info!(connection_id = %id, "Connection closed");
        }
    }

    /// Current status of a connection, if it exists.
    pub async fn status(&self, id: &str) -> Option<ConnectionStatus> {
        let connections = self.inner.connections.read().await;
        connections.get(id).map(|entry| entry.status)
    }

    /// Owning user of a connection, if it exists.
    pub async fn owner(&self, id: &str) -> Option<String> {
        let connections = self.inner.connections.read().await;
        connections.get(id).map(|entry| entry.user_id.clone())
    }

    /// Number of live connection records.
    pub async fn connection_count(&self) -> usize {
        self.inner.connections.read().await.len()
    }
}

impl ConnectionEntry {
    fn status_to_error(&self, err: &ConnectionError) {
        self.emit_status(ConnectionStatus::Error, Some(err.to_string()));
    }
}

/// Why a pump loop ended.
enum PumpExit {
    /// Deliberate shutdown via `close_connection` or broker teardown.
    Shutdown,
    /// The remote side closed the shell.
    RemoteClosed,
    /// The transport failed mid-stream.
    TransportError(String),
}

impl ManagerInner {
    #[allow(clippy::too_many_arguments)]
    fn spawn_pump(
        inner: &Arc<Self>,
        id: String,
        shell: EstablishedShell,
        event_tx: broadcast::Sender<ConnectionEvent>,
        last_activity: Arc<StdMutex<Instant>>,
        input_rx: mpsc::Receiver<Vec<u8>>,
        resize_rx: watch::Receiver<(u16, u16)>,
        shutdown_rx: watch::Receiver<bool>,
    ) {
        let inner = Arc::clone(inner);
        tokio::spawn(async move {
            let EstablishedShell { handle, channel } = shell;
            let exit = Self::pump(
                channel,
                &event_tx,
                &last_activity,
                input_rx,
                resize_rx,
                shutdown_rx,
            )
            .await;

            let _ = handle
                .disconnect(russh::Disconnect::ByApplication, "session closed", "en")
                .await;

            match exit {
                PumpExit::Shutdown => {}
                PumpExit::RemoteClosed => Self::after_channel_exit(&inner, &id, None).await,
                PumpExit::TransportError(message) => {
                    Self::after_channel_exit(&inner, &id, Some(message)).await;
                }
            }
        });
    }

    /// Drive one shell channel: remote output fans out on the event
    /// channel, input writes are serialized through the mpsc queue, and
    /// resize updates become window-change requests.
    async fn pump(
        mut channel: russh::Channel<russh::client::Msg>,
        event_tx: &broadcast::Sender<ConnectionEvent>,
        last_activity: &Arc<StdMutex<Instant>>,
        mut input_rx: mpsc::Receiver<Vec<u8>>,
        mut resize_rx: watch::Receiver<(u16, u16)>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) -> PumpExit {
        let touch = || {
            if let Ok(mut guard) = last_activity.lock() {
                *guard = Instant::now();
            }
        };

        loop {
            tokio::select! {
                msg = channel.wait() => match msg {
                    Some(ChannelMsg::Data { data }) => {
                        touch();
                        let _ = event_tx.send(ConnectionEvent::Data(data.to_vec()));
                    }
                    Some(ChannelMsg::ExtendedData { data, .. }) => {
                        // stderr from the PTY; forwarded like regular output
                        touch();
                        let _ = event_tx.send(ConnectionEvent::Data(data.to_vec()));
                    }
                    Some(ChannelMsg::ExitStatus { exit_status }) => {
                        debug!(exit_status, "Shell process exited");
                    }
                    Some(ChannelMsg::Eof | ChannelMsg::Close) | None => {
                        return PumpExit::RemoteClosed;
                    }
                    Some(_) => {}
                },
                maybe_bytes = input_rx.recv() => match maybe_bytes {
                    Some(bytes) => {
                        touch();
                        if channel.data(&bytes[..]).await.is_err() {
                            return PumpExit::TransportError("write to shell failed".into());
                        }
                    }
                    None => {
                        // all senders dropped: the record is gone
                        let _ = channel.eof().await;
                        return PumpExit::Shutdown;
                    }
                },
                changed = resize_rx.changed() => match changed {
                    Ok(()) => {
                        let (cols, rows) = *resize_rx.borrow();
                        if channel
                            .window_change(u32::from(cols), u32::from(rows), 0, 0)
                            .await
                            .is_err()
                        {
                            return PumpExit::TransportError("window change failed".into());
                        }
                    }
                    // sender gone means the record was dropped
                    Err(_) => {
                        let _ = channel.eof().await;
                        return PumpExit::Shutdown;
                    }
                },
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        let _ = channel.eof().await;
                        let _ = channel.close().await;
                        return PumpExit::Shutdown;
                    }
                }
            }
        }
    }

    /// One-shot reconnect path after a remote close or transport error.
    async fn after_channel_exit(inner: &Arc<Self>, id: &str, error: Option<String>) {
        {
            let mut connections = inner.connections.write().await;
            let Some(entry) = connections.get_mut(id) else {
                // deliberately closed while the exit was in flight
                return;
            };
            if entry.status != ConnectionStatus::Connected {
                return;
            }
            match &error {
                None => entry.emit_status(ConnectionStatus::Disconnected, None),
                Some(message) => {
                    entry.emit_status(ConnectionStatus::Error, Some(message.clone()));
                }
            }
            entry.status = ConnectionStatus::Reconnecting;
            entry.emit_status(ConnectionStatus::Reconnecting, None);
            warn!(connection_id = %id, error = ?error, "Shell lost, scheduling reconnect");
        }

        tokio::time::sleep(inner.config.reconnect_delay).await;

        // the connection may have been closed during the wait
        let (params, cols, rows) = {
            let connections = inner.connections.read().await;
            let Some(entry) = connections.get(id) else {
                return;
            };
            if entry.status != ConnectionStatus::Reconnecting {
                return;
            }
            (entry.params.clone(), entry.cols, entry.rows)
        };

        let dial = connection::establish(
            &params,
            cols,
            rows,
            inner.config.dial_timeout,
            inner.config.keepalive_interval,
        )
        .await;

        let mut connections = inner.connections.write().await;
        let Some(entry) = connections.get_mut(id) else {
            drop(connections);
            if let Ok(shell) = dial {
                shell.disconnect().await;
            }
            return;
        };

        match dial {
            Ok(shell) => {
                let (input_tx, input_rx) = mpsc::channel(INPUT_CHANNEL_CAPACITY);
                let (resize_tx, resize_rx) = watch::channel((entry.cols, entry.rows));
                let (shutdown_tx, shutdown_rx) = watch::channel(false);
                entry.input_tx = input_tx;
                entry.resize_tx = resize_tx;
                entry.shutdown_tx = shutdown_tx;
                entry.status = ConnectionStatus::Connected;
                entry.touch();
                entry.emit_status(ConnectionStatus::Connected, None);
                info!(connection_id = %id, "Reconnected");
                Self::spawn_pump(
                    inner,
                    id.to_string(),
                    shell,
                    entry.event_tx.clone(),
                    Arc::clone(&entry.last_activity),
                    input_rx,
                    resize_rx,
                    shutdown_rx,
                );
            }
            Err(err) => {
                entry.status = ConnectionStatus::Error;
                entry.emit_status(ConnectionStatus::Error, Some(err.to_string()));
                warn!(connection_id = %id, error = %err, "Reconnect failed");
            }
        }
    }

    /// Close every connection whose last activity is older than the idle
    /// timeout.
    async fn sweep_idle(inner: &Arc<Self>) {
        let expired: Vec<String> = {
            let connections = inner.connections.read().await;
            connections
                .iter()
                .filter(|(_, entry)| {
                    entry
                        .last_activity
                        .lock()
                        .map(|at| at.elapsed() >= inner.config.idle_timeout)
                        .unwrap_or(false)
                })
                .map(|(id, _)| id.clone())
                .collect()
        };

        for id in expired {
            info!(connection_id = %id, "Reaping idle connection");
            let removed = {
                let mut connections = inner.connections.write().await;
                connections.remove(&id)
            };
            if let Some(entry) = removed {
                let _ = entry.shutdown_tx.send(true);
                entry.emit_status(ConnectionStatus::Disconnected, None);
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::ssh::types::SshCredential;

    fn unreachable_params() -> ConnectParams {
        ConnectParams {
            host: "127.0.0.1".into(),
            // nothing listens on the discard port in the test environment
            port: 9,
            username: "nobody".into(),
            credential: SshCredential::Password("wrong".into()),
            cols: 80,
            rows: 24,
        }
    }

    #[tokio::test]
    async fn failed_dial_drops_the_record() {
        let manager = ConnectionManager::new(ManagerConfig {
            dial_timeout: Duration::from_secs(2),
            ..ManagerConfig::default()
        });

        let result = manager.create_connection("u1", unreachable_params()).await;
        assert!(result.is_err());
        assert_eq!(manager.connection_count().await, 0);
    }

    #[tokio::test]
    async fn send_input_to_unknown_connection_is_not_found() {
        let manager = ConnectionManager::with_defaults();
        let err = manager.send_input("missing", b"ls\n".to_vec()).await;
        assert!(matches!(err, Err(ConnectionError::NotFound(_))));
    }

    #[tokio::test]
    async fn resize_unknown_connection_is_not_found() {
        let manager = ConnectionManager::with_defaults();
        let err = manager.resize("missing", 120, 40).await;
        assert!(matches!(err, Err(ConnectionError::NotFound(_))));
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let manager = ConnectionManager::with_defaults();
        manager.close_connection("missing").await;
        manager.close_connection("missing").await;
        assert_eq!(manager.connection_count().await, 0);
    }

    #[test]
    fn default_config_matches_policy() {
        let config = ManagerConfig::default();
        assert_eq!(config.dial_timeout, Duration::from_secs(30));
        assert_eq!(config.keepalive_interval, Duration::from_secs(60));
        assert_eq!(config.reconnect_delay, Duration::from_secs(5));
        assert_eq!(config.idle_timeout, Duration::from_secs(1800));
        assert_eq!(config.sweep_interval, Duration::from_secs(60));
    }
}
