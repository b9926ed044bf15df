//! Establishing a single SSH shell: dial, authenticate, allocate a PTY and
//! request the shell channel. The pump loop driving the channel lives in
//! the manager.

use std::sync::Arc;
use std::time::Duration;

use russh::client::{self, AuthResult, Handle, Msg};
use russh::keys::{HashAlg, PrivateKeyWithHashAlg, decode_secret_key};
use russh::{Channel, Disconnect};
use tracing::debug;

use super::types::{ConnectParams, ConnectionError, SshCredential};

/// Terminal type requested for every shell.
const TERM: &str = "xterm-256color";

/// A live SSH shell: the client handle plus the PTY channel.
pub(crate) struct EstablishedShell {
    pub handle: Handle<GatewayClientHandler>,
    pub channel: Channel<Msg>,
}

impl EstablishedShell {
    /// Best-effort transport teardown.
    pub async fn disconnect(&self) {
        let _ = self
            .handle
            .disconnect(Disconnect::ByApplication, "session closed", "en")
            .await;
    }
}

/// russh client handler. Profiles carry no pinned host key, so the server
/// key is accepted and its fingerprint logged for the record.
#[derive(Debug)]
pub(crate) struct GatewayClientHandler {
    host: String,
}

impl client::Handler for GatewayClientHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &russh::keys::PublicKey,
    ) -> Result<bool, Self::Error> {
        debug!(
            host = %self.host,
            fingerprint = %server_public_key.fingerprint(HashAlg::Sha256),
            "Accepting server host key"
        );
        Ok(true)
    }
}

/// Dial the target, authenticate and open a shell with a PTY at the given
/// dimensions. The whole sequence is bounded by `dial_timeout`.
pub(crate) async fn establish(
    params: &ConnectParams,
    cols: u16,
    rows: u16,
    dial_timeout: Duration,
    keepalive: Duration,
) -> Result<EstablishedShell, ConnectionError> {
    tokio::time::timeout(dial_timeout, establish_inner(params, cols, rows, keepalive))
        .await
        .map_err(|_| ConnectionError::Timeout)?
}

async fn establish_inner(
    params: &ConnectParams,
    cols: u16,
    rows: u16,
    keepalive: Duration,
) -> Result<EstablishedShell, ConnectionError> {
    let config = Arc::new(client::Config {
        keepalive_interval: Some(keepalive),
        keepalive_max: 3,
        nodelay: true,
        ..Default::default()
    });

    let handler = GatewayClientHandler {
        host: params.host.clone(),
    };

    let mut handle = client::connect(config, (params.host.as_str(), params.port), handler)
        .await
        .map_err(|e| ConnectionError::Dial(e.to_string()))?;

    let auth_result = match &params.credential {
        SshCredential::Password(password) => handle
            .authenticate_password(params.username.clone(), password.clone())
            .await
            .map_err(|e| ConnectionError::Auth(e.to_string()))?,
        SshCredential::PrivateKey { key, passphrase } => {
            let key = decode_secret_key(key, passphrase.as_deref())
                .map_err(|e| ConnectionError::Auth(e.to_string()))?;
            let key = PrivateKeyWithHashAlg::new(Arc::new(key), None);
            handle
                .authenticate_publickey(params.username.clone(), key)
                .await
                .map_err(|e| ConnectionError::Auth(e.to_string()))?
        }
    };

    match auth_result {
        AuthResult::Success => {}
        AuthResult::Failure { .. } => {
            return Err(ConnectionError::Auth("authentication rejected".into()));
        }
    }

    let channel = handle
        .channel_open_session()
        .await
        .map_err(|e| ConnectionError::Channel(e.to_string()))?;

    channel
        .request_pty(false, TERM, u32::from(cols), u32::from(rows), 0, 0, &[])
        .await
        .map_err(|e| ConnectionError::Channel(e.to_string()))?;

    channel
        .request_shell(false)
        .await
        .map_err(|e| ConnectionError::Channel(e.to_string()))?;

    debug!(
        host = %params.host,
        port = params.port,
        username = %params.username,
        cols,
        rows,
        "Shell established"
    );

    Ok(EstablishedShell { handle, channel })
}
