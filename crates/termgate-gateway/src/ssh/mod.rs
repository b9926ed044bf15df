//! SSH connection management: the pool of live connections, the per-
//! connection pump task, the reconnect state machine and the idle sweeper.

mod connection;
mod manager;
mod types;

pub use manager::{ConnectionManager, ManagerConfig};
pub use types::{
    ConnectParams, ConnectionError, ConnectionEvent, ConnectionStatus, DEFAULT_COLS, DEFAULT_ROWS,
    SshCredential,
};
