//! termgate gateway server binary.

use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use termgate_core::config::GatewayConfig;
use termgate_core::tracing_init::init_tracing;
use termgate_crypto::CredentialVault;
use tracing::info;

use termgate_gateway::assistant::{AssistantBridge, Provider};
use termgate_gateway::auth::{RateLimiter, TokenService};
use termgate_gateway::profiles::ProfileStore;
use termgate_gateway::server::{AppState, build_router};
use termgate_gateway::ssh::ConnectionManager;
use termgate_gateway::storage::GatewayDatabase;

#[derive(Parser, Debug)]
#[command(name = "termgate-gateway")]
#[command(version, about = "SSH web gateway - session broker and assistant bridge")]
struct Args {
    /// Port to listen on (overrides PORT).
    #[arg(long)]
    port: Option<u16>,

    /// Path to the SQLite database file (overrides DATABASE_URL).
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Emit JSON log lines.
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing("termgate=info", args.log_json);

    let mut config = GatewayConfig::from_env()?;
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(db_path) = args.db_path {
        config.database_path = db_path;
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        port = config.server.port,
        "Starting termgate-gateway"
    );

    let db = GatewayDatabase::open(&config.database_path).await?;
    let vault = Arc::new(CredentialVault::new(
        config.auth.credential_key.as_bytes(),
    )?);
    let tokens = Arc::new(TokenService::new(
        config.auth.token_secret.as_bytes(),
        config.auth.token_ttl_secs,
    ));
    let profiles = ProfileStore::new(db.clone(), vault);

    let manager = ConnectionManager::with_defaults();
    let _sweeper = manager.spawn_idle_sweeper();

    let assistant = match Provider::from_config(&config.assistant) {
        Some(provider) => {
            info!(provider = provider.name(), "Assistant bridge enabled");
            Some(Arc::new(AssistantBridge::new(provider, db.clone())))
        }
        None => {
            info!("Assistant bridge disabled (no provider credentials)");
            None
        }
    };

    let global_limiter = Arc::new(RateLimiter::new(
        config.auth.rate_limit_max_requests,
        config.auth.rate_limit_window,
    ));
    let auth_limiter = Arc::new(RateLimiter::with_block(
        config.auth.auth_rate_limit_max_attempts,
        config.auth.rate_limit_window,
        config.auth.rate_limit_window,
    ));

    let state = AppState {
        db,
        tokens,
        profiles,
        manager,
        assistant,
        global_limiter,
        auth_limiter,
        started_at: Instant::now(),
    };

    let app = build_router(state, config.server.cors_origin.as_deref());

    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, config.server.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %addr, "Gateway listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        let _ = tokio::signal::ctrl_c().await;
        info!("Received shutdown signal");
    })
    .await?;

    info!("Gateway stopped");
    Ok(())
}
