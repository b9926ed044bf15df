//! Configuration resolution for the gateway.
//!
//! Settings come from environment variables with built-in defaults; the
//! binary's CLI flags override individual fields on top. Secrets are never
//! given defaults: `JWT_SECRET` must be present for the process to start.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};

const DEFAULT_PORT: u16 = 5000;
const DEFAULT_RATE_LIMIT_MAX_REQUESTS: u32 = 100;
const DEFAULT_RATE_LIMIT_WINDOW_MS: u64 = 15 * 60 * 1000;
const DEFAULT_AUTH_RATE_LIMIT_MAX_ATTEMPTS: u32 = 5;
const DEFAULT_TOKEN_TTL_SECS: i64 = 7 * 24 * 60 * 60;
const DATABASE_FILE_NAME: &str = "termgate.sqlite";
const APP_DIR_NAME: &str = "termgate";

/// Complete gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub assistant: AssistantConfig,
    /// SQLite database file path.
    pub database_path: PathBuf,
}

/// Listener and CORS settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    /// Allowed browser origin; `None` means permissive CORS.
    pub cors_origin: Option<String>,
}

/// Token signing, credential encryption and rate limiting.
#[derive(Clone)]
pub struct AuthConfig {
    /// HS256 signing secret for bearer tokens.
    pub token_secret: String,
    /// Vault secret for credentials at rest. Defaults to `token_secret`
    /// when `CREDENTIAL_KEY` is not set.
    pub credential_key: String,
    /// Bearer token lifetime in seconds.
    pub token_ttl_secs: i64,
    /// Global bucket: admitted requests per window.
    pub rate_limit_max_requests: u32,
    /// Shared window for both buckets.
    pub rate_limit_window: Duration,
    /// Auth bucket: admitted attempts per window before the block kicks in.
    pub auth_rate_limit_max_attempts: u32,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("token_secret", &"[REDACTED]")
            .field("credential_key", &"[REDACTED]")
            .field("token_ttl_secs", &self.token_ttl_secs)
            .field("rate_limit_max_requests", &self.rate_limit_max_requests)
            .field("rate_limit_window", &self.rate_limit_window)
            .field(
                "auth_rate_limit_max_attempts",
                &self.auth_rate_limit_max_attempts,
            )
            .finish()
    }
}

/// Text-generation provider credentials. At least one key is required for
/// assistant features; with neither set the bridge is disabled.
#[derive(Clone, Default)]
pub struct AssistantConfig {
    pub openai_api_key: Option<String>,
    pub anthropic_api_key: Option<String>,
}

impl std::fmt::Debug for AssistantConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssistantConfig")
            .field("openai_api_key", &self.openai_api_key.as_ref().map(|_| "[REDACTED]"))
            .field(
                "anthropic_api_key",
                &self.anthropic_api_key.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

impl GatewayConfig {
    /// Resolve the configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        let token_secret = require_env("JWT_SECRET")?;
        let credential_key =
            optional_env("CREDENTIAL_KEY").unwrap_or_else(|| token_secret.clone());

        let port = match optional_env("PORT") {
            Some(raw) => raw
                .parse::<u16>()
                .ok()
                .filter(|p| *p != 0)
                .ok_or_else(|| Error::Config(format!("PORT is not a valid port: {raw}")))?,
            None => DEFAULT_PORT,
        };

        let rate_limit_max_requests =
            parse_env_or("RATE_LIMIT_MAX_REQUESTS", DEFAULT_RATE_LIMIT_MAX_REQUESTS)?;
        let rate_limit_window_ms =
            parse_env_or("RATE_LIMIT_WINDOW_MS", DEFAULT_RATE_LIMIT_WINDOW_MS)?;

        let database_path = match optional_env("DATABASE_URL") {
            Some(url) => PathBuf::from(url.trim_start_matches("sqlite:").to_string()),
            None => default_database_path()?,
        };

        Ok(Self {
            server: ServerConfig {
                port,
                cors_origin: optional_env("CORS_ORIGIN"),
            },
            auth: AuthConfig {
                token_secret,
                credential_key,
                token_ttl_secs: DEFAULT_TOKEN_TTL_SECS,
                rate_limit_max_requests,
                rate_limit_window: Duration::from_millis(rate_limit_window_ms),
                auth_rate_limit_max_attempts: DEFAULT_AUTH_RATE_LIMIT_MAX_ATTEMPTS,
            },
            assistant: AssistantConfig {
                openai_api_key: optional_env("OPENAI_API_KEY"),
                anthropic_api_key: optional_env("ANTHROPIC_API_KEY"),
            },
            database_path,
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    optional_env(key).ok_or_else(|| Error::Config(format!("{key} must be set")))
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn parse_env_or<T: std::str::FromStr>(key: &str, default: T) -> Result<T> {
    match optional_env(key) {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|_| Error::Config(format!("{key} is not a valid number: {raw}"))),
        None => Ok(default),
    }
}

fn default_database_path() -> Result<PathBuf> {
    let base = dirs::data_dir()
        .ok_or_else(|| Error::Config("cannot determine data directory".into()))?;
    Ok(base.join(APP_DIR_NAME).join(DATABASE_FILE_NAME))
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn auth_config_debug_is_redacted() {
        let cfg = AuthConfig {
            token_secret: "super-secret".into(),
            credential_key: "other-secret".into(),
            token_ttl_secs: DEFAULT_TOKEN_TTL_SECS,
            rate_limit_max_requests: DEFAULT_RATE_LIMIT_MAX_REQUESTS,
            rate_limit_window: Duration::from_millis(DEFAULT_RATE_LIMIT_WINDOW_MS),
            auth_rate_limit_max_attempts: DEFAULT_AUTH_RATE_LIMIT_MAX_ATTEMPTS,
        };
        let debug = format!("{cfg:?}");
        assert!(!debug.contains("super-secret"));
        assert!(!debug.contains("other-secret"));
        assert!(debug.contains("REDACTED"));
    }

    #[test]
    fn assistant_config_debug_is_redacted() {
        let cfg = AssistantConfig {
            openai_api_key: Some("sk-abc".into()),
            anthropic_api_key: None,
        };
        let debug = format!("{cfg:?}");
        assert!(!debug.contains("sk-abc"));
    }
}
