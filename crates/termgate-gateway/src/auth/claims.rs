//! Bearer token claims.

use serde::{Deserialize, Serialize};

/// Self-contained claims embedded in every bearer token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Owning user ID.
    pub sub: String,
    /// User email at issue time.
    pub email: String,
    /// Issued-at (Unix seconds).
    pub iat: i64,
    /// Expiry (Unix seconds).
    pub exp: i64,
}
