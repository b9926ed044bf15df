//! Identity and token service: password hashing, bearer tokens and the
//! per-source rate limiter that front-ends the HTTP surface.

pub mod claims;
pub mod jwt;
pub mod password;
pub mod rate_limit;

pub use claims::Claims;
pub use jwt::TokenService;
pub use rate_limit::{RateLimitDecision, RateLimiter};

use thiserror::Error;

/// Authentication failures. `InvalidCredentials` deliberately does not say
/// which of email/password was wrong.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("Token issuance failed: {0}")]
    TokenIssue(String),

    #[error("Password hashing failed: {0}")]
    Hashing(String),
}
