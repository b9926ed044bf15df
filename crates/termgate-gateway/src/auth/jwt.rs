//! Bearer token issuance and verification.
//!
//! Tokens are stateless HS256 JWTs signed with the process secret; there
//! is no server-side revocation list.

use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};

use super::AuthError;
use super::claims::Claims;

/// Issues and verifies bearer tokens.
#[derive(Clone)]
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl_secs: i64,
}

/// A freshly minted token with its expiry.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    /// Expiry as a Unix timestamp.
    pub expires_at: i64,
}

impl TokenService {
    /// Create a token service with the given signing secret and lifetime.
    pub fn new(secret: &[u8], ttl_secs: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            ttl_secs,
        }
    }

    /// Issue a bearer token for the given user.
    pub fn issue(&self, user_id: &str, email: &str) -> Result<IssuedToken, AuthError> {
        let now = now_secs();
        let exp = now + self.ttl_secs;

        let claims = Claims {
            sub: user_id.to_string(),
            email: email.to_string(),
            iat: now,
            exp,
        };

        let token = jsonwebtoken::encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| AuthError::TokenIssue(e.to_string()))?;

        Ok(IssuedToken {
            token,
            expires_at: exp,
        })
    }

    /// Verify a token and return its claims. Expired or tampered tokens
    /// fail uniformly with `InvalidToken`.
    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        let data = jsonwebtoken::decode::<Claims>(token, &self.decoding_key, &Validation::default())
            .map_err(|_| AuthError::InvalidToken)?;
        Ok(data.claims)
    }
}

#[allow(clippy::cast_possible_wrap)]
fn now_secs() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}
