//! Input validation for registration and SSH profile fields.
//!
//! Each check returns `Err(Error::Validation(..))` with a message that is
//! safe to surface to the client verbatim.

use std::net::Ipv4Addr;

use crate::error::{Error, Result};

/// Maximum length accepted for free-form name fields.
const MAX_NAME_LEN: usize = 128;

/// Validate an email address: exactly one `@`, a non-empty local part and
/// a dotted, non-empty domain. Lookups elsewhere are case-insensitive.
pub fn email(value: &str) -> Result<()> {
    let mut parts = value.splitn(2, '@');
    let local = parts.next().unwrap_or_default();
    let domain = parts.next().unwrap_or_default();

    let domain_ok = !domain.is_empty()
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && domain.chars().all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-');

    if local.is_empty() || local.contains(char::is_whitespace) || !domain_ok {
        return Err(Error::Validation("email is not a valid address".into()));
    }
    Ok(())
}

/// Validate password strength: at least 8 characters with one uppercase,
/// one lowercase and one digit.
pub fn password_strength(value: &str) -> Result<()> {
    let long_enough = value.chars().count() >= 8;
    let has_upper = value.chars().any(|c| c.is_ascii_uppercase());
    let has_lower = value.chars().any(|c| c.is_ascii_lowercase());
    let has_digit = value.chars().any(|c| c.is_ascii_digit());

    if long_enough && has_upper && has_lower && has_digit {
        Ok(())
    } else {
        Err(Error::Validation(
            "password must be at least 8 characters with an uppercase letter, \
             a lowercase letter and a digit"
                .into(),
        ))
    }
}

/// Validate a display name: non-empty after trimming, bounded length.
pub fn display_name(value: &str) -> Result<()> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(Error::Validation("name must not be empty".into()));
    }
    if trimmed.len() > MAX_NAME_LEN {
        return Err(Error::Validation("name is too long".into()));
    }
    Ok(())
}

/// Validate an SSH target host: an IPv4 literal or a DNS name.
pub fn host(value: &str) -> Result<()> {
    if value.parse::<Ipv4Addr>().is_ok() {
        return Ok(());
    }
    if is_dns_name(value) {
        return Ok(());
    }
    Err(Error::Validation(
        "host must be a DNS name or an IPv4 address".into(),
    ))
}

/// Validate an SSH port: non-zero (the u16 type bounds the upper end).
pub fn port(value: u16) -> Result<()> {
    if value == 0 {
        return Err(Error::Validation("port must be between 1 and 65535".into()));
    }
    Ok(())
}

/// Validate a remote username: non-empty, no whitespace.
pub fn remote_username(value: &str) -> Result<()> {
    if value.is_empty() || value.contains(char::is_whitespace) {
        return Err(Error::Validation("username must not be empty".into()));
    }
    Ok(())
}

fn is_dns_name(value: &str) -> bool {
    if value.is_empty() || value.len() > 253 {
        return false;
    }
    value.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    })
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_email() {
        assert!(email("a@b.co").is_ok());
        assert!(email("user.name@example.com").is_ok());
    }

    #[test]
    fn rejects_malformed_email() {
        assert!(email("").is_err());
        assert!(email("nobody").is_err());
        assert!(email("@example.com").is_err());
        assert!(email("a@b").is_err());
        assert!(email("a b@example.com").is_err());
        assert!(email("a@.com").is_err());
    }

    #[test]
    fn password_strength_requires_all_classes() {
        assert!(password_strength("Abcdef12").is_ok());
        // all lowercase
        assert!(password_strength("abcdefgh").is_err());
        // too short
        assert!(password_strength("Ab1").is_err());
        // no digit
        assert!(password_strength("Abcdefgh").is_err());
        // no uppercase
        assert!(password_strength("abcdefg1").is_err());
    }

    #[test]
    fn host_accepts_ipv4_and_dns() {
        assert!(host("10.0.0.1").is_ok());
        assert!(host("example.com").is_ok());
        assert!(host("bastion").is_ok());
        assert!(host("my-host.internal.example.com").is_ok());
    }

    #[test]
    fn host_rejects_garbage() {
        assert!(host("").is_err());
        assert!(host("-leading.example.com").is_err());
        assert!(host("spaces in host").is_err());
        assert!(host("exa_mple.com").is_err());
    }

    #[test]
    fn port_zero_is_rejected() {
        assert!(port(0).is_err());
        assert!(port(1).is_ok());
        assert!(port(65535).is_ok());
    }

    #[test]
    fn display_name_must_be_non_empty() {
        assert!(display_name("p1").is_ok());
        assert!(display_name("  ").is_err());
        assert!(display_name(&"x".repeat(200)).is_err());
    }

    #[test]
    fn remote_username_rejects_whitespace() {
        assert!(remote_username("deploy").is_ok());
        assert!(remote_username("").is_err());
        assert!(remote_username("a b").is_err());
    }
}
