//! Explicit configuration for the auth core.
//!
//! Built once at startup and injected into the token store, the identity
//! provider and the session manager. Nothing in this crate reads the
//! process environment.

use std::fmt;
use std::time::Duration;

use super::AuthError;

/// AES-256 key size (32 bytes).
pub const KEY_SIZE: usize = 32;

/// Default lifetime assumed for an access token when the provider omits `expires_in`.
pub const DEFAULT_ACCESS_TOKEN_TTL_SECS: i64 = 3600;

/// Default lifetime of a stored refresh token when the provider gives none (7 days).
pub const DEFAULT_REFRESH_TOKEN_TTL_SECS: i64 = 7 * 24 * 3600;

/// Longest token lifetime accepted from the provider or configuration (one year).
pub const MAX_TOKEN_TTL_SECS: i64 = 365 * 24 * 3600;

/// Accept `ttl` only if it is positive and at most `MAX_TOKEN_TTL_SECS`.
pub fn check_ttl(ttl: i64) -> Result<i64, AuthError> {
    if (1..=MAX_TOKEN_TTL_SECS).contains(&ttl) {
        Ok(ttl)
    } else {
        Err(AuthError::InvalidExpiry(format!(
            "{ttl}s is outside 1..={MAX_TOKEN_TTL_SECS}s"
        )))
    }
}

/// Default Discord endpoints.
pub const DISCORD_AUTHORIZE_URL: &str = "https://discord.com/oauth2/authorize";
pub const DISCORD_TOKEN_URL: &str = "https://discord.com/api/oauth2/token";
pub const DISCORD_API_BASE: &str = "https://discord.com/api";

/// 32-byte symmetric key for refresh-token encryption.
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptionKey([u8; KEY_SIZE]);

impl EncryptionKey {
    /// Parse a key from exactly 64 hex characters.
    pub fn from_hex(hex_key: &str) -> Result<Self, AuthError> {
        let hex_key = hex_key.trim();
        if hex_key.is_empty() {
            return Err(AuthError::MissingOrMalformedKey("KEY is not set".into()));
        }
        if hex_key.len() != KEY_SIZE * 2 {
            return Err(AuthError::MissingOrMalformedKey(format!(
                "expected {} hex characters, got {}",
                KEY_SIZE * 2,
                hex_key.len()
            )));
        }
        let mut key = [0u8; KEY_SIZE];
        hex::decode_to_slice(hex_key, &mut key)
            .map_err(|e| AuthError::MissingOrMalformedKey(format!("not valid hex: {e}")))?;
        Ok(Self(key))
    }

    /// Parse an optional key; `None` is the same startup failure as a bad key.
    pub fn from_optional_hex(hex_key: Option<&str>) -> Result<Self, AuthError> {
        match hex_key {
            Some(k) => Self::from_hex(k),
            None => Err(AuthError::MissingOrMalformedKey("KEY is not set".into())),
        }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EncryptionKey(..)")
    }
}

/// Token lifetime defaults applied when the provider leaves them out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenPolicy {
    pub access_token_ttl_secs: i64,
    pub refresh_token_ttl_secs: i64,
}

impl TokenPolicy {
    /// Reject non-positive or oversized defaults before they reach a session.
    pub fn validated(self) -> Result<Self, AuthError> {
        check_ttl(self.access_token_ttl_secs)
            .and(check_ttl(self.refresh_token_ttl_secs))
            .map_err(|e| AuthError::Config(format!("token policy: {e}")))?;
        Ok(self)
    }
}

impl Default for TokenPolicy {
    fn default() -> Self {
        Self {
            access_token_ttl_secs: DEFAULT_ACCESS_TOKEN_TTL_SECS,
            refresh_token_ttl_secs: DEFAULT_REFRESH_TOKEN_TTL_SECS,
        }
    }
}

/// Identity provider (Discord OAuth2 application) settings.
#[derive(Clone)]
pub struct ProviderConfig {
    pub client_id: String,
    pub client_secret: String,
    /// Where the provider sends the browser back after consent.
    pub redirect_uri: String,
    pub authorize_url: String,
    pub token_url: String,
    pub api_base: String,
    pub request_timeout: Duration,
}

impl ProviderConfig {
    /// Discord settings with the public endpoints filled in.
    pub fn discord(client_id: &str, client_secret: &str, redirect_uri: &str) -> Result<Self, AuthError> {
        if client_id.trim().is_empty() {
            return Err(AuthError::Config("DISCORD_CLIENT_ID is not set".into()));
        }
        if client_secret.trim().is_empty() {
            return Err(AuthError::Config("DISCORD_CLIENT_SECRET is not set".into()));
        }
        Ok(Self {
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            redirect_uri: redirect_uri.to_string(),
            authorize_url: DISCORD_AUTHORIZE_URL.to_string(),
            token_url: DISCORD_TOKEN_URL.to_string(),
            api_base: DISCORD_API_BASE.to_string(),
            request_timeout: Duration::from_secs(10),
        })
    }
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"..")
            .field("redirect_uri", &self.redirect_uri)
            .field("token_url", &self.token_url)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

/// Everything the auth core needs at construction time.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub encryption_key: EncryptionKey,
    pub provider: ProviderConfig,
    pub policy: TokenPolicy,
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY_HEX: &str = "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";

    #[test]
    fn parses_64_hex_chars() {
        let key = EncryptionKey::from_hex(KEY_HEX).unwrap();
        assert_eq!(key.as_bytes()[0], 0x00);
        assert_eq!(key.as_bytes()[31], 0x1f);
    }

    #[test]
    fn rejects_missing_key() {
        assert!(matches!(
            EncryptionKey::from_optional_hex(None),
            Err(AuthError::MissingOrMalformedKey(_))
        ));
        assert!(matches!(
            EncryptionKey::from_hex(""),
            Err(AuthError::MissingOrMalformedKey(_))
        ));
    }

    #[test]
    fn rejects_wrong_length_and_non_hex() {
        assert!(matches!(
            EncryptionKey::from_hex(&KEY_HEX[..62]),
            Err(AuthError::MissingOrMalformedKey(_))
        ));
        let bad = "zz".repeat(32);
        assert!(matches!(
            EncryptionKey::from_hex(&bad),
            Err(AuthError::MissingOrMalformedKey(_))
        ));
    }

    #[test]
    fn debug_does_not_leak_secrets() {
        let key = EncryptionKey::from_hex(KEY_HEX).unwrap();
        assert_eq!(format!("{key:?}"), "EncryptionKey(..)");
        let provider = ProviderConfig::discord("id", "shh", "http://localhost/cb").unwrap();
        assert!(!format!("{provider:?}").contains("shh"));
    }

    #[test]
    fn discord_requires_credentials() {
        assert!(ProviderConfig::discord("", "secret", "http://x").is_err());
        assert!(ProviderConfig::discord("id", " ", "http://x").is_err());
    }

    #[test]
    fn default_policy_matches_documented_values() {
        let policy = TokenPolicy::default();
        assert_eq!(policy.access_token_ttl_secs, 3600);
        assert_eq!(policy.refresh_token_ttl_secs, 604_800);
    }

    #[test]
    fn ttl_bounds() {
        assert_eq!(check_ttl(1).unwrap(), 1);
        assert_eq!(check_ttl(MAX_TOKEN_TTL_SECS).unwrap(), MAX_TOKEN_TTL_SECS);
        assert!(matches!(check_ttl(0), Err(AuthError::InvalidExpiry(_))));
        assert!(matches!(check_ttl(-100), Err(AuthError::InvalidExpiry(_))));
        assert!(matches!(check_ttl(10_i64.pow(16)), Err(AuthError::InvalidExpiry(_))));
    }

    #[test]
    fn policy_rejects_out_of_range_defaults() {
        assert!(TokenPolicy::default().validated().is_ok());
        let negative = TokenPolicy {
            access_token_ttl_secs: -1,
            ..TokenPolicy::default()
        };
        assert!(matches!(negative.validated(), Err(AuthError::Config(_))));
        let huge = TokenPolicy {
            refresh_token_ttl_secs: i64::MAX,
            ..TokenPolicy::default()
        };
        assert!(matches!(huge.validated(), Err(AuthError::Config(_))));
    }
}
