//! Signed session cookie codec.
//!
//! The session travels as an HS256 JWT. Provider tokens inside the claims
//! are encrypted with the same cipher used for stored refresh tokens, so the
//! cookie never carries them in the clear.

use chrono::{DateTime, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use super::AuthError;
use super::crypto::TokenCipher;
use super::roles::RoleSet;
use super::session::{SessionError, SessionToken};

/// JWT claims embedded in the session cookie.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Subject: user ID (standard JWT `sub` claim).
    pub sub: String,
    /// Encrypted provider access token.
    pub at: String,
    /// Access token expiry (unix timestamp).
    pub at_exp: i64,
    /// Encrypted provider refresh token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rt: Option<String>,
    pub roles: RoleSet,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<SessionError>,
    /// Cookie expiry (unix timestamp).
    pub exp: i64,
    /// Issued at (unix timestamp).
    pub iat: i64,
}

/// Encodes and decodes `SessionToken`s as signed cookies.
#[derive(Clone)]
pub struct SessionCodec {
    secret: Vec<u8>,
    cipher: TokenCipher,
    /// Lifetime of the cookie itself, seconds.
    lifetime_secs: i64,
}

impl SessionCodec {
    pub fn new(secret: &[u8], cipher: TokenCipher, lifetime_secs: i64) -> Result<Self, AuthError> {
        if secret.is_empty() {
            return Err(AuthError::Config("session secret is empty".into()));
        }
        Ok(Self {
            secret: secret.to_vec(),
            cipher,
            lifetime_secs,
        })
    }

    pub fn lifetime_secs(&self) -> i64 {
        self.lifetime_secs
    }

    /// Sign `session` into a JWT.
    pub fn encode(&self, session: &SessionToken, now: DateTime<Utc>) -> Result<String, AuthError> {
        let claims = SessionClaims {
            sub: session.user_id.clone(),
            at: self.cipher.encrypt(&session.access_token)?,
            at_exp: session.expires_at,
            rt: session
                .refresh_token
                .as_deref()
                .map(|t| self.cipher.encrypt(t))
                .transpose()?,
            roles: session.roles.clone(),
            error: session.error,
            exp: now.timestamp() + self.lifetime_secs,
            iat: now.timestamp(),
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(&self.secret),
        )
        .map_err(|e| AuthError::TokenError(format!("jwt encode: {e}")))
    }

    /// Verify and open a session cookie.
    pub fn decode(&self, token: &str) -> Result<SessionToken, AuthError> {
        let key = DecodingKey::from_secret(&self.secret);
        let mut validation = Validation::default();
        validation.validate_exp = true;
        let claims = decode::<SessionClaims>(token, &key, &validation)
            .map_err(|e| AuthError::TokenError(format!("jwt decode: {e}")))?
            .claims;

        Ok(SessionToken {
            user_id: claims.sub,
            access_token: self.cipher.decrypt(&claims.at)?,
            expires_at: claims.at_exp,
            refresh_token: claims.rt.map(|rt| self.cipher.decrypt(&rt)).transpose()?,
            roles: claims.roles,
            error: claims.error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::config::EncryptionKey;
    use crate::auth::roles::Role;

    fn codec(secret: &str) -> SessionCodec {
        let cipher = TokenCipher::new(EncryptionKey::from_hex(&"11".repeat(32)).unwrap());
        SessionCodec::new(secret.as_bytes(), cipher, 3600).unwrap()
    }

    fn session() -> SessionToken {
        SessionToken {
            user_id: "123".into(),
            access_token: "access-abc".into(),
            expires_at: 1_900_000_000,
            refresh_token: Some("refresh-xyz".into()),
            roles: RoleSet::from([Role::Member, Role::Seal]),
            error: None,
        }
    }

    #[test]
    fn encode_then_decode_restores_session() {
        let c = codec("test-secret");
        let s = session();
        let jwt = c.encode(&s, Utc::now()).unwrap();
        assert_eq!(c.decode(&jwt).unwrap(), s);
    }

    #[test]
    fn cookie_does_not_carry_plain_provider_tokens() {
        let c = codec("test-secret");
        let jwt = c.encode(&session(), Utc::now()).unwrap();
        let claims = decode::<SessionClaims>(
            &jwt,
            &DecodingKey::from_secret(b"test-secret"),
            &Validation::default(),
        )
        .unwrap()
        .claims;
        assert_ne!(claims.at, "access-abc");
        assert_ne!(claims.rt.as_deref(), Some("refresh-xyz"));
    }

    #[test]
    fn errored_flag_survives_round_trip() {
        let c = codec("test-secret");
        let mut s = session();
        s.error = Some(SessionError::RefreshAccessTokenError);
        let jwt = c.encode(&s, Utc::now()).unwrap();
        assert_eq!(
            c.decode(&jwt).unwrap().error,
            Some(SessionError::RefreshAccessTokenError)
        );
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let jwt = codec("secret-a").encode(&session(), Utc::now()).unwrap();
        assert!(matches!(codec("secret-b").decode(&jwt), Err(AuthError::TokenError(_))));
    }

    #[test]
    fn expired_cookie_is_rejected() {
        let c = codec("test-secret");
        let long_ago = Utc::now() - chrono::Duration::days(2);
        let jwt = c.encode(&session(), long_ago).unwrap();
        assert!(matches!(c.decode(&jwt), Err(AuthError::TokenError(_))));
    }

    #[test]
    fn empty_secret_is_a_config_error() {
        let cipher = TokenCipher::new(EncryptionKey::from_hex(&"11".repeat(32)).unwrap());
        assert!(matches!(SessionCodec::new(b"", cipher, 60), Err(AuthError::Config(_))));
    }
}
