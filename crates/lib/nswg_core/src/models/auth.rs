//! Authentication domain models.
//!
//! These are internal domain models, distinct from the API response types
//! (which use camelCase field names).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::roles::RoleSet;

/// Portal user, keyed by the Discord user id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: Option<String>,
    pub avatar: Option<String>,
}

/// User together with the roles they hold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserWithRoles {
    pub user: User,
    pub roles: RoleSet,
}

/// Refresh token row as stored: ciphertext plus absolute expiry.
///
/// `encrypted_token == None && expires_at == None` marks a token revoked
/// after a failed refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRefreshToken {
    pub user_id: String,
    pub encrypted_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl StoredRefreshToken {
    /// Revocation marker for `user_id`.
    pub fn revoked(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            encrypted_token: None,
            expires_at: None,
        }
    }

    pub fn is_revoked(&self) -> bool {
        self.encrypted_token.as_deref().is_none_or(str::is_empty)
    }
}
