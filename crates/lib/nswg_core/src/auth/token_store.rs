//! Encrypted per-user refresh-token storage.
//!
//! `TokenStore` owns encryption; the `TokenRows` backends only move opaque
//! rows. A row with a NULL token and NULL expiry is the revocation marker
//! written after a failed refresh.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use sqlx::PgPool;
use tracing::debug;

use super::AuthError;
use super::crypto::TokenCipher;
use super::queries;
use crate::models::auth::StoredRefreshToken;

/// Raw row persistence for refresh tokens. Writes are last-writer-wins upserts.
#[async_trait]
pub trait TokenRows: Send + Sync {
    async fn fetch(&self, user_id: &str) -> Result<Option<StoredRefreshToken>, AuthError>;

    async fn upsert(&self, row: StoredRefreshToken) -> Result<(), AuthError>;
}

/// PostgreSQL-backed rows (`refresh_tokens` table).
pub struct PgTokenRows {
    pool: PgPool,
}

impl PgTokenRows {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TokenRows for PgTokenRows {
    async fn fetch(&self, user_id: &str) -> Result<Option<StoredRefreshToken>, AuthError> {
        queries::find_refresh_token(&self.pool, user_id).await
    }

    async fn upsert(&self, row: StoredRefreshToken) -> Result<(), AuthError> {
        queries::upsert_refresh_token(&self.pool, &row).await
    }
}

/// In-memory rows, keyed by user id.
#[derive(Default)]
pub struct MemoryTokenRows {
    rows: DashMap<String, StoredRefreshToken>,
}

impl MemoryTokenRows {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the raw row, ciphertext included.
    pub fn row(&self, user_id: &str) -> Option<StoredRefreshToken> {
        self.rows.get(user_id).map(|r| r.value().clone())
    }
}

#[async_trait]
impl TokenRows for MemoryTokenRows {
    async fn fetch(&self, user_id: &str) -> Result<Option<StoredRefreshToken>, AuthError> {
        Ok(self.row(user_id))
    }

    async fn upsert(&self, row: StoredRefreshToken) -> Result<(), AuthError> {
        self.rows.insert(row.user_id.clone(), row);
        Ok(())
    }
}

/// Encrypting front for a `TokenRows` backend.
#[derive(Clone)]
pub struct TokenStore {
    rows: Arc<dyn TokenRows>,
    cipher: TokenCipher,
}

impl TokenStore {
    pub fn new(rows: Arc<dyn TokenRows>, cipher: TokenCipher) -> Self {
        Self { rows, cipher }
    }

    /// Plaintext refresh token for `user_id`, or `None` when there is no row
    /// or the row holds the revocation marker.
    pub async fn get(&self, user_id: &str) -> Result<Option<String>, AuthError> {
        let Some(row) = self.rows.fetch(user_id).await? else {
            return Ok(None);
        };
        if row.is_revoked() {
            return Ok(None);
        }
        let encrypted = row.encrypted_token.unwrap_or_default();
        self.cipher.decrypt(&encrypted).map(Some)
    }

    /// Store (`Some`) or revoke (`None`) the refresh token for `user_id`.
    pub async fn put(
        &self,
        user_id: &str,
        refresh_token: Option<&str>,
        ttl_secs: Option<i64>,
    ) -> Result<(), AuthError> {
        self.put_at(user_id, refresh_token, ttl_secs, Utc::now()).await
    }

    pub(crate) async fn put_at(
        &self,
        user_id: &str,
        refresh_token: Option<&str>,
        ttl_secs: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<(), AuthError> {
        let row = match refresh_token {
            Some(token) => StoredRefreshToken {
                user_id: user_id.to_string(),
                encrypted_token: Some(self.cipher.encrypt(token)?),
                expires_at: ttl_secs.map(|ttl| expiry_after(now, ttl)).transpose()?,
            },
            None => StoredRefreshToken::revoked(user_id),
        };
        debug!(user_id, revoked = refresh_token.is_none(), "writing refresh token row");
        self.rows.upsert(row).await
    }
}

/// `now + ttl`, refusing lifetimes chrono cannot represent.
fn expiry_after(now: DateTime<Utc>, ttl_secs: i64) -> Result<DateTime<Utc>, AuthError> {
    TimeDelta::try_seconds(ttl_secs)
        .and_then(|delta| now.checked_add_signed(delta))
        .ok_or_else(|| AuthError::InvalidExpiry(format!("now + {ttl_secs}s is out of range")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::config::EncryptionKey;

    fn store() -> (Arc<MemoryTokenRows>, TokenStore) {
        let rows = Arc::new(MemoryTokenRows::new());
        let cipher = TokenCipher::new(EncryptionKey::from_hex(&"0f".repeat(32)).unwrap());
        (rows.clone(), TokenStore::new(rows, cipher))
    }

    #[tokio::test]
    async fn get_without_row_is_none() {
        let (_, store) = store();
        assert_eq!(store.get("nobody").await.unwrap(), None);
    }

    #[tokio::test]
    async fn put_encrypts_and_get_decrypts() {
        let (rows, store) = store();
        let now = Utc::now();
        store.put_at("123", Some("refresh-1"), Some(3600), now).await.unwrap();

        let row = rows.row("123").unwrap();
        let encrypted = row.encrypted_token.unwrap();
        assert_ne!(encrypted, "refresh-1");
        assert!(encrypted.contains(':'));
        assert_eq!(row.expires_at, Some(now + TimeDelta::seconds(3600)));

        assert_eq!(store.get("123").await.unwrap().as_deref(), Some("refresh-1"));
    }

    #[tokio::test]
    async fn put_none_writes_revocation_marker() {
        let (rows, store) = store();
        store.put("123", Some("refresh-1"), Some(60)).await.unwrap();
        store.put("123", None, None).await.unwrap();

        let row = rows.row("123").unwrap();
        assert_eq!(row.encrypted_token, None);
        assert_eq!(row.expires_at, None);
        assert_eq!(store.get("123").await.unwrap(), None);
    }

    #[tokio::test]
    async fn empty_ciphertext_reads_as_none() {
        let (rows, store) = store();
        rows.upsert(StoredRefreshToken {
            user_id: "123".into(),
            encrypted_token: Some(String::new()),
            expires_at: None,
        })
        .await
        .unwrap();
        assert_eq!(store.get("123").await.unwrap(), None);
    }

    #[tokio::test]
    async fn malformed_ciphertext_is_an_error() {
        let (rows, store) = store();
        rows.upsert(StoredRefreshToken {
            user_id: "123".into(),
            encrypted_token: Some("plaintext-leaked".into()),
            expires_at: None,
        })
        .await
        .unwrap();
        assert!(matches!(
            store.get("123").await,
            Err(AuthError::InvalidTokenFormat(_))
        ));
    }

    #[tokio::test]
    async fn last_writer_wins() {
        let (_, store) = store();
        store.put("123", Some("first"), Some(60)).await.unwrap();
        store.put("123", Some("second"), Some(60)).await.unwrap();
        assert_eq!(store.get("123").await.unwrap().as_deref(), Some("second"));
    }

    #[tokio::test]
    async fn unrepresentable_ttl_is_rejected_without_writing() {
        let (rows, store) = store();
        let err = store
            .put("123", Some("refresh-1"), Some(10_i64.pow(16)))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidExpiry(_)), "{err}");
        assert!(rows.row("123").is_none());
    }
}
