//! Authentication and authorization logic.
//!
//! Covers the Discord token exchange, encrypted refresh-token storage, the
//! session token lifecycle and role-based access decisions. Shared by
//! `nswg_api` and the server binary.

pub mod config;
pub mod crypto;
pub mod directory;
pub mod guard;
pub mod jwt;
pub mod login_state;
pub mod provider;
pub mod queries;
pub mod roles;
pub mod session;
pub mod token_store;

use thiserror::Error;

/// Authentication errors.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Provider refresh failed: {0}")]
    ProviderRefreshFailed(String),

    #[error("Provider request failed: {0}")]
    ProviderRequestFailed(String),

    #[error("Invalid token format: {0}")]
    InvalidTokenFormat(String),

    #[error("Invalid token lifetime: {0}")]
    InvalidExpiry(String),

    #[error("Decryption failed: {0}")]
    Decryption(String),

    #[error("Missing or malformed encryption key: {0}")]
    MissingOrMalformedKey(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Token error: {0}")]
    TokenError(String),

    #[error("Database error: {0}")]
    DbError(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}
