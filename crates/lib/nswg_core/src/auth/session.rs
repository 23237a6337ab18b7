//! Session token lifecycle.
//!
//! A `SessionToken` is FRESH while `now < expires_at`, STALE afterwards, and
//! ERRORED once a refresh has failed. ERRORED is terminal: the holder must be
//! signed out. Provider and token-store failures during refresh are absorbed
//! here and turned into the ERRORED state.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::AuthError;
use super::config::{TokenPolicy, check_ttl};
use super::provider::{IdentityProvider, TokenGrant};
use super::roles::RoleSet;
use super::token_store::TokenStore;

/// Terminal session failure visible to consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionError {
    RefreshAccessTokenError,
}

/// Lifecycle state derived from a session and the current time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Fresh,
    Stale,
    Errored,
}

/// The per-browser session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionToken {
    pub user_id: String,
    pub access_token: String,
    /// Access token expiry, epoch seconds.
    pub expires_at: i64,
    pub refresh_token: Option<String>,
    pub roles: RoleSet,
    pub error: Option<SessionError>,
}

impl SessionToken {
    /// Build a session from a provider grant.
    pub fn from_grant(
        user_id: &str,
        roles: RoleSet,
        grant: &TokenGrant,
        policy: &TokenPolicy,
        now: DateTime<Utc>,
    ) -> Result<Self, AuthError> {
        let mut session = Self {
            user_id: user_id.to_string(),
            access_token: String::new(),
            expires_at: 0,
            refresh_token: None,
            roles,
            error: None,
        };
        session.apply_grant(grant, policy, now)?;
        Ok(session)
    }

    pub fn state(&self, now: DateTime<Utc>) -> SessionState {
        if self.error.is_some() {
            SessionState::Errored
        } else if now.timestamp() < self.expires_at {
            SessionState::Fresh
        } else {
            SessionState::Stale
        }
    }

    pub fn is_errored(&self) -> bool {
        self.error.is_some()
    }

    /// Replace the access token and its expiry together; keep the refresh
    /// token unless the provider rotated it.
    ///
    /// An out-of-range lifetime leaves the session untouched.
    pub fn apply_grant(
        &mut self,
        grant: &TokenGrant,
        policy: &TokenPolicy,
        now: DateTime<Utc>,
    ) -> Result<(), AuthError> {
        let ttl = check_ttl(grant.expires_in.unwrap_or(policy.access_token_ttl_secs))?;
        let expires_at = now
            .timestamp()
            .checked_add(ttl)
            .ok_or_else(|| AuthError::InvalidExpiry(format!("now + {ttl}s overflows")))?;
        self.access_token = grant.access_token.clone();
        self.expires_at = expires_at;
        if let Some(rotated) = &grant.refresh_token {
            self.refresh_token = Some(rotated.clone());
        }
        self.error = None;
        Ok(())
    }

    fn mark_errored(&mut self) {
        self.error = Some(SessionError::RefreshAccessTokenError);
    }
}

/// Drives session issue, refresh and revocation.
pub struct SessionManager {
    provider: Arc<dyn IdentityProvider>,
    store: TokenStore,
    policy: TokenPolicy,
}

impl SessionManager {
    pub fn new(provider: Arc<dyn IdentityProvider>, store: TokenStore, policy: TokenPolicy) -> Self {
        Self {
            provider,
            store,
            policy,
        }
    }

    pub fn policy(&self) -> &TokenPolicy {
        &self.policy
    }

    /// Start a session at login and persist the grant's refresh token.
    pub async fn issue(
        &self,
        user_id: &str,
        roles: RoleSet,
        grant: &TokenGrant,
    ) -> Result<SessionToken, AuthError> {
        let session = SessionToken::from_grant(user_id, roles, grant, &self.policy, Utc::now())?;
        if let Some(refresh) = &session.refresh_token {
            self.store
                .put(user_id, Some(refresh), Some(self.refresh_ttl(grant)))
                .await?;
        }
        info!(user_id, expires_at = session.expires_at, "session issued");
        Ok(session)
    }

    /// Return a usable session, refreshing it if stale.
    pub async fn ensure_fresh(&self, session: SessionToken) -> SessionToken {
        self.ensure_fresh_at(session, Utc::now()).await
    }

    /// Same as `ensure_fresh` with an explicit clock.
    pub async fn ensure_fresh_at(&self, mut session: SessionToken, now: DateTime<Utc>) -> SessionToken {
        match session.state(now) {
            SessionState::Fresh | SessionState::Errored => session,
            SessionState::Stale => {
                match self.refresh(&mut session, now).await {
                    Ok(()) => {
                        info!(user_id = %session.user_id, expires_at = session.expires_at, "session refreshed");
                    }
                    Err(e) => {
                        warn!(user_id = %session.user_id, error = %e, "session refresh failed");
                        session.mark_errored();
                        if let Err(e) = self.store.put_at(&session.user_id, None, None, now).await {
                            warn!(user_id = %session.user_id, error = %e, "could not revoke stored refresh token");
                        }
                    }
                }
                session
            }
        }
    }

    /// Write the revocation marker for the session's user (logout).
    pub async fn revoke(&self, session: &SessionToken) -> Result<(), AuthError> {
        self.store.put(&session.user_id, None, None).await?;
        info!(user_id = %session.user_id, "session revoked");
        Ok(())
    }

    async fn refresh(&self, session: &mut SessionToken, now: DateTime<Utc>) -> Result<(), AuthError> {
        let refresh_token = match session.refresh_token.clone() {
            Some(token) => token,
            None => self
                .store
                .get(&session.user_id)
                .await?
                .ok_or_else(|| AuthError::ProviderRefreshFailed("no refresh token available".into()))?,
        };

        let grant = self.provider.refresh(&refresh_token).await?;

        // Keep the pre-rotation token if the provider did not send a new one.
        if session.refresh_token.is_none() {
            session.refresh_token = Some(refresh_token);
        }
        session.apply_grant(&grant, &self.policy, now)?;

        let current = session.refresh_token.as_deref();
        self.store
            .put_at(&session.user_id, current, Some(self.refresh_ttl(&grant)), now)
            .await
    }

    fn refresh_ttl(&self, grant: &TokenGrant) -> i64 {
        grant.expires_in.unwrap_or(self.policy.refresh_token_ttl_secs)
    }
}
