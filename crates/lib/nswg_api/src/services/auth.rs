//! Login and logout flows, delegating to `nswg_core::auth`.

use chrono::Utc;
use nswg_core::auth::session::SessionToken;
use tracing::{info, warn};

use crate::AppState;
use crate::error::{AppError, AppResult};

/// Result of a completed login: the signed cookie value and where to send the browser.
#[derive(Debug)]
pub struct CompletedLogin {
    pub session: SessionToken,
    pub cookie_value: String,
    pub callback_url: String,
}

/// Start a login: remember the callback and return the provider URL.
pub fn begin_login(state: &AppState, callback_url: Option<&str>) -> String {
    let key = state.login_states.begin(callback_url);
    state.provider.authorize_url(&key)
}

/// Finish a login from the provider callback.
pub async fn complete_login(state: &AppState, code: &str, state_key: &str) -> AppResult<CompletedLogin> {
    let callback_url = state
        .login_states
        .complete(state_key)
        .ok_or_else(|| AppError::Validation("Unknown or expired login state".into()))?;

    let grant = state.provider.exchange_code(code).await?;
    let profile = state.provider.fetch_profile(&grant.access_token).await?;
    let user = state.users.upsert_profile(&profile).await?;
    let roles = state.users.roles(&user.id).await?;

    let session = state.sessions.issue(&user.id, roles, &grant).await?;
    let cookie_value = state.codec.encode(&session, Utc::now())?;

    info!(user_id = %user.id, roles = ?session.roles.names(), "login completed");
    Ok(CompletedLogin {
        session,
        cookie_value,
        callback_url,
    })
}

/// Revoke the stored refresh token for the current session, if any.
pub async fn logout(state: &AppState, session: Option<&SessionToken>) {
    if let Some(session) = session
        && let Err(e) = state.sessions.revoke(session).await
    {
        warn!(user_id = %session.user_id, error = %e, "failed to revoke refresh token on logout");
    }
}
