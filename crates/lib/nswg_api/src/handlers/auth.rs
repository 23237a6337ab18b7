//! Login, OAuth callback and logout handlers.

use axum::Json;
use axum::extract::{Extension, Query, State};
use axum::response::Redirect;
use axum_extra::extract::cookie::CookieJar;
use tracing::warn;

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::middleware::auth::CurrentSession;
use crate::models::{CallbackParams, LoginParams, LogoutResponse};
use crate::services::auth;
use crate::services::cookies::{clear_session_cookie, session_cookie};

/// `GET /auth/login`: redirect to Discord consent.
pub async fn login_handler(
    State(state): State<AppState>,
    Query(params): Query<LoginParams>,
) -> Redirect {
    let url = auth::begin_login(&state, params.callback_url.as_deref());
    Redirect::to(&url)
}

/// `GET /auth/callback`: exchange the code, start the session, return to the callback URL.
pub async fn callback_handler(
    State(state): State<AppState>,
    Query(params): Query<CallbackParams>,
) -> AppResult<(CookieJar, Redirect)> {
    if let Some(error) = params.error {
        warn!(error = %error, "provider denied login");
        return Err(AppError::Unauthorized(format!("Login was not completed: {error}")));
    }
    let code = params
        .code
        .ok_or_else(|| AppError::Validation("Missing code".into()))?;
    let state_key = params
        .state
        .ok_or_else(|| AppError::Validation("Missing state".into()))?;

    let login = auth::complete_login(&state, &code, &state_key).await?;
    let cookie = session_cookie(
        &login.cookie_value,
        state.codec.lifetime_secs(),
        state.config.secure_cookies,
    );
    Ok((CookieJar::new().add(cookie), Redirect::to(&login.callback_url)))
}

/// `POST /auth/logout`: revoke the stored refresh token and clear the cookie.
pub async fn logout_handler(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentSession>,
) -> (CookieJar, Json<LogoutResponse>) {
    auth::logout(&state, current.0.as_ref()).await;
    let jar = CookieJar::new().add(clear_session_cookie(state.config.secure_cookies));
    (jar, Json(LogoutResponse { success: true }))
}
