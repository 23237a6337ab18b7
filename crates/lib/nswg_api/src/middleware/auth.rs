//! Session middleware: cookie decoding, lazy refresh and role guards.

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::http::header::SET_COOKIE;
use axum::middleware::Next;
use axum::response::{IntoResponse, Redirect, Response};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use chrono::Utc;
use nswg_core::auth::guard::{GuardDecision, GuardMode, authorize};
use nswg_core::auth::roles::RoleSet;
use nswg_core::auth::session::SessionToken;
use tracing::{debug, warn};

use crate::AppState;
use crate::error::AppError;
use crate::services::cookies::{SESSION_COOKIE, clear_session_cookie, session_cookie};

/// Session for the current request, inserted into request extensions by `load_session`.
///
/// Errored sessions are kept so handlers can report the error; the guard
/// treats them as signed out.
#[derive(Debug, Clone, Default)]
pub struct CurrentSession(pub Option<SessionToken>);

impl CurrentSession {
    /// The session, if present and not errored.
    pub fn usable(&self) -> Option<&SessionToken> {
        self.0.as_ref().filter(|s| !s.is_errored())
    }
}

/// Axum middleware: decodes the session cookie, refreshes a stale access
/// token, reloads the user's current roles, and injects `CurrentSession`.
/// Re-issues the cookie when the session changed; clears it when errored.
pub async fn load_session(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let jar = CookieJar::from_headers(request.headers());
    let secure = state.config.secure_cookies;

    let (session, cookie_update) = match jar.get(SESSION_COOKIE).map(|c| c.value().to_string()) {
        None => (None, None),
        Some(raw) if raw.is_empty() => (None, None),
        Some(raw) => match state.codec.decode(&raw) {
            Err(e) => {
                debug!(error = %e, "discarding unreadable session cookie");
                (None, Some(clear_session_cookie(secure)))
            }
            Ok(session) => {
                let before = session.clone();
                let mut after = state.sessions.ensure_fresh(session).await;
                if !after.is_errored() {
                    // Roles come from the directory, not from the cookie.
                    match state.users.roles(&after.user_id).await {
                        Ok(roles) => after.roles = roles,
                        Err(e) => {
                            warn!(user_id = %after.user_id, error = %e, "could not load roles for session");
                            return AppError::from(e).into_response();
                        }
                    }
                }
                if after.is_errored() {
                    (Some(after), Some(clear_session_cookie(secure)))
                } else if after != before {
                    let update = reissue(&state, &after);
                    (Some(after), update)
                } else {
                    (Some(after), None)
                }
            }
        },
    };

    request.extensions_mut().insert(CurrentSession(session));
    let response = next.run(request).await;

    match cookie_update {
        // A handler that set the session cookie itself (login, logout) wins.
        Some(cookie) if !sets_session_cookie(&response) => (CookieJar::new().add(cookie), response).into_response(),
        _ => response,
    }
}

fn reissue(state: &AppState, session: &SessionToken) -> Option<Cookie<'static>> {
    match state.codec.encode(session, Utc::now()) {
        Ok(value) => Some(session_cookie(
            &value,
            state.codec.lifetime_secs(),
            state.config.secure_cookies,
        )),
        Err(e) => {
            warn!(user_id = %session.user_id, error = %e, "could not re-sign refreshed session");
            None
        }
    }
}

fn sets_session_cookie(response: &Response) -> bool {
    let prefix = format!("{SESSION_COOKIE}=");
    response
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .any(|v| v.starts_with(&prefix))
}

/// Axum middleware: lets the request through only if the session holds one
/// of the allowed roles; otherwise redirects to login or `/unauthorized`.
///
/// Attach with `from_fn_with_state(allowed_roles, require_roles)`.
pub async fn require_roles(State(allowed): State<RoleSet>, request: Request, next: Next) -> Response {
    let decision = {
        let session = request
            .extensions()
            .get::<CurrentSession>()
            .and_then(|c| c.0.as_ref());
        let path = request
            .uri()
            .path_and_query()
            .map(|p| p.as_str())
            .unwrap_or("/");
        authorize(session, &allowed, path, GuardMode::Redirect)
    };

    match decision {
        GuardDecision::Allow => next.run(request).await,
        GuardDecision::Redirect(target) => {
            debug!(target = %target, path = %request.uri().path(), "guard redirect");
            Redirect::to(&target).into_response()
        }
        GuardDecision::Hide => StatusCode::NO_CONTENT.into_response(),
    }
}
