//! Access control guard.
//!
//! Decides whether a session may see a resource. Missing or errored sessions
//! go to the login page with a callback back to the requested path; sessions
//! without a matching role go to `/unauthorized`. `developer` is allowed
//! everywhere.

use url::form_urlencoded;

use super::roles::{Role, RoleSet};
use super::session::SessionToken;

/// Login page path.
pub const LOGIN_PATH: &str = "/login";
/// Page shown to signed-in users lacking the required role.
pub const UNAUTHORIZED_PATH: &str = "/unauthorized";

/// How a denial is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GuardMode {
    /// Send the browser elsewhere.
    #[default]
    Redirect,
    /// Render nothing in place of the guarded region.
    Hide,
}

/// Outcome of an authorization check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    Allow,
    Redirect(String),
    Hide,
}

impl GuardDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, GuardDecision::Allow)
    }
}

/// Login URL that returns the user to `path` afterwards.
pub fn login_redirect(path: &str) -> String {
    let encoded: String = form_urlencoded::byte_serialize(path.as_bytes()).collect();
    format!("{LOGIN_PATH}?callbackUrl={encoded}")
}

/// Authorize `session` against `allowed` for the resource at `path`.
pub fn authorize(
    session: Option<&SessionToken>,
    allowed: &RoleSet,
    path: &str,
    mode: GuardMode,
) -> GuardDecision {
    let deny = |target: String| match mode {
        GuardMode::Redirect => GuardDecision::Redirect(target),
        GuardMode::Hide => GuardDecision::Hide,
    };

    let Some(session) = session.filter(|s| !s.is_errored()) else {
        return deny(login_redirect(path));
    };

    let effective = allowed.union(&RoleSet::from([Role::Developer]));
    if session.roles.intersects(&effective) {
        GuardDecision::Allow
    } else {
        deny(UNAUTHORIZED_PATH.to_string())
    }
}
