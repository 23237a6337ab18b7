//! Session view, navigation and roster handlers.

use axum::Json;
use axum::extract::{Extension, State};
use nswg_core::auth::guard::{GuardMode, authorize};
use nswg_core::auth::roles::{Role, RoleSet};

use crate::AppState;
use crate::error::AppResult;
use crate::middleware::auth::CurrentSession;
use crate::models::{NavResponse, NavSection, SessionView, UserListResponse, UserSummary};

/// A guarded area of the portal.
pub struct Section {
    pub id: &'static str,
    pub path: &'static str,
    pub allowed: RoleSet,
}

/// Roles that see the member roster.
pub fn roster_roles() -> RoleSet {
    RoleSet::at_or_above(Role::Member)
}

/// Roles that manage users and roles.
pub fn admin_roles() -> RoleSet {
    RoleSet::from([Role::Admin, Role::SuperAdmin])
}

/// Portal areas in menu order.
pub fn sections() -> Vec<Section> {
    vec![
        Section {
            id: "enlist",
            path: "/enlist",
            allowed: RoleSet::from([Role::Guest, Role::Applicant]),
        },
        Section {
            id: "selection",
            path: "/selection",
            allowed: RoleSet::from([Role::Candidate, Role::GreenTeam]),
        },
        Section {
            id: "roster",
            path: "/roster",
            allowed: roster_roles(),
        },
        Section {
            id: "documents",
            path: "/documents",
            allowed: RoleSet::at_or_above(Role::GreenTeam),
        },
        Section {
            id: "training",
            path: "/training",
            allowed: RoleSet::from([Role::Instructor, Role::Admin, Role::SuperAdmin]),
        },
        Section {
            id: "admin",
            path: "/admin",
            allowed: admin_roles(),
        },
    ]
}

/// `GET /api/session`: the caller's session, including a terminal refresh error.
pub async fn session_handler(Extension(current): Extension<CurrentSession>) -> Json<SessionView> {
    let view = match &current.0 {
        Some(session) => SessionView {
            authenticated: !session.is_errored(),
            user_id: Some(session.user_id.clone()),
            roles: session.roles.clone(),
            error: session.error,
        },
        None => SessionView {
            authenticated: false,
            user_id: None,
            roles: RoleSet::new(),
            error: None,
        },
    };
    Json(view)
}

/// `GET /api/nav`: sections the caller may open; others are hidden, not redirected.
pub async fn nav_handler(Extension(current): Extension<CurrentSession>) -> Json<NavResponse> {
    let visible = sections()
        .into_iter()
        .filter(|s| authorize(current.0.as_ref(), &s.allowed, s.path, GuardMode::Hide).is_allowed())
        .map(|s| NavSection {
            id: s.id.to_string(),
            path: s.path.to_string(),
        })
        .collect();
    Json(NavResponse { sections: visible })
}

/// `GET /api/roster`: members of the unit.
pub async fn roster_handler(State(state): State<AppState>) -> AppResult<Json<UserListResponse>> {
    let users = state
        .users
        .list_users()
        .await?
        .into_iter()
        .filter(|u| u.roles.at_least(Role::Member))
        .map(|u| UserSummary {
            id: u.user.id,
            username: u.user.username,
            avatar: u.user.avatar,
            roles: u.roles,
        })
        .collect();
    Ok(Json(UserListResponse { users }))
}
