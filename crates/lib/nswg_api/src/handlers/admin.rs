//! Admin back-office: user listing and role assignment.

use axum::Json;
use axum::extract::{Extension, Path, State};
use nswg_core::auth::roles::{Role, RoleSet, UnknownRole};
use tracing::info;

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::middleware::auth::CurrentSession;
use crate::models::{SetRolesRequest, UserListResponse, UserSummary};

/// `GET /api/admin/users`: every user with their roles.
pub async fn list_users_handler(State(state): State<AppState>) -> AppResult<Json<UserListResponse>> {
    let users = state
        .users
        .list_users()
        .await?
        .into_iter()
        .map(|u| UserSummary {
            id: u.user.id,
            username: u.user.username,
            avatar: u.user.avatar,
            roles: u.roles,
        })
        .collect();
    Ok(Json(UserListResponse { users }))
}

/// `PUT /api/admin/users/{userId}/roles`: replace a user's role set.
///
/// Callers may not grant a role ranked above their own highest role, nor
/// change the roles of a user who currently outranks them.
pub async fn set_roles_handler(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentSession>,
    Path(user_id): Path<String>,
    Json(body): Json<SetRolesRequest>,
) -> AppResult<Json<UserSummary>> {
    let caller = current
        .usable()
        .ok_or_else(|| AppError::Unauthorized("No session".into()))?;

    let mut roles = RoleSet::new();
    for name in &body.roles {
        let role: Role = name
            .parse()
            .map_err(|e: UnknownRole| AppError::Validation(e.to_string()))?;
        roles.insert(role);
    }

    let ceiling = caller.roles.highest();
    let outranks = |role: Role| ceiling.is_none_or(|c| role > c);
    if let Some(top) = roles.highest()
        && outranks(top)
    {
        return Err(AppError::Forbidden(format!("Cannot grant role {top}")));
    }
    if let Some(current) = state.users.roles(&user_id).await?.highest()
        && outranks(current)
    {
        return Err(AppError::Forbidden(format!(
            "Cannot change roles of a user holding {current}"
        )));
    }

    if !state.users.set_roles(&user_id, &roles).await? {
        return Err(AppError::NotFound(format!("User {user_id}")));
    }
    info!(
        admin = %caller.user_id,
        user_id = %user_id,
        roles = ?roles.names(),
        "roles updated"
    );

    let user = state
        .users
        .list_users()
        .await?
        .into_iter()
        .find(|u| u.user.id == user_id)
        .ok_or_else(|| AppError::NotFound(format!("User {user_id}")))?;
    Ok(Json(UserSummary {
        id: user.user.id,
        username: user.user.username,
        avatar: user.user.avatar,
        roles: user.roles,
    }))
}
