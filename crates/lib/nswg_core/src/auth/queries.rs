//! Auth-related database queries.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::AuthError;
use super::roles::{Role, RoleSet};
use crate::models::auth::{StoredRefreshToken, User};

/// Insert or update a user from their provider profile. Returns whether the row was new.
pub async fn upsert_user(pool: &PgPool, user: &User) -> Result<bool, AuthError> {
    let inserted = sqlx::query_scalar::<_, bool>(
        "INSERT INTO users (id, username, email, avatar) VALUES ($1, $2, $3, $4) \
         ON CONFLICT (id) DO UPDATE \
           SET username = EXCLUDED.username, email = EXCLUDED.email, \
               avatar = EXCLUDED.avatar, updated_at = now() \
         RETURNING (xmax = 0)",
    )
    .bind(&user.id)
    .bind(&user.username)
    .bind(&user.email)
    .bind(&user.avatar)
    .fetch_one(pool)
    .await?;
    Ok(inserted)
}

/// Fetch a user by ID.
pub async fn get_user_by_id(pool: &PgPool, user_id: &str) -> Result<Option<User>, AuthError> {
    let row = sqlx::query_as::<_, (String, String, Option<String>, Option<String>)>(
        "SELECT id, username, email, avatar FROM users WHERE id = $1",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(|(id, username, email, avatar)| User {
        id,
        username,
        email,
        avatar,
    }))
}

/// List all users ordered by username.
pub async fn list_users(pool: &PgPool) -> Result<Vec<User>, AuthError> {
    let rows = sqlx::query_as::<_, (String, String, Option<String>, Option<String>)>(
        "SELECT id, username, email, avatar FROM users ORDER BY username",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows
        .into_iter()
        .map(|(id, username, email, avatar)| User {
            id,
            username,
            email,
            avatar,
        })
        .collect())
}

/// Fetch roles for a user.
pub async fn get_user_roles(pool: &PgPool, user_id: &str) -> Result<RoleSet, AuthError> {
    let rows = sqlx::query_scalar::<_, String>("SELECT role FROM user_roles WHERE user_id = $1")
        .bind(user_id)
        .fetch_all(pool)
        .await?;
    Ok(RoleSet::from_names(rows))
}

/// Grant a role to a user (no-op if already held).
pub async fn grant_role(pool: &PgPool, user_id: &str, role: Role) -> Result<(), AuthError> {
    sqlx::query(
        "INSERT INTO user_roles (user_id, role) VALUES ($1, $2) ON CONFLICT DO NOTHING",
    )
    .bind(user_id)
    .bind(role.as_str())
    .execute(pool)
    .await?;
    Ok(())
}

/// Replace a user's role set in one transaction.
pub async fn replace_roles(pool: &PgPool, user_id: &str, roles: &RoleSet) -> Result<(), AuthError> {
    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM user_roles WHERE user_id = $1")
        .bind(user_id)
        .execute(&mut *tx)
        .await?;
    for role in roles.iter() {
        sqlx::query("INSERT INTO user_roles (user_id, role) VALUES ($1, $2)")
            .bind(user_id)
            .bind(role.as_str())
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;
    Ok(())
}

/// Fetch the stored refresh token row for a user.
pub async fn find_refresh_token(
    pool: &PgPool,
    user_id: &str,
) -> Result<Option<StoredRefreshToken>, AuthError> {
    let row = sqlx::query_as::<_, (String, Option<String>, Option<DateTime<Utc>>)>(
        "SELECT user_id, encrypted_token, expires_at FROM refresh_tokens WHERE user_id = $1",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(|(user_id, encrypted_token, expires_at)| StoredRefreshToken {
        user_id,
        encrypted_token,
        expires_at,
    }))
}

/// Upsert the refresh token row for a user (last writer wins).
pub async fn upsert_refresh_token(pool: &PgPool, row: &StoredRefreshToken) -> Result<(), AuthError> {
    sqlx::query(
        "INSERT INTO refresh_tokens (user_id, encrypted_token, expires_at) VALUES ($1, $2, $3) \
         ON CONFLICT (user_id) DO UPDATE \
           SET encrypted_token = EXCLUDED.encrypted_token, \
               expires_at = EXCLUDED.expires_at, updated_at = now()",
    )
    .bind(&row.user_id)
    .bind(&row.encrypted_token)
    .bind(row.expires_at)
    .execute(pool)
    .await?;
    Ok(())
}
