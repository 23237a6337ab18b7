//! User directory: who a Discord identity is locally and which roles they hold.

use async_trait::async_trait;
use dashmap::DashMap;
use sqlx::PgPool;
use tracing::info;

use super::AuthError;
use super::provider::ProviderProfile;
use super::queries;
use super::roles::{Role, RoleSet};
use crate::models::auth::{User, UserWithRoles};

/// Roles granted to a user the first time they sign in.
pub fn default_roles() -> RoleSet {
    RoleSet::from([Role::Guest])
}

impl From<&ProviderProfile> for User {
    fn from(profile: &ProviderProfile) -> Self {
        Self {
            id: profile.id.clone(),
            username: profile
                .global_name
                .clone()
                .unwrap_or_else(|| profile.username.clone()),
            email: profile.email.clone(),
            avatar: profile.avatar.clone(),
        }
    }
}

/// Local user records and role assignments.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Create or update the user for a provider profile; new users get `default_roles()`.
    async fn upsert_profile(&self, profile: &ProviderProfile) -> Result<User, AuthError>;

    async fn roles(&self, user_id: &str) -> Result<RoleSet, AuthError>;

    async fn list_users(&self) -> Result<Vec<UserWithRoles>, AuthError>;

    /// Replace the role set. Returns `false` if the user does not exist.
    async fn set_roles(&self, user_id: &str, roles: &RoleSet) -> Result<bool, AuthError>;
}

/// PostgreSQL directory (`users`, `user_roles`).
pub struct PgUserDirectory {
    pool: PgPool,
}

impl PgUserDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserDirectory for PgUserDirectory {
    async fn upsert_profile(&self, profile: &ProviderProfile) -> Result<User, AuthError> {
        let user = User::from(profile);
        if queries::upsert_user(&self.pool, &user).await? {
            for role in default_roles().iter() {
                queries::grant_role(&self.pool, &user.id, role).await?;
            }
            info!(user_id = %user.id, "registered new portal user");
        }
        Ok(user)
    }

    async fn roles(&self, user_id: &str) -> Result<RoleSet, AuthError> {
        queries::get_user_roles(&self.pool, user_id).await
    }

    async fn list_users(&self) -> Result<Vec<UserWithRoles>, AuthError> {
        let users = queries::list_users(&self.pool).await?;
        let mut out = Vec::with_capacity(users.len());
        for user in users {
            let roles = queries::get_user_roles(&self.pool, &user.id).await?;
            out.push(UserWithRoles { user, roles });
        }
        Ok(out)
    }

    async fn set_roles(&self, user_id: &str, roles: &RoleSet) -> Result<bool, AuthError> {
        if queries::get_user_by_id(&self.pool, user_id).await?.is_none() {
            return Ok(false);
        }
        queries::replace_roles(&self.pool, user_id, roles).await?;
        Ok(true)
    }
}

/// In-memory directory for tests and local development.
#[derive(Default)]
pub struct MemoryUserDirectory {
    users: DashMap<String, UserWithRoles>,
}

impl MemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a user with an explicit role set.
    pub fn insert(&self, user: User, roles: RoleSet) {
        self.users.insert(user.id.clone(), UserWithRoles { user, roles });
    }
}

#[async_trait]
impl UserDirectory for MemoryUserDirectory {
    async fn upsert_profile(&self, profile: &ProviderProfile) -> Result<User, AuthError> {
        let user = User::from(profile);
        self.users
            .entry(user.id.clone())
            .and_modify(|existing| existing.user = user.clone())
            .or_insert_with(|| UserWithRoles {
                user: user.clone(),
                roles: default_roles(),
            });
        Ok(user)
    }

    async fn roles(&self, user_id: &str) -> Result<RoleSet, AuthError> {
        Ok(self
            .users
            .get(user_id)
            .map(|u| u.roles.clone())
            .unwrap_or_default())
    }

    async fn list_users(&self) -> Result<Vec<UserWithRoles>, AuthError> {
        let mut users: Vec<UserWithRoles> = self.users.iter().map(|e| e.value().clone()).collect();
        users.sort_by(|a, b| a.user.username.cmp(&b.user.username));
        Ok(users)
    }

    async fn set_roles(&self, user_id: &str, roles: &RoleSet) -> Result<bool, AuthError> {
        match self.users.get_mut(user_id) {
            Some(mut entry) => {
                entry.roles = roles.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(id: &str, username: &str) -> ProviderProfile {
        ProviderProfile {
            id: id.into(),
            username: username.into(),
            global_name: None,
            email: None,
            avatar: None,
        }
    }

    #[tokio::test]
    async fn new_users_start_as_guest() {
        let dir = MemoryUserDirectory::new();
        let user = dir.upsert_profile(&profile("123", "frogman")).await.unwrap();
        assert_eq!(user.id, "123");
        assert_eq!(dir.roles("123").await.unwrap(), default_roles());
    }

    #[tokio::test]
    async fn upsert_keeps_existing_roles() {
        let dir = MemoryUserDirectory::new();
        dir.upsert_profile(&profile("123", "frogman")).await.unwrap();
        dir.set_roles("123", &RoleSet::from([Role::Member])).await.unwrap();

        let user = dir.upsert_profile(&profile("123", "renamed")).await.unwrap();
        assert_eq!(user.username, "renamed");
        assert_eq!(dir.roles("123").await.unwrap(), RoleSet::from([Role::Member]));
    }

    #[tokio::test]
    async fn global_name_preferred_for_display() {
        let mut p = profile("1", "handle");
        p.global_name = Some("Display".into());
        assert_eq!(User::from(&p).username, "Display");
    }

    #[tokio::test]
    async fn set_roles_on_unknown_user_reports_missing() {
        let dir = MemoryUserDirectory::new();
        assert!(!dir.set_roles("ghost", &RoleSet::from([Role::Admin])).await.unwrap());
        assert!(dir.roles("ghost").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn list_users_sorted_by_username() {
        let dir = MemoryUserDirectory::new();
        dir.upsert_profile(&profile("2", "zulu")).await.unwrap();
        dir.upsert_profile(&profile("1", "alpha")).await.unwrap();
        let names: Vec<_> = dir
            .list_users()
            .await
            .unwrap()
            .into_iter()
            .map(|u| u.user.username)
            .collect();
        assert_eq!(names, ["alpha", "zulu"]);
    }
}
