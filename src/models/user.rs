use chrono::{DateTime, Utc};
use serde::Serialize;

/// Role that unlocks the operational pages.
pub const ROLE_ADMIN: &str = "admin";

/// Something a user may be allowed to do.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Permission {
    ReadStats,
}

impl Permission {
    pub fn as_str(self) -> &'static str {
        match self {
            Permission::ReadStats => "read:stats",
        }
    }
}

/// Represents a user in the system.
#[derive(Clone, Debug)]
pub struct User {
    /// The user's username, unique.
    pub username: String,
    /// The user's hashed password.
    pub password: String,
    /// The user's roles.
    pub roles: Vec<String>,
    /// The timestamp when the user was created.
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Whether any of the user's roles grants `permission`.
    pub fn has_permission(&self, permission: Permission) -> bool {
        role_grants(&self.roles, permission)
    }
}

/// The authenticated identity attached to a request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CurrentUser {
    pub username: String,
    pub roles: Vec<String>,
}

impl CurrentUser {
    pub fn has_permission(&self, permission: Permission) -> bool {
        role_grants(&self.roles, permission)
    }
}

impl From<User> for CurrentUser {
    fn from(user: User) -> Self {
        Self {
            username: user.username,
            roles: user.roles,
        }
    }
}

fn role_grants(roles: &[String], permission: Permission) -> bool {
    roles.iter().any(|role| match permission {
        Permission::ReadStats => role == ROLE_ADMIN,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(roles: &[&str]) -> User {
        User {
            username: "joe".to_string(),
            password: String::new(),
            roles: roles.iter().map(|r| r.to_string()).collect(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn only_admin_reads_stats() {
        assert!(!user(&[]).has_permission(Permission::ReadStats));
        assert!(!user(&["editor"]).has_permission(Permission::ReadStats));
        assert!(user(&["editor", ROLE_ADMIN]).has_permission(Permission::ReadStats));
        assert!(CurrentUser::from(user(&[ROLE_ADMIN])).has_permission(Permission::ReadStats));
    }
}
