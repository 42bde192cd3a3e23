use std::collections::HashMap;
use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::{
    error::Result,
    models::user::User,
    repositories::user::{username_taken, UserStore},
};

/// In-memory user store keyed by username.
#[derive(Default)]
pub struct MemUserStore {
    users: RwLock<HashMap<String, User>>,
}

impl MemUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for MemUserStore {
    async fn add_user(&self, username: &str, password_hash: String, roles: Vec<String>) -> Result<User> {
        let mut users = self.users.write().await;
        if users.contains_key(username) {
            return Err(username_taken());
        }
        let user = User {
            username: username.to_string(),
            password: password_hash,
            roles,
            created_at: Utc::now(),
        };
        users.insert(user.username.clone(), user.clone());
        Ok(user)
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>> {
        Ok(self.users.read().await.get(username).cloned())
    }

    async fn count(&self) -> Result<i64> {
        Ok(self.users.read().await.len() as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;

    #[tokio::test]
    async fn add_find_count() {
        let store = MemUserStore::new();
        store.add_user("joe", "hash".to_string(), vec![]).await.unwrap();
        store
            .add_user("admin", "hash".to_string(), vec!["admin".to_string()])
            .await
            .unwrap();

        let admin = store.find_by_username("admin").await.unwrap().unwrap();
        assert_eq!(admin.roles, vec!["admin".to_string()]);
        assert!(store.find_by_username("alice").await.unwrap().is_none());
        assert_eq!(store.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn duplicate_username_is_rejected() {
        let store = MemUserStore::new();
        store.add_user("joe", "hash".to_string(), vec![]).await.unwrap();
        let err = store.add_user("joe", "other".to_string(), vec![]).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(ref msg) if msg == "username is not available"));
        assert_eq!(store.count().await.unwrap(), 1);
    }
}
