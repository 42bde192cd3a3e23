use async_trait::async_trait;
use chrono::Utc;
use deadpool_postgres::Pool;
use tokio_postgres::Row;
use crate::{
    error::{AppError, Result},
    models::user::User,
};

/// Persistence for accounts.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Creates an account. Fails with `Validation("username is not available")`
    /// when the username is taken.
    async fn add_user(&self, username: &str, password_hash: String, roles: Vec<String>) -> Result<User>;

    /// Finds a user by their username.
    async fn find_by_username(&self, username: &str) -> Result<Option<User>>;

    /// Number of registered accounts.
    async fn count(&self) -> Result<i64>;
}

pub(crate) fn username_taken() -> AppError {
    AppError::Validation("username is not available".to_string())
}

/// A helper function to map a `tokio_postgres::Row` to a `User`.
fn row_to_user(row: &Row) -> Result<User> {
    Ok(User {
        username: row.try_get("username").map_err(|_| AppError::MissingData("username".to_string()))?,
        password: row.try_get("password").map_err(|_| AppError::MissingData("password".to_string()))?,
        roles: row.try_get("roles").map_err(|_| AppError::MissingData("roles".to_string()))?,
        created_at: row.try_get("created_at").map_err(|_| AppError::MissingData("created_at".to_string()))?,
    })
}

/// Postgres-backed user store.
pub struct PgUserStore {
    pool: Pool,
}

impl PgUserStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn add_user(&self, username: &str, password_hash: String, roles: Vec<String>) -> Result<User> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                r#"
                INSERT INTO users (username, password, roles, created_at)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (username) DO NOTHING
                RETURNING username, password, roles, created_at
                "#,
                &[&username, &password_hash, &roles, &Utc::now()],
            )
            .await?;
        match row {
            Some(r) => row_to_user(&r),
            None => Err(username_taken()),
        }
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                r#"
                SELECT username, password, roles, created_at
                FROM users
                WHERE username = $1
                "#,
                &[&username],
            )
            .await?;
        row.map(|r| row_to_user(&r)).transpose()
    }

    async fn count(&self) -> Result<i64> {
        let client = self.pool.get().await?;
        let row = client
            .query_one("SELECT COUNT(*) AS total FROM users", &[])
            .await?;
        row.try_get("total")
            .map_err(|_| AppError::MissingData("total".to_string()))
    }
}
