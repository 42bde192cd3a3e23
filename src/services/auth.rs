use chrono::Utc;
use uuid::Uuid;

use crate::{
    crypto::{
        csrf::generate_csrf_token,
        kdf::KdfParams,
        password::{hash_password, verify_password},
    },
    error::{AppError, Result},
    models::{
        session::Session,
        user::{CurrentUser, User, ROLE_ADMIN},
    },
    repositories::{session::SessionStore, user::UserStore},
};

/// Lifetime of an issued CSRF token.
pub const CSRF_TOKEN_TTL_SECS: u64 = 3600;

/// Accounts created when demo data is enabled. The password of each is
/// its username.
const DEMO_ACCOUNTS: [(&str, &[&str]); 3] = [
    ("joe", &[]),
    ("alice", &[]),
    ("admin", &[ROLE_ADMIN]),
];

fn invalid_credentials() -> AppError {
    AppError::Authentication("Invalid username or password".to_string())
}

/// Runs an argon2 job on the blocking pool.
async fn blocking<T, F>(job: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(job)
        .await
        .map_err(|e| AppError::Internal(format!("Password hashing task failed: {}", e)))?
}

/// Creates a new user.
///
/// # Arguments
///
/// * `users` - The user store.
/// * `username` - The user's username.
/// * `password` - The user's password.
/// * `roles` - Roles granted to the account.
/// * `params` - Argon2 cost for the password hash.
///
/// # Returns
///
/// A `Result` containing the created `User`.
pub async fn create_user(
    users: &dyn UserStore,
    username: &str,
    password: String,
    roles: Vec<String>,
    params: KdfParams,
) -> Result<User> {
    tracing::debug!("🔐 Creating user: {}", username);
    let password_hash = blocking(move || hash_password(&password, params)).await?;
    let user = users.add_user(username, password_hash, roles).await?;
    tracing::info!("✅ User created: {}", user.username);
    Ok(user)
}

/// Authenticates a user.
///
/// Unknown usernames and wrong passwords fail the same way.
pub async fn authenticate_user(
    users: &dyn UserStore,
    username: &str,
    password: String,
) -> Result<User> {
    tracing::debug!("🔐 Authenticating user: {}", username);

    let user = users
        .find_by_username(username)
        .await?
        .ok_or_else(invalid_credentials)?;

    let hash = user.password.clone();
    if !blocking(move || verify_password(&password, &hash)).await? {
        return Err(invalid_credentials());
    }

    tracing::info!("✅ User authenticated: {}", user.username);
    Ok(user)
}

/// Opens a session for `user` and returns its id.
pub async fn start_session(
    sessions: &dyn SessionStore,
    user: &User,
    duration_days: i64,
) -> Result<Uuid> {
    let session_id = Uuid::new_v4();
    let now = Utc::now();
    let session = Session {
        username: user.username.clone(),
        created_at: now,
        expires_at: now + chrono::Duration::days(duration_days),
    };

    let ttl_secs = u64::try_from(duration_days.max(0) * 86400).unwrap_or(0);
    sessions.put_session(session_id, &session, ttl_secs).await?;
    tracing::info!("✅ Session saved: session:{}", session_id);
    Ok(session_id)
}

/// Issues a CSRF token and remembers it.
pub async fn issue_csrf_token(sessions: &dyn SessionStore) -> Result<String> {
    let token = generate_csrf_token();
    sessions.put_csrf(&token, CSRF_TOKEN_TTL_SECS).await?;
    Ok(token)
}

/// Forgets a session and its CSRF token.
pub async fn end_session(
    sessions: &dyn SessionStore,
    session_id: Option<Uuid>,
    csrf_token: Option<&str>,
) -> Result<()> {
    if let Some(id) = session_id {
        sessions.delete_session(id).await?;
        tracing::info!("✅ Session deleted: session:{}", id);
    }
    if let Some(token) = csrf_token {
        sessions.delete_csrf(token).await?;
    }
    Ok(())
}

/// Resolves a session id to the user it belongs to.
///
/// Expired sessions are removed and resolve to `None`, as do sessions whose
/// account no longer exists.
pub async fn current_user(
    users: &dyn UserStore,
    sessions: &dyn SessionStore,
    session_id: Uuid,
) -> Result<Option<CurrentUser>> {
    let Some(session) = sessions.get_session(session_id).await? else {
        return Ok(None);
    };

    if session.is_expired() {
        tracing::warn!("❌ Session expired for user: {}", session.username);
        sessions.delete_session(session_id).await?;
        return Ok(None);
    }

    Ok(users
        .find_by_username(&session.username)
        .await?
        .map(CurrentUser::from))
}

/// Creates the demo accounts that do not exist yet.
pub async fn seed_demo_accounts(users: &dyn UserStore, params: KdfParams) -> Result<()> {
    for (username, roles) in DEMO_ACCOUNTS {
        if users.find_by_username(username).await?.is_some() {
            continue;
        }
        let roles = roles.iter().map(|r| r.to_string()).collect();
        create_user(users, username, username.to_string(), roles, params).await?;
    }
    Ok(())
}
