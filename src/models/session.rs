use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Represents a user session.
///
/// Stored as JSON under `session:{id}`; the id itself only travels in the
/// `session_id` cookie.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// The username this session belongs to.
    pub username: String,
    /// The timestamp when the session was created.
    pub created_at: DateTime<Utc>,
    /// The timestamp when the session expires.
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }
}
