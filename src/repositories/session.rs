use std::collections::HashMap;
use std::time::{Duration, Instant};
use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    models::session::Session,
};

fn session_key(id: Uuid) -> String {
    format!("session:{}", id)
}

fn csrf_key(token: &str) -> String {
    format!("csrf:{}", token)
}

/// Short-lived state for the Auth Gate: sessions and issued CSRF tokens.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn put_session(&self, id: Uuid, session: &Session, ttl_secs: u64) -> Result<()>;
    async fn get_session(&self, id: Uuid) -> Result<Option<Session>>;
    async fn delete_session(&self, id: Uuid) -> Result<()>;
    async fn put_csrf(&self, token: &str, ttl_secs: u64) -> Result<()>;
    async fn csrf_exists(&self, token: &str) -> Result<bool>;
    async fn delete_csrf(&self, token: &str) -> Result<()>;
}

fn encode_session(session: &Session) -> Result<String> {
    sonic_rs::to_string(session)
        .map_err(|e| AppError::Internal(format!("Session serialization failed: {}", e)))
}

fn decode_session(json: &str) -> Option<Session> {
    match sonic_rs::from_str(json) {
        Ok(session) => Some(session),
        Err(e) => {
            tracing::warn!("❌ Invalid session JSON: {}", e);
            None
        }
    }
}

/// Redis-backed sessions, used with the postgres backend.
#[derive(Clone)]
pub struct RedisSessionStore {
    redis: ConnectionManager,
}

impl RedisSessionStore {
    pub fn new(redis: ConnectionManager) -> Self {
        Self { redis }
    }
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn put_session(&self, id: Uuid, session: &Session, ttl_secs: u64) -> Result<()> {
        let json = encode_session(session)?;
        let mut redis = self.redis.clone();
        let _: () = redis.set_ex(session_key(id), json, ttl_secs).await?;
        Ok(())
    }

    async fn get_session(&self, id: Uuid) -> Result<Option<Session>> {
        let mut redis = self.redis.clone();
        let json: Option<String> = redis.get(session_key(id)).await?;
        Ok(json.as_deref().and_then(decode_session))
    }

    async fn delete_session(&self, id: Uuid) -> Result<()> {
        let mut redis = self.redis.clone();
        let _: () = redis.del(session_key(id)).await?;
        Ok(())
    }

    async fn put_csrf(&self, token: &str, ttl_secs: u64) -> Result<()> {
        let mut redis = self.redis.clone();
        let _: () = redis.set_ex(csrf_key(token), "valid", ttl_secs).await?;
        Ok(())
    }

    async fn csrf_exists(&self, token: &str) -> Result<bool> {
        let mut redis = self.redis.clone();
        let exists: bool = redis.exists(csrf_key(token)).await?;
        Ok(exists)
    }

    async fn delete_csrf(&self, token: &str) -> Result<()> {
        let mut redis = self.redis.clone();
        let _: () = redis.del(csrf_key(token)).await?;
        Ok(())
    }
}

/// Entry count below which inserts never trigger a sweep.
const SWEEP_FLOOR: usize = 1024;

#[derive(Default)]
struct Entries {
    map: HashMap<String, (String, Instant)>,
    next_sweep: usize,
}

impl Entries {
    /// Drops expired entries once the map has doubled since the last sweep.
    fn sweep_if_due(&mut self, now: Instant) {
        if self.map.len() < self.next_sweep.max(SWEEP_FLOOR) {
            return;
        }
        self.map.retain(|_, (_, expires)| *expires > now);
        self.next_sweep = self.map.len() * 2;
    }
}

/// Process-local sessions with the same key layout and expiry semantics
/// as the Redis store. Expired entries are dropped when next read and
/// swept in bulk as the map grows.
#[derive(Default)]
pub struct MemSessionStore {
    entries: RwLock<Entries>,
}

impl MemSessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn set(&self, key: String, value: String, ttl_secs: u64) {
        let now = Instant::now();
        let expires = now + Duration::from_secs(ttl_secs);
        let mut entries = self.entries.write().await;
        entries.sweep_if_due(now);
        entries.map.insert(key, (value, expires));
    }

    #[cfg(test)]
    async fn len(&self) -> usize {
        self.entries.read().await.map.len()
    }

    async fn get(&self, key: &str) -> Option<String> {
        {
            let entries = self.entries.read().await;
            match entries.map.get(key) {
                Some((value, expires)) if *expires > Instant::now() => return Some(value.clone()),
                Some(_) => {}
                None => return None,
            }
        }
        self.entries.write().await.map.remove(key);
        None
    }

    async fn remove(&self, key: &str) {
        self.entries.write().await.map.remove(key);
    }
}

#[async_trait]
impl SessionStore for MemSessionStore {
    async fn put_session(&self, id: Uuid, session: &Session, ttl_secs: u64) -> Result<()> {
        self.set(session_key(id), encode_session(session)?, ttl_secs).await;
        Ok(())
    }

    async fn get_session(&self, id: Uuid) -> Result<Option<Session>> {
        Ok(self.get(&session_key(id)).await.as_deref().and_then(decode_session))
    }

    async fn delete_session(&self, id: Uuid) -> Result<()> {
        self.remove(&session_key(id)).await;
        Ok(())
    }

    async fn put_csrf(&self, token: &str, ttl_secs: u64) -> Result<()> {
        self.set(csrf_key(token), "valid".to_string(), ttl_secs).await;
        Ok(())
    }

    async fn csrf_exists(&self, token: &str) -> Result<bool> {
        Ok(self.get(&csrf_key(token)).await.is_some())
    }

    async fn delete_csrf(&self, token: &str) -> Result<()> {
        self.remove(&csrf_key(token)).await;
        Ok(())
    }
}
