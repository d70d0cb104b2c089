//! Server-side sessions: opaque token -> username, with a fixed TTL.
//!
//! The token is a random UUID handed to the client in a signed cookie; the
//! username never leaves the server. Records are kept either in process
//! memory or in the MySQL `sessions` table.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use axum_extra::extract::cookie::Key;
use dashmap::DashMap;
use secrecy::{ExposeSecret, SecretString};
use sqlx::MySqlPool;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session storage error: {0}")]
    Storage(#[from] sqlx::Error),
    #[error("invalid session signing key: {0}")]
    InvalidKey(#[from] cookie::KeyError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    pub username: String,
    /// Unix seconds.
    pub expires_at: i64,
}

#[async_trait]
pub trait SessionBackend: Send + Sync {
    async fn insert(&self, token: &str, record: SessionRecord) -> Result<(), SessionError>;
    async fn load(&self, token: &str) -> Result<Option<SessionRecord>, SessionError>;
    async fn delete(&self, token: &str) -> Result<(), SessionError>;
    /// Drops every record with `expires_at <= now`; returns how many went.
    async fn purge_expired(&self, now: i64) -> Result<u64, SessionError>;
}

#[derive(Clone)]
pub struct SessionStore {
    backend: Arc<dyn SessionBackend>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(backend: Arc<dyn SessionBackend>, ttl: Duration) -> Self {
        Self { backend, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub async fn create(&self, username: String) -> Result<String, SessionError> {
        let token = uuid::Uuid::new_v4().to_string();
        let ttl = i64::try_from(self.ttl.as_secs()).unwrap_or(i64::MAX);
        let record = SessionRecord {
            username,
            expires_at: unix_now().saturating_add(ttl),
        };
        self.backend.insert(&token, record).await?;
        Ok(token)
    }

    /// Resolves a live session to its username. Expired records are dropped.
    pub async fn get(&self, token: &str) -> Result<Option<String>, SessionError> {
        let Some(record) = self.backend.load(token).await? else {
            return Ok(None);
        };
        if record.expires_at > unix_now() {
            Ok(Some(record.username))
        } else {
            self.backend.delete(token).await?;
            Ok(None)
        }
    }

    pub async fn remove(&self, token: &str) -> Result<(), SessionError> {
        self.backend.delete(token).await
    }

    /// Removes expired records, including ones whose token never comes back.
    pub async fn purge_expired(&self) -> Result<u64, SessionError> {
        self.backend.purge_expired(unix_now()).await
    }
}

/// Process-local sessions; lost on restart.
#[derive(Debug, Default)]
pub struct MemorySessions {
    inner: DashMap<String, SessionRecord>,
}

impl MemorySessions {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionBackend for MemorySessions {
    async fn insert(&self, token: &str, record: SessionRecord) -> Result<(), SessionError> {
        self.inner.insert(token.to_string(), record);
        Ok(())
    }

    async fn load(&self, token: &str) -> Result<Option<SessionRecord>, SessionError> {
        Ok(self.inner.get(token).map(|entry| entry.value().clone()))
    }

    async fn delete(&self, token: &str) -> Result<(), SessionError> {
        self.inner.remove(token);
        Ok(())
    }

    async fn purge_expired(&self, now: i64) -> Result<u64, SessionError> {
        let before = self.inner.len();
        self.inner.retain(|_, record| record.expires_at > now);
        Ok(u64::try_from(before.saturating_sub(self.inner.len())).unwrap_or(u64::MAX))
    }
}

#[derive(Debug, Clone)]
pub struct MySqlSessions {
    pool: MySqlPool,
}

impl MySqlSessions {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionBackend for MySqlSessions {
    async fn insert(&self, token: &str, record: SessionRecord) -> Result<(), SessionError> {
        sqlx::query("INSERT INTO sessions (Token, Username, ExpiresAt) VALUES (?, ?, ?)")
            .bind(token)
            .bind(&record.username)
            .bind(record.expires_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn load(&self, token: &str) -> Result<Option<SessionRecord>, SessionError> {
        let row: Option<(String, i64)> = sqlx::query_as(
            "SELECT Username, ExpiresAt FROM sessions WHERE Token = ? AND ExpiresAt > ?",
        )
        .bind(token)
        .bind(unix_now())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(username, expires_at)| SessionRecord {
            username,
            expires_at,
        }))
    }

    async fn delete(&self, token: &str) -> Result<(), SessionError> {
        sqlx::query("DELETE FROM sessions WHERE Token = ?")
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn purge_expired(&self, now: i64) -> Result<u64, SessionError> {
        let result = sqlx::query("DELETE FROM sessions WHERE ExpiresAt <= ?")
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

/// Cookie signing key from the configured secret, or a random one when unset.
pub fn cookie_key(secret: Option<&SecretString>) -> Result<Key, SessionError> {
    match secret {
        Some(secret) => Ok(Key::try_from(secret.expose_secret().as_bytes())?),
        None => Ok(Key::generate()),
    }
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| i64::try_from(elapsed.as_secs()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}
