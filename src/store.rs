//! Trait abstractions for durable conversation state
//!
//! The correlator and flows only see these traits, so the wait-marker and
//! session storage can live in SQLite, in memory for tests, or in a separate
//! networked service. Every implementation is a distinct failure domain and
//! reports outages as [`StoreError::Unavailable`].

use crate::db::{Database, SessionRow};
use crate::types::UserId;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("state store unavailable: {0}")]
    Unavailable(String),
}

impl From<crate::db::DbError> for StoreError {
    fn from(e: crate::db::DbError) -> Self {
        StoreError::Unavailable(e.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Durable "this user is being awaited" markers
#[async_trait]
pub trait WaitStateStore: Send + Sync {
    /// Record that `user` is awaited by the wait identified by `token`
    async fn set_marker(&self, user: UserId, token: &str, ttl: Duration) -> StoreResult<()>;

    /// Whether an unexpired marker exists for `user`
    async fn has_marker(&self, user: UserId) -> StoreResult<bool>;

    /// Remove the marker if it still belongs to `token`
    async fn release_marker(&self, user: UserId, token: &str) -> StoreResult<()>;
}

/// Namespace of ephemeral session entries, each with its own lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionNamespace {
    pub name: &'static str,
    pub ttl: Duration,
}

impl SessionNamespace {
    /// One-shot verification codes
    pub const AUTH_CODE: Self = Self {
        name: "auth_code",
        ttl: Duration::from_secs(5 * 60),
    };

    /// Email address awaiting confirmation
    pub const EMAIL_CONFIRMATION: Self = Self {
        name: "email_confirmation",
        ttl: Duration::from_secs(24 * 60 * 60),
    };

    /// Partially entered event
    pub const EVENT_DRAFT: Self = Self {
        name: "event_draft",
        ttl: Duration::from_secs(60 * 60),
    };
}

/// Value carried across the gap between two conversation steps
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionEntry {
    pub value: String,
    /// Secondary data tied to the value (the address a code was sent to, ...)
    pub context: Option<String>,
}

impl SessionEntry {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            context: None,
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }
}

/// Per-namespace ephemeral key/value storage
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn put(
        &self,
        namespace: SessionNamespace,
        user: UserId,
        entry: SessionEntry,
    ) -> StoreResult<()>;

    async fn get(&self, namespace: SessionNamespace, user: UserId)
        -> StoreResult<Option<SessionEntry>>;

    async fn remove(&self, namespace: SessionNamespace, user: UserId) -> StoreResult<bool>;

    /// Read and remove in one step
    async fn take(
        &self,
        namespace: SessionNamespace,
        user: UserId,
    ) -> StoreResult<Option<SessionEntry>> {
        let entry = self.get(namespace, user).await?;
        if entry.is_some() {
            self.remove(namespace, user).await?;
        }
        Ok(entry)
    }
}

// ============================================================================
// Arc implementations for trait objects
// ============================================================================

#[async_trait]
impl<T: WaitStateStore + ?Sized> WaitStateStore for Arc<T> {
    async fn set_marker(&self, user: UserId, token: &str, ttl: Duration) -> StoreResult<()> {
        (**self).set_marker(user, token, ttl).await
    }

    async fn has_marker(&self, user: UserId) -> StoreResult<bool> {
        (**self).has_marker(user).await
    }

    async fn release_marker(&self, user: UserId, token: &str) -> StoreResult<()> {
        (**self).release_marker(user, token).await
    }
}

#[async_trait]
impl<T: SessionStore + ?Sized> SessionStore for Arc<T> {
    async fn put(
        &self,
        namespace: SessionNamespace,
        user: UserId,
        entry: SessionEntry,
    ) -> StoreResult<()> {
        (**self).put(namespace, user, entry).await
    }

    async fn get(
        &self,
        namespace: SessionNamespace,
        user: UserId,
    ) -> StoreResult<Option<SessionEntry>> {
        (**self).get(namespace, user).await
    }

    async fn remove(&self, namespace: SessionNamespace, user: UserId) -> StoreResult<bool> {
        (**self).remove(namespace, user).await
    }
}

// ============================================================================
// Production Adapter
// ============================================================================

/// Adapter to use Database as wait-marker and session storage
#[derive(Clone)]
pub struct DatabaseStore {
    db: Database,
}

impl DatabaseStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn inner(&self) -> &Database {
        &self.db
    }
}

/// Longest lifetime a stored row can get; keeps expiry timestamps printable
const MAX_TTL: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

pub(crate) fn expiry_after(ttl: Duration) -> DateTime<Utc> {
    let ttl = chrono::Duration::from_std(ttl.min(MAX_TTL)).unwrap_or_default();
    Utc::now() + ttl
}

#[async_trait]
impl WaitStateStore for DatabaseStore {
    async fn set_marker(&self, user: UserId, token: &str, ttl: Duration) -> StoreResult<()> {
        self.db
            .set_wait_marker(&user.to_string(), token, expiry_after(ttl))?;
        Ok(())
    }

    async fn has_marker(&self, user: UserId) -> StoreResult<bool> {
        let marker = self.db.get_wait_marker(&user.to_string(), Utc::now())?;
        Ok(marker.is_some())
    }

    async fn release_marker(&self, user: UserId, token: &str) -> StoreResult<()> {
        self.db.delete_wait_marker(&user.to_string(), token)?;
        Ok(())
    }
}

#[async_trait]
impl SessionStore for DatabaseStore {
    async fn put(
        &self,
        namespace: SessionNamespace,
        user: UserId,
        entry: SessionEntry,
    ) -> StoreResult<()> {
        self.db.put_session(&SessionRow {
            namespace: namespace.name.to_string(),
            user_id: user.to_string(),
            value: entry.value,
            context: entry.context,
            expires_at: expiry_after(namespace.ttl),
        })?;
        Ok(())
    }

    async fn get(
        &self,
        namespace: SessionNamespace,
        user: UserId,
    ) -> StoreResult<Option<SessionEntry>> {
        let row = self
            .db
            .get_session(namespace.name, &user.to_string(), Utc::now())?;
        Ok(row.map(|row| SessionEntry {
            value: row.value,
            context: row.context,
        }))
    }

    async fn remove(&self, namespace: SessionNamespace, user: UserId) -> StoreResult<bool> {
        Ok(self.db.delete_session(namespace.name, &user.to_string())?)
    }
}
