//! Database module for parley
//!
//! Provides durable storage for wait markers and ephemeral session entries.
//! Both tables are keyed by the stringified user id and carry an explicit
//! expiry; expired rows are invisible to reads and removed by
//! [`Database::purge_expired`].

mod schema;

pub use schema::*;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Database connection lock poisoned")]
    Poisoned,
}

pub type DbResult<T> = Result<T, DbError>;

/// Thread-safe database handle
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    fn run_migrations(&self) -> DbResult<()> {
        let conn = self.lock()?;
        conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    fn lock(&self) -> DbResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| DbError::Poisoned)
    }

    // ==================== Wait Markers ====================

    /// Mark a user as awaited until `expires_at`, replacing any previous marker
    pub fn set_wait_marker(
        &self,
        user_id: &str,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> DbResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO wait_markers (user_id, token, created_at, expires_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(user_id) DO UPDATE SET
                token = excluded.token,
                created_at = excluded.created_at,
                expires_at = excluded.expires_at",
            params![user_id, token, format_datetime(Utc::now()), format_datetime(expires_at)],
        )?;
        Ok(())
    }

    /// Get the unexpired marker for a user, if any
    pub fn get_wait_marker(&self, user_id: &str, now: DateTime<Utc>) -> DbResult<Option<WaitMarkerRow>> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT user_id, token, created_at, expires_at FROM wait_markers
                 WHERE user_id = ?1",
                params![user_id],
                |row| {
                    Ok(WaitMarkerRow {
                        user_id: row.get(0)?,
                        token: row.get(1)?,
                        created_at: parse_datetime(&row.get::<_, String>(2)?),
                        expires_at: parse_datetime(&row.get::<_, String>(3)?),
                    })
                },
            )
            .optional()?;

        Ok(row.filter(|marker| marker.expires_at > now))
    }

    /// Delete the marker only if it still carries `token`
    ///
    /// Returns whether a row was removed.
    pub fn delete_wait_marker(&self, user_id: &str, token: &str) -> DbResult<bool> {
        let conn = self.lock()?;
        let removed = conn.execute(
            "DELETE FROM wait_markers WHERE user_id = ?1 AND token = ?2",
            params![user_id, token],
        )?;
        Ok(removed > 0)
    }

    // ==================== Session Entries ====================

    /// Insert or replace a session entry
    pub fn put_session(&self, entry: &SessionRow) -> DbResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO session_entries (namespace, user_id, value, context, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(namespace, user_id) DO UPDATE SET
                value = excluded.value,
                context = excluded.context,
                expires_at = excluded.expires_at",
            params![
                entry.namespace,
                entry.user_id,
                entry.value,
                entry.context,
                format_datetime(entry.expires_at)
            ],
        )?;
        Ok(())
    }

    /// Get an unexpired session entry
    pub fn get_session(
        &self,
        namespace: &str,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> DbResult<Option<SessionRow>> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT namespace, user_id, value, context, expires_at FROM session_entries
                 WHERE namespace = ?1 AND user_id = ?2",
                params![namespace, user_id],
                |row| {
                    Ok(SessionRow {
                        namespace: row.get(0)?,
                        user_id: row.get(1)?,
                        value: row.get(2)?,
                        context: row.get(3)?,
                        expires_at: parse_datetime(&row.get::<_, String>(4)?),
                    })
                },
            )
            .optional()?;

        Ok(row.filter(|entry| entry.expires_at > now))
    }

    /// Delete a session entry, returning whether one existed
    pub fn delete_session(&self, namespace: &str, user_id: &str) -> DbResult<bool> {
        let conn = self.lock()?;
        let removed = conn.execute(
            "DELETE FROM session_entries WHERE namespace = ?1 AND user_id = ?2",
            params![namespace, user_id],
        )?;
        Ok(removed > 0)
    }

    /// Remove expired markers and session entries
    ///
    /// Returns the number of rows removed across both tables.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> DbResult<usize> {
        let conn = self.lock()?;
        let now = format_datetime(now);
        let markers = conn.execute(
            "DELETE FROM wait_markers WHERE expires_at <= ?1",
            params![now],
        )?;
        let sessions = conn.execute(
            "DELETE FROM session_entries WHERE expires_at <= ?1",
            params![now],
        )?;
        Ok(markers + sessions)
    }
}
