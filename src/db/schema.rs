//! Database schema and row types

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// SQL schema for initialization
pub const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS wait_markers (
    user_id TEXT PRIMARY KEY,
    token TEXT NOT NULL,
    created_at TEXT NOT NULL,
    expires_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_wait_markers_expires ON wait_markers(expires_at);

CREATE TABLE IF NOT EXISTS session_entries (
    namespace TEXT NOT NULL,
    user_id TEXT NOT NULL,
    value TEXT NOT NULL,
    context TEXT,
    expires_at TEXT NOT NULL,

    PRIMARY KEY (namespace, user_id)
);

CREATE INDEX IF NOT EXISTS idx_session_entries_expires ON session_entries(expires_at);
";

/// Durable record that a user is being awaited
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitMarkerRow {
    pub user_id: String,
    pub token: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Ephemeral value carried between conversation steps
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRow {
    pub namespace: String,
    pub user_id: String,
    pub value: String,
    pub context: Option<String>,
    pub expires_at: DateTime<Utc>,
}

/// Fixed-width RFC 3339 so stored timestamps compare correctly as text
pub fn format_datetime(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse an RFC 3339 timestamp written by this module.
///
/// Unparseable values read as the Unix epoch, which every expiry check
/// treats as already expired.
pub fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_default()
}
