//! Storage layer for the tab focus tracker.
//!
//! Provides persistence for focus sessions, tab activities, tab snapshots,
//! settings and engine runtime state using `rusqlite`.
//!
//! # Thread Safety
//!
//! The [`Database`] type wraps a `rusqlite::Connection`, which is `Send` but not `Sync`.
//! A `Database` instance can be moved between threads but cannot be shared
//! across threads without external synchronization. The tracker handles host
//! events one at a time, so it owns a single instance.
//!
//! # Schema
//!
//! ## Timestamp Format
//!
//! Timestamps are stored as INTEGER milliseconds since the Unix epoch, the
//! unit the host clock reports. Range queries compare them directly.
//!
//! ## Key/Value Tables
//!
//! `settings` and `runtime_state` store one JSON document per key. Settings
//! are normalized on every read, so values written by older builds still load.

use std::path::Path;

use rusqlite::{Connection, OptionalExtension, Row, params};
use thiserror::Error;

use tf_core::{
    ActivityId, EndReason, FocusSession, RuntimeStore, SessionId, Settings, SettingsPatch,
    TabActivity, TabSnapshot, TimestampMs,
};

/// Key of the settings document in the `settings` table.
const SETTINGS_KEY: &str = "settings";

/// Database errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// An error from the underlying database.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// A stored JSON document could not be encoded or decoded.
    #[error("invalid json document: {0}")]
    Json(#[from] serde_json::Error),
    /// A stored row violates the domain model.
    #[error("invalid {table} row {id}: {message}")]
    InvalidRecord {
        table: &'static str,
        id: String,
        message: String,
    },
}

/// Database connection wrapper.
///
/// See the [module documentation](self) for thread safety considerations.
pub struct Database {
    conn: Connection,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").finish_non_exhaustive()
    }
}

impl Database {
    /// Opens a database at the given path, creating it if necessary.
    ///
    /// The database schema is automatically initialized on first open.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Opens an in-memory database.
    ///
    /// Useful for testing. The database is destroyed when the connection closes.
    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Initializes the database schema.
    ///
    /// This is idempotent - safe to call on an already-initialized database.
    fn init(&self) -> Result<(), DbError> {
        self.conn.execute_batch(
            "
            -- Focus sessions: append-only log of ended sessions
            CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                activity_id TEXT,
                tab_id INTEGER NOT NULL,
                window_id INTEGER NOT NULL,
                url TEXT NOT NULL,
                title TEXT NOT NULL,
                domain TEXT NOT NULL,
                start_at INTEGER NOT NULL,
                end_at INTEGER NOT NULL,
                duration_sec INTEGER NOT NULL,
                end_reason TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_sessions_start ON sessions(start_at);
            CREATE INDEX IF NOT EXISTS idx_sessions_end ON sessions(end_at);
            CREATE INDEX IF NOT EXISTS idx_sessions_domain_start ON sessions(domain, start_at);
            CREATE INDEX IF NOT EXISTS idx_sessions_url_start ON sessions(url, start_at);

            -- Tab activities: one row per tab per URL it showed
            CREATE TABLE IF NOT EXISTS tab_activities (
                id TEXT PRIMARY KEY,
                tab_id INTEGER NOT NULL,
                window_id INTEGER NOT NULL,
                url TEXT NOT NULL,
                title TEXT NOT NULL,
                domain TEXT NOT NULL,
                opened_at INTEGER NOT NULL,
                last_seen_at INTEGER NOT NULL,
                closed_at INTEGER,
                ever_focused INTEGER NOT NULL DEFAULT 0,
                total_focused_sec INTEGER NOT NULL DEFAULT 0,
                focus_count INTEGER NOT NULL DEFAULT 0,
                last_focused_at INTEGER
            );

            CREATE INDEX IF NOT EXISTS idx_tab_activities_opened ON tab_activities(opened_at);
            CREATE INDEX IF NOT EXISTS idx_tab_activities_last_seen ON tab_activities(last_seen_at);

            -- Tab snapshots: live tab id -> open activity
            CREATE TABLE IF NOT EXISTS tab_snapshots (
                tab_id INTEGER PRIMARY KEY,
                window_id INTEGER NOT NULL,
                url TEXT NOT NULL,
                title TEXT NOT NULL,
                activity_id TEXT NOT NULL,
                active INTEGER NOT NULL DEFAULT 0,
                last_seen_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS runtime_state (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            ",
        )?;
        Ok(())
    }

    // ========== Sessions ==========

    /// Appends an ended session, replacing any row with the same id.
    pub fn add_session(&mut self, session: &FocusSession) -> Result<(), DbError> {
        self.conn.execute(
            "
            INSERT OR REPLACE INTO sessions
            (id, activity_id, tab_id, window_id, url, title, domain, start_at, end_at, duration_sec, end_reason)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ",
            params![
                session.id.as_str(),
                session.activity_id.as_ref().map(ActivityId::as_str),
                session.tab_id,
                session.window_id,
                session.url,
                session.title,
                session.domain,
                session.start_at,
                session.end_at,
                session.duration_sec,
                session.end_reason.as_str(),
            ],
        )?;
        Ok(())
    }

    /// Lists sessions overlapping `[start, end]`, newest start first.
    ///
    /// Returns an empty list when `end < start`.
    pub fn list_sessions_in_range(
        &self,
        start: TimestampMs,
        end: TimestampMs,
    ) -> Result<Vec<FocusSession>, DbError> {
        if end < start {
            return Ok(Vec::new());
        }
        let mut stmt = self.conn.prepare(
            "
            SELECT id, activity_id, tab_id, window_id, url, title, domain, start_at, end_at, duration_sec, end_reason
            FROM sessions
            WHERE end_at >= ? AND start_at <= ?
            ORDER BY start_at DESC, id ASC
            ",
        )?;
        let rows = stmt.query_map(params![start, end], SessionRow::from_row)?;
        let mut sessions = Vec::new();
        for row in rows {
            sessions.push(row?.into_session()?);
        }
        Ok(sessions)
    }

    /// Deletes sessions that ended before `cutoff`, returning how many.
    pub fn prune_sessions_older_than(&mut self, cutoff: TimestampMs) -> Result<usize, DbError> {
        let deleted = self
            .conn
            .execute("DELETE FROM sessions WHERE end_at < ?", params![cutoff])?;
        Ok(deleted)
    }

    // ========== Tab activities ==========

    /// Inserts or replaces a tab activity.
    pub fn save_tab_activity(&mut self, activity: &TabActivity) -> Result<(), DbError> {
        self.conn.execute(
            "
            INSERT OR REPLACE INTO tab_activities
            (id, tab_id, window_id, url, title, domain, opened_at, last_seen_at, closed_at,
             ever_focused, total_focused_sec, focus_count, last_focused_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ",
            params![
                activity.id.as_str(),
                activity.tab_id,
                activity.window_id,
                activity.url,
                activity.title,
                activity.domain,
                activity.opened_at,
                activity.last_seen_at,
                activity.closed_at,
                activity.ever_focused,
                activity.total_focused_sec,
                activity.focus_count,
                activity.last_focused_at,
            ],
        )?;
        Ok(())
    }

    /// Fetches a tab activity by id.
    pub fn get_tab_activity(&self, id: &str) -> Result<Option<TabActivity>, DbError> {
        let row = self
            .conn
            .query_row(
                &format!("SELECT {ACTIVITY_COLUMNS} FROM tab_activities WHERE id = ?"),
                params![id],
                ActivityRow::from_row,
            )
            .optional()?;
        row.map(ActivityRow::into_activity).transpose()
    }

    /// Marks a tab activity closed. Returns false when it does not exist.
    pub fn close_tab_activity(&mut self, id: &str, now: TimestampMs) -> Result<bool, DbError> {
        let Some(mut activity) = self.get_tab_activity(id)? else {
            return Ok(false);
        };
        activity.close(now);
        self.save_tab_activity(&activity)?;
        Ok(true)
    }

    /// Adds an ended session's duration to its activity's aggregates.
    ///
    /// Returns the updated activity, or `None` when it does not exist.
    pub fn apply_focus_to_tab_activity(
        &mut self,
        id: &str,
        duration_sec: i64,
        focused_at: TimestampMs,
    ) -> Result<Option<TabActivity>, DbError> {
        let Some(mut activity) = self.get_tab_activity(id)? else {
            return Ok(None);
        };
        activity.apply_focus(duration_sec, focused_at);
        self.save_tab_activity(&activity)?;
        Ok(Some(activity))
    }

    /// Lists activities alive at some point in `[start, end]`, newest first.
    ///
    /// Returns an empty list when `end < start`.
    pub fn list_tab_activities_in_range(
        &self,
        start: TimestampMs,
        end: TimestampMs,
    ) -> Result<Vec<TabActivity>, DbError> {
        if end < start {
            return Ok(Vec::new());
        }
        let mut stmt = self.conn.prepare(&format!(
            "
            SELECT {ACTIVITY_COLUMNS}
            FROM tab_activities
            WHERE opened_at <= ? AND COALESCE(closed_at, last_seen_at) >= ?
            ORDER BY opened_at DESC, id ASC
            "
        ))?;
        let rows = stmt.query_map(params![end, start], ActivityRow::from_row)?;
        let mut activities = Vec::new();
        for row in rows {
            activities.push(row?.into_activity()?);
        }
        Ok(activities)
    }

    /// Deletes activities last seen before `cutoff`, returning how many.
    pub fn prune_tab_activities_older_than(
        &mut self,
        cutoff: TimestampMs,
    ) -> Result<usize, DbError> {
        let deleted = self.conn.execute(
            "DELETE FROM tab_activities WHERE last_seen_at < ?",
            params![cutoff],
        )?;
        Ok(deleted)
    }

    // ========== Tab snapshots ==========

    /// Inserts or replaces the snapshot for a tab.
    pub fn upsert_tab_snapshot(&mut self, snapshot: &TabSnapshot) -> Result<(), DbError> {
        self.conn.execute(
            "
            INSERT OR REPLACE INTO tab_snapshots
            (tab_id, window_id, url, title, activity_id, active, last_seen_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ",
            params![
                snapshot.tab_id,
                snapshot.window_id,
                snapshot.url,
                snapshot.title,
                snapshot.activity_id.as_str(),
                snapshot.active,
                snapshot.last_seen_at,
            ],
        )?;
        Ok(())
    }

    pub fn get_tab_snapshot(&self, tab_id: i64) -> Result<Option<TabSnapshot>, DbError> {
        let row = self
            .conn
            .query_row(
                &format!("SELECT {SNAPSHOT_COLUMNS} FROM tab_snapshots WHERE tab_id = ?"),
                params![tab_id],
                SnapshotRow::from_row,
            )
            .optional()?;
        row.map(SnapshotRow::into_snapshot).transpose()
    }

    pub fn delete_tab_snapshot(&mut self, tab_id: i64) -> Result<(), DbError> {
        self.conn
            .execute("DELETE FROM tab_snapshots WHERE tab_id = ?", params![tab_id])?;
        Ok(())
    }

    /// Lists all snapshots ordered by tab id.
    pub fn list_tab_snapshots(&self) -> Result<Vec<TabSnapshot>, DbError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM tab_snapshots ORDER BY tab_id ASC"
        ))?;
        let rows = stmt.query_map([], SnapshotRow::from_row)?;
        let mut snapshots = Vec::new();
        for row in rows {
            snapshots.push(row?.into_snapshot()?);
        }
        Ok(snapshots)
    }

    // ========== Settings ==========

    /// Reads settings, falling back to defaults when none are stored.
    pub fn get_settings(&self) -> Result<Settings, DbError> {
        let stored: Option<String> = self
            .conn
            .query_row(
                "SELECT value FROM settings WHERE key = ?",
                params![SETTINGS_KEY],
                |row| row.get(0),
            )
            .optional()?;
        let Some(stored) = stored else {
            return Ok(Settings::default());
        };
        let settings: Settings = serde_json::from_str(&stored)?;
        Ok(settings.normalized())
    }

    /// Merges `patch` into the stored settings and returns the result.
    pub fn update_settings(&mut self, patch: SettingsPatch) -> Result<Settings, DbError> {
        let next = patch.apply(self.get_settings()?);
        let json = serde_json::to_string(&next)?;
        self.conn.execute(
            "INSERT OR REPLACE INTO settings (key, value) VALUES (?, ?)",
            params![SETTINGS_KEY, json],
        )?;
        tracing::debug!(?next, "updated settings");
        Ok(next)
    }
}

impl RuntimeStore for Database {
    type Error = DbError;

    fn get(&self, key: &str) -> Result<Option<String>, Self::Error> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM runtime_state WHERE key = ?",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn put(&mut self, key: &str, value: &str) -> Result<(), Self::Error> {
        self.conn.execute(
            "INSERT OR REPLACE INTO runtime_state (key, value) VALUES (?, ?)",
            params![key, value],
        )?;
        Ok(())
    }

    fn delete(&mut self, key: &str) -> Result<(), Self::Error> {
        self.conn
            .execute("DELETE FROM runtime_state WHERE key = ?", params![key])?;
        Ok(())
    }
}

const ACTIVITY_COLUMNS: &str = "id, tab_id, window_id, url, title, domain, opened_at, last_seen_at, \
     closed_at, ever_focused, total_focused_sec, focus_count, last_focused_at";

const SNAPSHOT_COLUMNS: &str = "tab_id, window_id, url, title, activity_id, active, last_seen_at";

#[derive(Debug)]
struct SessionRow {
    id: String,
    activity_id: Option<String>,
    tab_id: i64,
    window_id: i64,
    url: String,
    title: String,
    domain: String,
    start_at: i64,
    end_at: i64,
    duration_sec: i64,
    end_reason: String,
}

impl SessionRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            activity_id: row.get(1)?,
            tab_id: row.get(2)?,
            window_id: row.get(3)?,
            url: row.get(4)?,
            title: row.get(5)?,
            domain: row.get(6)?,
            start_at: row.get(7)?,
            end_at: row.get(8)?,
            duration_sec: row.get(9)?,
            end_reason: row.get(10)?,
        })
    }

    fn into_session(self) -> Result<FocusSession, DbError> {
        let id = SessionId::new(self.id).map_err(|err| DbError::InvalidRecord {
            table: "sessions",
            id: String::new(),
            message: err.to_string(),
        })?;
        Ok(FocusSession {
            id,
            activity_id: ActivityId::from_optional(self.activity_id.as_deref()),
            tab_id: self.tab_id,
            window_id: self.window_id,
            url: self.url,
            title: self.title,
            domain: self.domain,
            start_at: self.start_at,
            end_at: self.end_at,
            duration_sec: self.duration_sec,
            end_reason: EndReason::from(self.end_reason),
        })
    }
}

#[derive(Debug)]
struct ActivityRow {
    id: String,
    tab_id: i64,
    window_id: i64,
    url: String,
    title: String,
    domain: String,
    opened_at: i64,
    last_seen_at: i64,
    closed_at: Option<i64>,
    ever_focused: bool,
    total_focused_sec: i64,
    focus_count: i64,
    last_focused_at: Option<i64>,
}

impl ActivityRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            tab_id: row.get(1)?,
            window_id: row.get(2)?,
            url: row.get(3)?,
            title: row.get(4)?,
            domain: row.get(5)?,
            opened_at: row.get(6)?,
            last_seen_at: row.get(7)?,
            closed_at: row.get(8)?,
            ever_focused: row.get(9)?,
            total_focused_sec: row.get(10)?,
            focus_count: row.get(11)?,
            last_focused_at: row.get(12)?,
        })
    }

    fn into_activity(self) -> Result<TabActivity, DbError> {
        let id = ActivityId::new(self.id).map_err(|err| DbError::InvalidRecord {
            table: "tab_activities",
            id: String::new(),
            message: err.to_string(),
        })?;
        Ok(TabActivity {
            id,
            tab_id: self.tab_id,
            window_id: self.window_id,
            url: self.url,
            title: self.title,
            domain: self.domain,
            opened_at: self.opened_at,
            last_seen_at: self.last_seen_at,
            closed_at: self.closed_at,
            ever_focused: self.ever_focused,
            total_focused_sec: self.total_focused_sec,
            focus_count: self.focus_count,
            last_focused_at: self.last_focused_at,
        })
    }
}

#[derive(Debug)]
struct SnapshotRow {
    tab_id: i64,
    window_id: i64,
    url: String,
    title: String,
    activity_id: String,
    active: bool,
    last_seen_at: i64,
}

impl SnapshotRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            tab_id: row.get(0)?,
            window_id: row.get(1)?,
            url: row.get(2)?,
            title: row.get(3)?,
            activity_id: row.get(4)?,
            active: row.get(5)?,
            last_seen_at: row.get(6)?,
        })
    }

    fn into_snapshot(self) -> Result<TabSnapshot, DbError> {
        let activity_id = ActivityId::new(self.activity_id).map_err(|err| DbError::InvalidRecord {
            table: "tab_snapshots",
            id: self.tab_id.to_string(),
            message: err.to_string(),
        })?;
        Ok(TabSnapshot {
            tab_id: self.tab_id,
            window_id: self.window_id,
            url: self.url,
            title: self.title,
            activity_id,
            active: self.active,
            last_seen_at: self.last_seen_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    use tf_core::{
        MemoryStore, RUNTIME_STATE_KEY, SessionEngine, TabContext, Theme, load_runtime_state,
        persist_runtime_state,
    };

    fn session(id: &str, start_at: i64, end_at: i64, domain: &str) -> FocusSession {
        FocusSession {
            id: SessionId::new(id).unwrap(),
            activity_id: None,
            tab_id: 1,
            window_id: 1,
            url: format!("https://{domain}/{id}"),
            title: id.to_uppercase(),
            domain: domain.to_string(),
            start_at,
            end_at,
            duration_sec: tf_core::duration_seconds(start_at, end_at),
            end_reason: EndReason::TabSwitch,
        }
    }

    fn activity(id: &str, opened_at: i64, last_seen_at: i64) -> TabActivity {
        TabActivity {
            id: ActivityId::new(id).unwrap(),
            tab_id: 1,
            window_id: 1,
            url: format!("https://example.com/{id}"),
            title: id.to_string(),
            domain: "example.com".to_string(),
            opened_at,
            last_seen_at,
            closed_at: None,
            ever_focused: false,
            total_focused_sec: 0,
            focus_count: 0,
            last_focused_at: None,
        }
    }

    fn table_columns(conn: &Connection, table: &str) -> Vec<String> {
        let mut stmt = conn
            .prepare(&format!("PRAGMA table_info({table})"))
            .unwrap();
        stmt.query_map([], |row| row.get::<_, String>(1))
            .unwrap()
            .map(Result::unwrap)
            .collect()
    }

    fn index_names(conn: &Connection, table: &str) -> HashSet<String> {
        let mut stmt = conn
            .prepare(&format!("PRAGMA index_list({table})"))
            .unwrap();
        stmt.query_map([], |row| row.get::<_, String>(1))
            .unwrap()
            .map(Result::unwrap)
            .filter(|name| name.starts_with("idx_"))
            .collect()
    }

    #[test]
    fn open_in_memory_database() {
        let db = Database::open_in_memory();
        assert!(db.is_ok());
    }

    #[test]
    fn schema_matches_data_model() {
        let db = Database::open_in_memory().expect("open in-memory db");

        assert_eq!(
            table_columns(&db.conn, "sessions"),
            vec![
                "id",
                "activity_id",
                "tab_id",
                "window_id",
                "url",
                "title",
                "domain",
                "start_at",
                "end_at",
                "duration_sec",
                "end_reason",
            ]
        );

        let expected: HashSet<String> = [
            "idx_sessions_start",
            "idx_sessions_end",
            "idx_sessions_domain_start",
            "idx_sessions_url_start",
        ]
        .into_iter()
        .map(String::from)
        .collect();
        assert_eq!(index_names(&db.conn, "sessions"), expected);
    }

    #[test]
    fn open_is_idempotent_on_disk() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("tf.db");
        {
            let mut db = Database::open(&path).unwrap();
            db.add_session(&session("a", 1_000, 5_000, "example.com"))
                .unwrap();
        }
        let db = Database::open(&path).unwrap();
        assert_eq!(db.list_sessions_in_range(0, 10_000).unwrap().len(), 1);
    }

    #[test]
    fn sessions_in_range_overlap_and_sort_newest_first() {
        let mut db = Database::open_in_memory().unwrap();
        db.add_session(&session("a", 1_000, 5_000, "example.com"))
            .unwrap();
        db.add_session(&session("b", 6_000, 9_000, "example.com"))
            .unwrap();
        db.add_session(&session("c", 10_000, 12_000, "example.com"))
            .unwrap();

        let ids: Vec<String> = db
            .list_sessions_in_range(4_500, 7_500)
            .unwrap()
            .into_iter()
            .map(|s| s.id.to_string())
            .collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[test]
    fn sessions_roundtrip_all_fields() {
        let mut db = Database::open_in_memory().unwrap();
        let mut stored = session("a", 1_000, 5_500, "example.com");
        stored.activity_id = Some(ActivityId::new("act-1").unwrap());
        stored.end_reason = EndReason::Other("init_startup".into());
        db.add_session(&stored).unwrap();

        let loaded = db.list_sessions_in_range(0, 10_000).unwrap();
        assert_eq!(loaded, vec![stored]);
    }

    #[test]
    fn invalid_range_returns_empty() {
        let mut db = Database::open_in_memory().unwrap();
        db.add_session(&session("a", 1_000, 5_000, "example.com"))
            .unwrap();
        db.save_tab_activity(&activity("act", 1_000, 5_000))
            .unwrap();
        assert!(db.list_sessions_in_range(5_000, 1_000).unwrap().is_empty());
        assert!(
            db.list_tab_activities_in_range(5_000, 1_000)
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn tab_activities_filter_by_range() {
        let mut db = Database::open_in_memory().unwrap();
        db.save_tab_activity(&activity("activity-old", 1_000, 2_000))
            .unwrap();
        db.save_tab_activity(&activity("activity-new", 6_000, 7_000))
            .unwrap();

        let ids: Vec<String> = db
            .list_tab_activities_in_range(5_000, 8_000)
            .unwrap()
            .into_iter()
            .map(|a| a.id.to_string())
            .collect();
        assert_eq!(ids, vec!["activity-new"]);
    }

    #[test]
    fn apply_focus_updates_aggregates() {
        let mut db = Database::open_in_memory().unwrap();
        db.save_tab_activity(&activity("activity-focus", 10_000, 10_000))
            .unwrap();

        let updated = db
            .apply_focus_to_tab_activity("activity-focus", 14, 11_200)
            .unwrap()
            .unwrap();
        assert!(updated.ever_focused);
        assert_eq!(updated.total_focused_sec, 14);
        assert_eq!(updated.focus_count, 1);
        assert_eq!(updated.last_focused_at, Some(11_200));
        assert_eq!(updated.last_seen_at, 11_200);

        let stored = db.get_tab_activity("activity-focus").unwrap().unwrap();
        assert_eq!(stored, updated);

        assert!(db.apply_focus_to_tab_activity("missing", 1, 1).unwrap().is_none());
    }

    #[test]
    fn close_tab_activity_sets_closed_at() {
        let mut db = Database::open_in_memory().unwrap();
        db.save_tab_activity(&activity("act", 1_000, 2_000)).unwrap();

        assert!(db.close_tab_activity("act", 3_000).unwrap());
        assert!(!db.close_tab_activity("missing", 3_000).unwrap());
        let stored = db.get_tab_activity("act").unwrap().unwrap();
        assert_eq!(stored.closed_at, Some(3_000));
        assert_eq!(stored.last_seen_at, 3_000);
    }

    #[test]
    fn prune_removes_old_sessions_and_activities() {
        let mut db = Database::open_in_memory().unwrap();
        db.add_session(&session("session-old", 1_000, 2_000, "example.com"))
            .unwrap();
        db.add_session(&session("session-new", 10_000, 11_000, "example.com"))
            .unwrap();
        db.save_tab_activity(&activity("activity-old", 1_000, 2_000))
            .unwrap();
        db.save_tab_activity(&activity("activity-new", 10_000, 11_000))
            .unwrap();

        assert_eq!(db.prune_sessions_older_than(5_000).unwrap(), 1);
        assert_eq!(db.prune_tab_activities_older_than(5_000).unwrap(), 1);

        let sessions = db.list_sessions_in_range(0, 20_000).unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].id.as_str(), "session-new");
        let activities = db.list_tab_activities_in_range(0, 20_000).unwrap();
        assert_eq!(activities.len(), 1);
        assert_eq!(activities[0].id.as_str(), "activity-new");
    }

    #[test]
    fn tab_snapshots_upsert_get_delete() {
        let mut db = Database::open_in_memory().unwrap();
        let tab = TabContext::new(4, 2, "https://a.test/").activated();
        let act = activity("act-4", 1_000, 1_000);
        let snapshot = TabSnapshot::for_activity(&tab, &act, 1_000);

        db.upsert_tab_snapshot(&snapshot).unwrap();
        assert_eq!(db.get_tab_snapshot(1).unwrap(), Some(snapshot.clone()));
        assert_eq!(db.list_tab_snapshots().unwrap(), vec![snapshot]);

        db.delete_tab_snapshot(1).unwrap();
        assert_eq!(db.get_tab_snapshot(1).unwrap(), None);
    }

    #[test]
    fn settings_default_then_merge_and_normalize() {
        let mut db = Database::open_in_memory().unwrap();
        assert_eq!(db.get_settings().unwrap(), Settings::default());

        let updated = db
            .update_settings(SettingsPatch {
                retention_days: Some(0),
                excluded_domains: Some(vec!["Example.com".into(), " example.com ".into()]),
                theme: Some(Theme::Light),
                ..SettingsPatch::default()
            })
            .unwrap();
        assert_eq!(updated.retention_days, 1);
        assert_eq!(updated.excluded_domains, vec!["example.com"]);

        let paused = db
            .update_settings(SettingsPatch {
                paused: Some(true),
                ..SettingsPatch::default()
            })
            .unwrap();
        assert!(paused.paused);
        assert_eq!(paused.theme, Theme::Light);
        assert_eq!(db.get_settings().unwrap(), paused);
    }

    #[test]
    fn runtime_store_backs_engine_checkpoints() {
        let mut db = Database::open_in_memory().unwrap();
        let mut engine = SessionEngine::builder()
            .trackability(|_| true)
            .ids(|| "session-1".to_string())
            .build()
            .unwrap();

        engine.start_or_switch_session_at(&TabContext::new(1, 1, "https://a.test/"), "init", 100);
        persist_runtime_state(&mut db, &engine.export_runtime_state()).unwrap();
        assert!(db.get(RUNTIME_STATE_KEY).unwrap().is_some());

        let loaded = load_runtime_state(&db).unwrap().unwrap();
        let mut memory = MemoryStore::new();
        persist_runtime_state(&mut memory, &engine.export_runtime_state()).unwrap();
        assert_eq!(load_runtime_state(&memory).unwrap(), Some(loaded));

        engine.end_active_session("idle");
        persist_runtime_state(&mut db, &engine.export_runtime_state()).unwrap();
        assert!(db.get(RUNTIME_STATE_KEY).unwrap().is_none());
    }
}
