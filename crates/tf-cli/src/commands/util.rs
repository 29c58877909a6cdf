//! Shared utilities for CLI commands.

use std::fs::{self, File};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use fs2::FileExt;

use tf_core::{SessionEngine, SessionEngineBuilder, TimestampMs};
use tf_db::Database;

use crate::Config;
use crate::host::ReplayHost;
use crate::tracker::Tracker;

/// Formats epoch milliseconds as a UTC timestamp.
pub fn format_timestamp(ms: TimestampMs) -> String {
    DateTime::<Utc>::from_timestamp_millis(ms).map_or_else(
        || ms.to_string(),
        |dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

/// Takes the exclusive writer lock for the configured database.
///
/// The lock is held until the returned file is dropped.
pub fn lock_database(config: &Config) -> Result<File> {
    let path = config.lock_path();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("failed to create database directory")?;
    }
    let lock_file = File::create(&path)
        .with_context(|| format!("failed to create lock file {}", path.display()))?;
    lock_file
        .lock_exclusive()
        .context("failed to acquire lock")?;
    Ok(lock_file)
}

pub fn engine_builder(debounce_ms: i64) -> SessionEngineBuilder {
    SessionEngine::builder().debounce_ms(debounce_ms)
}

/// Builds a tracker over the replay host saved in `db` and resumes the
/// checkpointed session.
pub fn resume_tracker(db: Database, debounce_ms: i64) -> Result<Tracker<ReplayHost>> {
    let host = ReplayHost::load(&db).context("failed to load host state")?;
    let mut tracker = Tracker::new(db, host, engine_builder(debounce_ms))
        .context("failed to start tracker")?;
    let restored = tracker.resume().context("failed to restore runtime state")?;
    tracing::debug!(restored, "resumed tracker");
    Ok(tracker)
}
