//! Status command for showing the active session and tracking state.

use std::io::Write;
use std::path::Path;

use anyhow::Result;

use tf_core::{IdleState, TimestampMs, duration_seconds, format_duration};
use tf_db::Database;

use crate::commands::util::{format_timestamp, resume_tracker};
use crate::tracker::RuntimeStatus;

pub fn run<W: Write>(
    writer: &mut W,
    db: Database,
    database_path: &Path,
    debounce_ms: i64,
    json: bool,
    now: TimestampMs,
) -> Result<()> {
    let tracker = resume_tracker(db, debounce_ms)?;
    let status = tracker.status();

    if json {
        writeln!(writer, "{}", serde_json::to_string_pretty(&status)?)?;
        return Ok(());
    }

    let excluded = &tracker.settings().excluded_domains;
    write_status(writer, &status, database_path, excluded, now)
}

fn write_status<W: Write>(
    writer: &mut W,
    status: &RuntimeStatus,
    database_path: &Path,
    excluded: &[String],
    now: TimestampMs,
) -> Result<()> {
    writeln!(writer, "Tab focus tracker status")?;
    writeln!(writer, "Database: {}", database_path.display())?;

    let tracking = if status.paused {
        "paused"
    } else if status.idle_state != IdleState::Active {
        status.idle_state.as_str()
    } else if status.focused_window_id.is_none() {
        "no focused window"
    } else {
        "active"
    };
    writeln!(writer, "Tracking: {tracking}")?;

    match &status.active_session {
        Some(session) => {
            writeln!(writer, "Active session: {} ({})", session.title, session.domain)?;
            writeln!(writer, "  URL: {}", session.url)?;
            writeln!(
                writer,
                "  Started: {} ({} ago)",
                format_timestamp(session.start_at),
                format_duration(duration_seconds(session.start_at, now))
            )?;
        }
        None => writeln!(writer, "Active session: none")?,
    }

    writeln!(writer, "Retention: {} days", status.retention_days)?;
    if excluded.is_empty() {
        writeln!(writer, "Excluded domains: none")?;
    } else {
        writeln!(writer, "Excluded domains: {}", excluded.join(", "))?;
    }
    Ok(())
}
