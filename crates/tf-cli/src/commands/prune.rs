//! Prune command for applying the retention window.

use std::io::Write;

use anyhow::{Context, Result};

use tf_core::TimestampMs;
use tf_db::Database;

use crate::commands::util::format_timestamp;
use crate::tracker::{CleanupReport, run_retention_cleanup};

pub fn run<W: Write>(writer: &mut W, db: &mut Database, now: TimestampMs) -> Result<CleanupReport> {
    let settings = db.get_settings()?;
    let report =
        run_retention_cleanup(db, &settings, now).context("failed to run retention cleanup")?;

    writeln!(
        writer,
        "Removed {} sessions, {} activities, {} tab snapshots older than {}",
        report.sessions,
        report.activities,
        report.snapshots,
        format_timestamp(report.cutoff)
    )?;
    Ok(report)
}
