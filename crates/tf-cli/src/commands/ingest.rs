//! Ingest command for feeding host events through the tracker.
//!
//! Events arrive as JSON lines, one [`TimedEvent`] per line. Each line is
//! shown to the replay host and then handled by the tracker. Lines that do
//! not parse are logged and skipped; a failing event is logged and the rest
//! of the stream is still processed.

use std::io::{BufRead, Write};

use anyhow::{Context, Result};

use tf_db::Database;

use crate::commands::util::resume_tracker;
use crate::host::TimedEvent;

/// Counts of what happened to each input line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestSummary {
    pub handled: usize,
    pub skipped: usize,
    pub failed: usize,
}

pub fn run<R: BufRead, W: Write>(
    reader: R,
    writer: &mut W,
    db: Database,
    debounce_ms: i64,
) -> Result<IngestSummary> {
    let mut tracker = resume_tracker(db, debounce_ms)?;
    let mut summary = IngestSummary::default();

    for (index, line) in reader.lines().enumerate() {
        let line_no = index + 1;
        let line = line.context("failed to read input")?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let event: TimedEvent = match serde_json::from_str(line) {
            Ok(event) => event,
            Err(err) => {
                tracing::warn!(line_no, error = %err, "skipping malformed event");
                summary.skipped += 1;
                continue;
            }
        };

        match tracker.replay(&event) {
            Ok(()) => summary.handled += 1,
            Err(err) => {
                tracing::error!(line_no, error = %err, "failed to handle event");
                summary.failed += 1;
            }
        }
    }

    tracker.save_host().context("failed to save host state")?;

    writeln!(
        writer,
        "Ingested {} events ({} skipped, {} failed)",
        summary.handled, summary.skipped, summary.failed
    )?;
    Ok(summary)
}
