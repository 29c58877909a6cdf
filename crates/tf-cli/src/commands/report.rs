//! Report command for summarizing recorded focus sessions.
//!
//! Sessions overlapping the requested range are optionally filtered by a
//! search term, then totalled per domain. Output is human-readable or JSON.

use std::collections::HashMap;
use std::io::Write;

use anyhow::Result;
use serde::Serialize;

use tf_core::{FocusSession, TimestampMs, format_duration};
use tf_db::Database;

use crate::commands::util::format_timestamp;

/// Number of sessions listed in the human-readable report.
const MAX_LISTED_SESSIONS: usize = 20;

/// Focus time on one domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainTotal {
    pub domain: String,
    pub sessions: usize,
    pub total_sec: i64,
}

/// Computed report data.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportData {
    pub start: TimestampMs,
    pub end: TimestampMs,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    pub total_sec: i64,
    pub domains: Vec<DomainTotal>,
    /// Newest first.
    pub sessions: Vec<FocusSession>,
}

/// Totals session durations per domain, longest first.
pub fn domain_totals(sessions: &[FocusSession]) -> Vec<DomainTotal> {
    let mut by_domain: HashMap<&str, DomainTotal> = HashMap::new();
    for session in sessions {
        let entry = by_domain
            .entry(session.domain.as_str())
            .or_insert_with(|| DomainTotal {
                domain: session.domain.clone(),
                sessions: 0,
                total_sec: 0,
            });
        entry.sessions += 1;
        entry.total_sec += session.duration_sec;
    }

    let mut totals: Vec<_> = by_domain.into_values().collect();
    totals.sort_by(|a, b| {
        b.total_sec
            .cmp(&a.total_sec)
            .then_with(|| a.domain.cmp(&b.domain))
    });
    totals
}

/// Generates report data from the database.
pub fn generate_report_data(
    db: &Database,
    start: TimestampMs,
    end: TimestampMs,
    search: Option<&str>,
) -> Result<ReportData> {
    let mut sessions = db.list_sessions_in_range(start, end)?;
    if let Some(query) = search {
        sessions.retain(|session| session.matches_search(query));
    }

    Ok(ReportData {
        start,
        end,
        search: search.map(str::to_string),
        total_sec: sessions.iter().map(|session| session.duration_sec).sum(),
        domains: domain_totals(&sessions),
        sessions,
    })
}

/// Generates a 10-character bar showing `value` as a share of `max`.
#[expect(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    reason = "bar width is a small ratio of non-negative totals"
)]
fn share_bar(value: i64, max: i64) -> String {
    if max <= 0 {
        return "░".repeat(10);
    }
    let filled = ((value as f64 / max as f64) * 10.0).round().clamp(0.0, 10.0) as usize;
    let filled = if value > 0 { filled.max(1) } else { filled };
    format!("{}{}", "█".repeat(filled), "░".repeat(10 - filled))
}

pub fn write_report<W: Write>(writer: &mut W, data: &ReportData) -> Result<()> {
    writeln!(
        writer,
        "FOCUS REPORT: {} .. {}",
        format_timestamp(data.start),
        format_timestamp(data.end)
    )?;
    if let Some(search) = &data.search {
        writeln!(writer, "Search: {search}")?;
    }

    if data.sessions.is_empty() {
        writeln!(writer)?;
        writeln!(writer, "No focus sessions recorded in this range.")?;
        return Ok(());
    }

    writeln!(
        writer,
        "{} sessions, {} total",
        data.sessions.len(),
        format_duration(data.total_sec)
    )?;

    writeln!(writer)?;
    writeln!(writer, "BY DOMAIN")?;
    writeln!(writer, "─────────")?;
    let max = data.domains.first().map_or(0, |top| top.total_sec);
    for total in &data.domains {
        writeln!(
            writer,
            "{:<24} {:>8}  {}  ({} sessions)",
            total.domain,
            format_duration(total.total_sec),
            share_bar(total.total_sec, max),
            total.sessions
        )?;
    }

    writeln!(writer)?;
    writeln!(writer, "SESSIONS")?;
    writeln!(writer, "────────")?;
    for session in data.sessions.iter().take(MAX_LISTED_SESSIONS) {
        writeln!(
            writer,
            "{}  {:>8}  {}  {}",
            format_timestamp(session.start_at),
            format_duration(session.duration_sec),
            session.domain,
            session.title
        )?;
    }
    let remaining = data.sessions.len().saturating_sub(MAX_LISTED_SESSIONS);
    if remaining > 0 {
        writeln!(writer, "... and {remaining} more")?;
    }
    Ok(())
}

pub fn run<W: Write>(
    writer: &mut W,
    db: &Database,
    start: TimestampMs,
    end: TimestampMs,
    search: Option<&str>,
    json: bool,
) -> Result<()> {
    let data = generate_report_data(db, start, end, search)?;
    if json {
        writeln!(writer, "{}", serde_json::to_string_pretty(&data)?)?;
    } else {
        write_report(writer, &data)?;
    }
    Ok(())
}
