//! Activity command for listing per-tab activity records.

use std::io::Write;

use anyhow::Result;

use tf_core::{ActivityView, TabActivity, TimestampMs, format_duration};
use tf_db::Database;

use crate::cli::ActivityViewArg;
use crate::commands::util::format_timestamp;

impl From<ActivityViewArg> for ActivityView {
    fn from(arg: ActivityViewArg) -> Self {
        match arg {
            ActivityViewArg::Meaningful => Self::Meaningful,
            ActivityViewArg::All => Self::All,
        }
    }
}

/// Loads activities alive in `[start, end]`, filtered and ordered for `view`.
pub fn list_activities(
    db: &Database,
    start: TimestampMs,
    end: TimestampMs,
    view: ActivityView,
    search: Option<&str>,
) -> Result<Vec<TabActivity>> {
    let mut activities = db.list_tab_activities_in_range(start, end)?;
    if let Some(query) = search {
        activities.retain(|activity| activity.matches_search(query));
    }
    view.apply(&mut activities);
    Ok(activities)
}

pub fn run<W: Write>(
    writer: &mut W,
    db: &Database,
    start: TimestampMs,
    end: TimestampMs,
    view: ActivityView,
    search: Option<&str>,
    json: bool,
) -> Result<()> {
    let activities = list_activities(db, start, end, view, search)?;

    if json {
        writeln!(writer, "{}", serde_json::to_string_pretty(&activities)?)?;
        return Ok(());
    }

    if activities.is_empty() {
        writeln!(writer, "No tab activity in this range.")?;
        return Ok(());
    }

    for activity in &activities {
        let state = if activity.closed_at.is_some() {
            "closed"
        } else {
            "open"
        };
        writeln!(
            writer,
            "{:<6}  {:>8}  {:>3}x  {}  {}",
            state,
            format_duration(activity.total_focused_sec),
            activity.focus_count,
            activity.domain,
            activity.title
        )?;
        writeln!(
            writer,
            "        opened {}, last seen {}",
            format_timestamp(activity.opened_at),
            format_timestamp(activity.last_seen_at)
        )?;
    }
    Ok(())
}
