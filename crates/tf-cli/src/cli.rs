//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Tab focus tracker.
///
/// Turns browser focus events into timed focus sessions and per-tab activity
/// records, and reports where the time went.
#[derive(Debug, Parser)]
#[command(name = "tf", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Feed host events (one JSON object per line) through the tracker.
    Ingest {
        /// Read events from this file instead of stdin.
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Show the active session and tracking state.
    Status {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Summarize recorded focus sessions.
    Report {
        #[command(flatten)]
        range: RangeArgs,

        /// Only include sessions whose title, domain or URL contains this text.
        #[arg(long)]
        search: Option<String>,

        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// List tab activities.
    Activity {
        #[command(flatten)]
        range: RangeArgs,

        /// Which activities to show.
        #[arg(long, value_enum, default_value_t = ActivityViewArg::Meaningful)]
        view: ActivityViewArg,

        /// Only include activities whose title, domain or URL contains this text.
        #[arg(long)]
        search: Option<String>,

        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Delete data older than the retention window.
    Prune {
        /// Reference time in epoch milliseconds (defaults to now).
        #[arg(long)]
        now: Option<i64>,
    },

    /// Show or change settings.
    #[command(subcommand)]
    Settings(SettingsAction),
}

/// Time range selection shared by reporting commands.
#[derive(Debug, Clone, clap::Args)]
pub struct RangeArgs {
    /// Look back this many hours from the end of the range.
    #[arg(long, default_value_t = 24, conflicts_with = "start")]
    pub hours: i64,

    /// Range start in epoch milliseconds.
    #[arg(long)]
    pub start: Option<i64>,

    /// Range end in epoch milliseconds (defaults to now).
    #[arg(long)]
    pub end: Option<i64>,
}

impl RangeArgs {
    /// Resolves to `(start, end)` in epoch milliseconds.
    pub fn resolve(&self, now: i64) -> (i64, i64) {
        let end = self.end.unwrap_or(now);
        let start = self
            .start
            .unwrap_or_else(|| end.saturating_sub(self.hours.saturating_mul(60 * 60 * 1000)));
        (start, end)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ActivityViewArg {
    /// Activities focused for more than the meaningful threshold.
    Meaningful,
    /// Every activity.
    All,
}

/// Settings subcommands.
#[derive(Debug, Subcommand)]
pub enum SettingsAction {
    /// Print current settings.
    Show {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Stop tracking and end the active session.
    Pause,
    /// Resume tracking.
    Resume,
    /// Stop tracking the given domains and their subdomains.
    Exclude {
        #[arg(required = true)]
        domains: Vec<String>,
    },
    /// Remove domains from the exclusion list.
    Include {
        #[arg(required = true)]
        domains: Vec<String>,
    },
    /// Set how many days of history to keep.
    Retention { days: i64 },
    /// Set the dashboard theme.
    Theme {
        #[arg(value_parser = ["dark", "light"])]
        theme: String,
    },
}
