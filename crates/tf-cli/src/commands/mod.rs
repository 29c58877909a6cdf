//! CLI subcommand implementations.

pub mod activity;
pub mod ingest;
pub mod prune;
pub mod report;
pub mod settings;
pub mod status;
pub mod util;
