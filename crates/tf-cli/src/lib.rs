//! Tab focus tracker CLI library.
//!
//! This crate wires the session engine to storage and a host, and provides
//! the command-line interface on top of them.

mod cli;
pub mod commands;
mod config;
pub mod host;
pub mod tracker;

pub use cli::{ActivityViewArg, Cli, Commands, RangeArgs, SettingsAction};
pub use config::Config;
