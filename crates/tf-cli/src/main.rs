use std::fs::File;
use std::io::{self, BufReader};
use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use tf_cli::commands::{activity, ingest, prune, report, settings, status, util};
use tf_cli::{Cli, Commands, Config, SettingsAction};

/// Load config and open database, ensuring the parent directory exists.
fn open_database(config_path: Option<&Path>) -> Result<(tf_db::Database, Config)> {
    let config = Config::load_from(config_path).context("failed to load configuration")?;
    tracing::debug!(?config, "loaded configuration");

    if let Some(parent) = config.database_path.parent() {
        std::fs::create_dir_all(parent).context("failed to create database directory")?;
    }

    let db = tf_db::Database::open(&config.database_path).context("failed to open database")?;
    Ok((db, config))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    // Logs go to stderr so command output stays parseable.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    let now = chrono::Utc::now().timestamp_millis();
    let mut stdout = io::stdout().lock();

    match cli.command {
        Some(Commands::Ingest { file }) => {
            let (db, config) = open_database(cli.config.as_deref())?;
            let _lock = util::lock_database(&config)?;
            match file {
                Some(path) => {
                    let input = File::open(&path)
                        .with_context(|| format!("failed to open {}", path.display()))?;
                    ingest::run(BufReader::new(input), &mut stdout, db, config.debounce_ms)?;
                }
                None => {
                    ingest::run(io::stdin().lock(), &mut stdout, db, config.debounce_ms)?;
                }
            }
        }
        Some(Commands::Status { json }) => {
            let (db, config) = open_database(cli.config.as_deref())?;
            status::run(
                &mut stdout,
                db,
                &config.database_path,
                config.debounce_ms,
                json,
                now,
            )?;
        }
        Some(Commands::Report {
            range,
            search,
            json,
        }) => {
            let (db, _config) = open_database(cli.config.as_deref())?;
            let (start, end) = range.resolve(now);
            report::run(&mut stdout, &db, start, end, search.as_deref(), json)?;
        }
        Some(Commands::Activity {
            range,
            view,
            search,
            json,
        }) => {
            let (db, _config) = open_database(cli.config.as_deref())?;
            let (start, end) = range.resolve(now);
            activity::run(
                &mut stdout,
                &db,
                start,
                end,
                view.into(),
                search.as_deref(),
                json,
            )?;
        }
        Some(Commands::Prune { now: at }) => {
            let (mut db, config) = open_database(cli.config.as_deref())?;
            let _lock = util::lock_database(&config)?;
            prune::run(&mut stdout, &mut db, at.unwrap_or(now))?;
        }
        Some(Commands::Settings(action)) => {
            let (db, config) = open_database(cli.config.as_deref())?;
            let _lock = match action {
                SettingsAction::Show { .. } => None,
                _ => Some(util::lock_database(&config)?),
            };
            settings::run(&mut stdout, db, action, config.debounce_ms, now)?;
        }
        None => {
            use clap::CommandFactory;
            Cli::command().print_help()?;
            println!();
        }
    }

    Ok(())
}
