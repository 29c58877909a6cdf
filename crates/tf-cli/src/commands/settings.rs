//! Settings command for showing and changing tracking settings.
//!
//! Changes that affect tracking are followed by a `settings_updated` event
//! so the tracker can end or restart the active session right away.

use std::io::Write;

use anyhow::{Context, Result};

use tf_core::{Settings, SettingsPatch, Theme, TimestampMs};
use tf_db::Database;

use crate::cli::SettingsAction;
use crate::commands::util::resume_tracker;
use crate::host::{HostEvent, TimedEvent};

pub fn write_settings<W: Write>(writer: &mut W, settings: &Settings) -> Result<()> {
    writeln!(
        writer,
        "Tracking: {}",
        if settings.paused { "paused" } else { "on" }
    )?;
    writeln!(writer, "Retention: {} days", settings.retention_days)?;
    writeln!(writer, "Theme: {}", settings.theme)?;
    if settings.excluded_domains.is_empty() {
        writeln!(writer, "Excluded domains: none")?;
    } else {
        writeln!(writer, "Excluded domains:")?;
        for domain in &settings.excluded_domains {
            writeln!(writer, "  {domain}")?;
        }
    }
    Ok(())
}

/// Turns a mutating action into a patch against `current`.
///
/// Returns `None` for [`SettingsAction::Show`].
fn patch_for(action: SettingsAction, current: &Settings) -> Option<SettingsPatch> {
    let patch = match action {
        SettingsAction::Show { .. } => return None,
        SettingsAction::Pause => SettingsPatch {
            paused: Some(true),
            ..SettingsPatch::default()
        },
        SettingsAction::Resume => SettingsPatch {
            paused: Some(false),
            ..SettingsPatch::default()
        },
        SettingsAction::Exclude { domains } => {
            let mut excluded = current.excluded_domains.clone();
            excluded.extend(domains);
            SettingsPatch {
                excluded_domains: Some(excluded),
                ..SettingsPatch::default()
            }
        }
        SettingsAction::Include { domains } => {
            let removed: Vec<String> = domains
                .iter()
                .map(|domain| domain.trim().to_lowercase())
                .collect();
            let excluded = current
                .excluded_domains
                .iter()
                .filter(|domain| !removed.contains(domain))
                .cloned()
                .collect();
            SettingsPatch {
                excluded_domains: Some(excluded),
                ..SettingsPatch::default()
            }
        }
        SettingsAction::Retention { days } => SettingsPatch {
            retention_days: Some(days),
            ..SettingsPatch::default()
        },
        SettingsAction::Theme { theme } => SettingsPatch {
            theme: Some(Theme::parse_lenient(&theme)),
            ..SettingsPatch::default()
        },
    };
    Some(patch)
}

pub fn run<W: Write>(
    writer: &mut W,
    mut db: Database,
    action: SettingsAction,
    debounce_ms: i64,
    now: TimestampMs,
) -> Result<Settings> {
    let current = db.get_settings()?;

    if let SettingsAction::Show { json } = action {
        if json {
            writeln!(writer, "{}", serde_json::to_string_pretty(&current)?)?;
        } else {
            write_settings(writer, &current)?;
        }
        return Ok(current);
    }

    let theme_only = matches!(action, SettingsAction::Theme { .. });
    let Some(patch) = patch_for(action, &current) else {
        return Ok(current);
    };
    let updated = db
        .update_settings(patch)
        .context("failed to update settings")?;

    if !theme_only {
        let mut tracker = resume_tracker(db, debounce_ms)?;
        tracker
            .replay(&TimedEvent::new(HostEvent::SettingsUpdated, now))
            .context("failed to apply settings")?;
        tracker.save_host().context("failed to save host state")?;
    }

    writeln!(writer, "Settings updated.")?;
    write_settings(writer, &updated)?;
    Ok(updated)
}

#[cfg(test)]
mod tests {
    use super::*;

    use insta::assert_snapshot;
    use tf_core::EndReason;

    use crate::commands::ingest;

    fn start_session(db_path: &std::path::Path) {
        let events = r#"
{"type":"tab_created","tab":{"id":1,"windowId":1,"url":"https://docs.test/","title":"Docs","active":true},"at":0}
{"type":"window_focus_changed","windowId":1,"at":1000}
"#;
        let mut sink = Vec::new();
        ingest::run(events.as_bytes(), &mut sink, Database::open(db_path).unwrap(), 250).unwrap();
    }

    #[test]
    fn show_prints_defaults() {
        let db = Database::open_in_memory().unwrap();
        let mut output = Vec::new();
        run(&mut output, db, SettingsAction::Show { json: false }, 250, 0).unwrap();
        assert_snapshot!(String::from_utf8(output).unwrap(), @r"
        Tracking: on
        Retention: 30 days
        Theme: dark
        Excluded domains: none
        ");
    }

    #[test]
    fn show_json_uses_camel_case() {
        let db = Database::open_in_memory().unwrap();
        let mut output = Vec::new();
        run(&mut output, db, SettingsAction::Show { json: true }, 250, 0).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&output).unwrap();
        assert_eq!(value["retentionDays"], 30);
        assert_eq!(value["excludedDomains"], serde_json::json!([]));
        assert_eq!(value["theme"], "dark");
    }

    #[test]
    fn pause_ends_the_active_session() {
        let temp = tempfile::tempdir().unwrap();
        let db_path = temp.path().join("tf.db");
        start_session(&db_path);

        let mut output = Vec::new();
        let settings = run(
            &mut output,
            Database::open(&db_path).unwrap(),
            SettingsAction::Pause,
            250,
            21_000,
        )
        .unwrap();
        assert!(settings.paused);

        let db = Database::open(&db_path).unwrap();
        let sessions = db.list_sessions_in_range(0, 100_000).unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].duration_sec, 20);
        assert_eq!(sessions[0].end_reason, EndReason::TrackingPaused);
    }

    #[test]
    fn excluding_the_active_domain_ends_its_session() {
        let temp = tempfile::tempdir().unwrap();
        let db_path = temp.path().join("tf.db");
        start_session(&db_path);

        let mut output = Vec::new();
        let settings = run(
            &mut output,
            Database::open(&db_path).unwrap(),
            SettingsAction::Exclude {
                domains: vec!["Docs.Test".into()],
            },
            250,
            11_000,
        )
        .unwrap();
        assert_eq!(settings.excluded_domains, vec!["docs.test"]);

        let db = Database::open(&db_path).unwrap();
        let sessions = db.list_sessions_in_range(0, 100_000).unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].duration_sec, 10);
    }

    #[test]
    fn include_removes_domains() {
        let mut db = Database::open_in_memory().unwrap();
        db.update_settings(SettingsPatch {
            excluded_domains: Some(vec!["a.test".into(), "b.test".into()]),
            ..SettingsPatch::default()
        })
        .unwrap();

        let mut output = Vec::new();
        let settings = run(
            &mut output,
            db,
            SettingsAction::Include {
                domains: vec!["A.test".into()],
            },
            250,
            0,
        )
        .unwrap();
        assert_eq!(settings.excluded_domains, vec!["b.test"]);
        assert_snapshot!(String::from_utf8(output).unwrap(), @r"
        Settings updated.
        Tracking: on
        Retention: 30 days
        Theme: dark
        Excluded domains:
          b.test
        ");
    }

    #[test]
    fn theme_and_retention_are_stored() {
        let temp = tempfile::tempdir().unwrap();
        let db_path = temp.path().join("tf.db");

        let mut sink = Vec::new();
        run(
            &mut sink,
            Database::open(&db_path).unwrap(),
            SettingsAction::Theme {
                theme: "light".into(),
            },
            250,
            0,
        )
        .unwrap();
        run(
            &mut sink,
            Database::open(&db_path).unwrap(),
            SettingsAction::Retention { days: 0 },
            250,
            0,
        )
        .unwrap();

        let settings = Database::open(&db_path).unwrap().get_settings().unwrap();
        assert_eq!(settings.theme, Theme::Light);
        assert_eq!(settings.retention_days, 1);
    }
}
