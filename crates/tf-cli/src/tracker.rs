//! Event orchestration.
//!
//! The [`Tracker`] turns host events into calls on the session engine and
//! keeps storage in step: every engine call is followed by a runtime-state
//! checkpoint, then the ended session (if any) is appended to the session log
//! and credited to its tab activity. Tab activities and snapshots are kept
//! current for every trackable tab, focused or not.
//!
//! Events are handled one at a time; each handler runs to completion before
//! the next event is looked at.

use std::collections::HashSet;

use serde::Serialize;
use thiserror::Error;

use tf_core::{
    EndOptions, EndReason, EngineError, FocusSession, IdGenerator, IdleState,
    MEANINGFUL_THRESHOLD_SEC, PersistenceError, SessionEngine, SessionEngineBuilder, Settings,
    TabActivity, TabChange, TabContext, TabSnapshot, Theme, TimestampMs, TrackabilityClassifier,
    UuidGenerator, load_runtime_state, persist_runtime_state,
};
use tf_db::{Database, DbError};

use crate::host::{Host, HostError, HostEvent, ReplayHost, TimedEvent, focused_window};

/// Errors raised while handling an event.
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error(transparent)]
    Db(#[from] DbError),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Host(#[from] HostError),
}

/// Rows removed by a retention sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupReport {
    pub cutoff: TimestampMs,
    pub sessions: usize,
    pub activities: usize,
    pub snapshots: usize,
}

/// Deletes sessions, activities and snapshots older than the retention window.
pub fn run_retention_cleanup(
    db: &mut Database,
    settings: &Settings,
    now: TimestampMs,
) -> Result<CleanupReport, DbError> {
    let cutoff = now.saturating_sub(settings.retention_ms());
    let sessions = db.prune_sessions_older_than(cutoff)?;
    let activities = db.prune_tab_activities_older_than(cutoff)?;

    let mut snapshots = 0;
    for snapshot in db.list_tab_snapshots()? {
        let stale = db
            .get_tab_activity(snapshot.activity_id.as_str())?
            .is_none_or(|activity| activity.last_seen_at < cutoff);
        if stale {
            db.delete_tab_snapshot(snapshot.tab_id)?;
            snapshots += 1;
        }
    }

    tracing::debug!(cutoff, sessions, activities, snapshots, "retention cleanup");
    Ok(CleanupReport {
        cutoff,
        sessions,
        activities,
        snapshots,
    })
}

/// What the tracker is doing right now.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeStatus {
    pub active_session: Option<FocusSession>,
    pub paused: bool,
    pub retention_days: i64,
    pub idle_state: IdleState,
    pub theme: Theme,
    pub focused_window_id: Option<i64>,
    pub meaningful_threshold_sec: i64,
}

/// Feeds host events into the session engine and storage.
pub struct Tracker<H> {
    db: Database,
    host: H,
    engine: SessionEngine,
    classifier: TrackabilityClassifier,
    settings: Settings,
    focused_window: Option<i64>,
    idle_state: IdleState,
    activity_ids: Box<dyn IdGenerator>,
}

impl<H> std::fmt::Debug for Tracker<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tracker")
            .field("engine", &self.engine)
            .field("settings", &self.settings)
            .field("focused_window", &self.focused_window)
            .field("idle_state", &self.idle_state)
            .finish_non_exhaustive()
    }
}

impl<H: Host> Tracker<H> {
    /// Builds a tracker over `db` and `host`.
    ///
    /// The engine's trackability predicate is supplied here; `engine` carries
    /// the remaining engine options. Settings are read from `db`.
    pub fn new(db: Database, host: H, engine: SessionEngineBuilder) -> Result<Self, TrackerError> {
        let settings = db.get_settings()?;
        let classifier = TrackabilityClassifier::new(&settings.excluded_domains);
        let predicate = classifier.clone();
        let engine = engine
            .trackability(move |tab| predicate.is_trackable(tab))
            .build()?;

        Ok(Self {
            db,
            host,
            engine,
            classifier,
            settings,
            focused_window: None,
            idle_state: IdleState::Active,
            activity_ids: Box::new(UuidGenerator),
        })
    }

    /// Replaces the generator used for activity id suffixes.
    #[must_use]
    pub fn with_activity_ids(mut self, ids: impl IdGenerator + 'static) -> Self {
        self.activity_ids = Box::new(ids);
        self
    }

    pub const fn database(&self) -> &Database {
        &self.db
    }

    pub const fn host(&self) -> &H {
        &self.host
    }

    pub const fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub const fn settings(&self) -> &Settings {
        &self.settings
    }

    pub const fn engine(&self) -> &SessionEngine {
        &self.engine
    }

    /// Gives back the database and host.
    pub fn into_parts(self) -> (Database, H) {
        (self.db, self.host)
    }

    /// Picks up where a previous process left off.
    ///
    /// Restores the checkpointed engine state and reads focus and idle state
    /// from the host. Returns whether a checkpoint was found.
    pub fn resume(&mut self) -> Result<bool, TrackerError> {
        let restored = self.load_runtime_state()?;
        self.refresh_host_state();
        Ok(restored)
    }

    pub fn status(&self) -> RuntimeStatus {
        RuntimeStatus {
            active_session: self.engine.active_session().cloned(),
            paused: self.settings.paused,
            retention_days: self.settings.retention_days,
            idle_state: self.idle_state,
            theme: self.settings.theme,
            focused_window_id: self.focused_window,
            meaningful_threshold_sec: MEANINGFUL_THRESHOLD_SEC,
        }
    }

    /// Handles one event. Events without a timestamp use the engine clock.
    pub fn handle(&mut self, timed: &TimedEvent) -> Result<(), TrackerError> {
        let now = timed.at.unwrap_or_else(|| self.engine.now_ms());
        tracing::debug!(event = ?timed.event, now, "handling host event");

        match &timed.event {
            HostEvent::TabCreated { tab } => {
                self.ensure_tracked_context(tab, now)?;
            }
            HostEvent::TabActivated { .. } => {
                self.sync_current_active_context(EndReason::TabSwitch, now)?;
            }
            HostEvent::TabUpdated {
                tab_id,
                change,
                tab,
            } => self.on_tab_updated(*tab_id, change, tab, now)?,
            HostEvent::TabRemoved { tab_id } => self.on_tab_removed(*tab_id, now)?,
            HostEvent::WindowFocusChanged { window_id } => {
                self.focused_window = focused_window(*window_id);
                if self.focused_window.is_some() {
                    self.sync_current_active_context(EndReason::WindowFocus, now)?;
                } else {
                    self.end_active_session(EndReason::WindowBlur, now)?;
                }
            }
            HostEvent::IdleStateChanged { state } => {
                self.idle_state = *state;
                match state {
                    IdleState::Active => {
                        self.sync_current_active_context("idle_back_active".into(), now)?;
                    }
                    IdleState::Idle => {
                        self.end_active_session(EndReason::Idle, now)?;
                    }
                    IdleState::Locked => {
                        self.end_active_session(EndReason::Lock, now)?;
                    }
                }
            }
            HostEvent::SettingsUpdated => self.on_settings_updated(now)?,
            HostEvent::Startup { reason } => self.startup(reason, now)?,
            HostEvent::RetentionCleanup => {
                run_retention_cleanup(&mut self.db, &self.settings, now)?;
            }
        }
        Ok(())
    }

    /// Full initialization: settings, checkpoint, open tabs, retention and
    /// the current focus.
    fn startup(&mut self, reason: &str, now: TimestampMs) -> Result<(), TrackerError> {
        self.refresh_settings()?;
        self.load_runtime_state()?;
        self.ensure_tracked_contexts_for_open_tabs(now)?;
        run_retention_cleanup(&mut self.db, &self.settings, now)?;
        self.refresh_host_state();
        self.sync_current_active_context(EndReason::from(format!("init_{reason}")), now)?;
        tracing::info!(reason, "tracker initialized");
        Ok(())
    }

    fn on_tab_updated(
        &mut self,
        tab_id: i64,
        change: &TabChange,
        tab: &TabContext,
        now: TimestampMs,
    ) -> Result<(), TrackerError> {
        // The event may carry only the change, so prefer the host's view.
        let tab = match self.host.tab(tab_id)? {
            Some(known) => known,
            None => TabContext {
                id: Some(tab_id),
                ..tab.clone()
            },
        };
        self.ensure_tracked_context(&tab, now)?;

        if self.engine.update_active_session_metadata(tab_id, change) {
            self.persist()?;
        }

        let in_focused_window = tab.window_id.is_some() && tab.window_id == self.focused_window;
        if tab.active && in_focused_window && (change.new_url().is_some() || change.is_complete())
        {
            self.sync_current_active_context(EndReason::Navigation, now)?;
        }
        Ok(())
    }

    fn on_tab_removed(&mut self, tab_id: i64, now: TimestampMs) -> Result<(), TrackerError> {
        let was_active = self
            .engine
            .active_session()
            .is_some_and(|session| session.tab_id == tab_id);

        self.close_tracked_context(tab_id, now)?;
        if was_active {
            self.end_active_session(EndReason::TabClosed, now)?;
            self.sync_current_active_context(EndReason::TabClosed, now)?;
        }
        Ok(())
    }

    fn on_settings_updated(&mut self, now: TimestampMs) -> Result<(), TrackerError> {
        self.refresh_settings()?;
        self.ensure_tracked_contexts_for_open_tabs(now)?;
        if self.settings.paused {
            self.end_active_session(EndReason::TrackingPaused, now)?;
        } else {
            self.sync_current_active_context("settings_updated".into(), now)?;
        }
        Ok(())
    }

    /// Re-reads settings and pushes the exclusion list to the classifier.
    fn refresh_settings(&mut self) -> Result<(), TrackerError> {
        self.settings = self.db.get_settings()?;
        self.classifier
            .set_excluded_domains(&self.settings.excluded_domains);
        Ok(())
    }

    fn refresh_host_state(&mut self) {
        self.focused_window = match self.host.last_focused_window() {
            Ok(window_id) => focused_window(window_id),
            Err(err) => {
                tracing::warn!(error = %err, "failed to read focused window");
                None
            }
        };
        self.idle_state = self.host.idle_state().unwrap_or_else(|err| {
            tracing::warn!(error = %err, "failed to read idle state");
            IdleState::Active
        });
    }

    fn load_runtime_state(&mut self) -> Result<bool, TrackerError> {
        let Some(stored) = load_runtime_state(&self.db)? else {
            return Ok(false);
        };
        Ok(self.engine.hydrate_runtime_state(&stored))
    }

    /// Starts, switches or ends the session to match the focused tab.
    fn sync_current_active_context(
        &mut self,
        reason: EndReason,
        now: TimestampMs,
    ) -> Result<(), TrackerError> {
        let window_id = match self.focused_window {
            Some(window_id) if !self.settings.paused && self.idle_state == IdleState::Active => {
                window_id
            }
            _ => {
                self.end_active_session(reason, now)?;
                return Ok(());
            }
        };

        let tab = match self.host.active_tab(window_id) {
            Ok(Some(tab)) => tab,
            Ok(None) => {
                self.end_active_session(reason, now)?;
                return Ok(());
            }
            Err(err) => {
                tracing::warn!(error = %err, window_id, "failed to resolve active tab");
                self.end_active_session(EndReason::Unknown, now)?;
                return Ok(());
            }
        };

        let Some(snapshot) = self.ensure_tracked_context(&tab, now)? else {
            self.end_active_session(reason, now)?;
            return Ok(());
        };

        let tab = TabContext {
            activity_id: Some(snapshot.activity_id.to_string()),
            ..tab
        };
        let transition = self.engine.start_or_switch_session_at(&tab, reason, now);
        tracing::debug!(kind = %transition.kind, "session transition");
        self.persist()?;
        self.store_ended_session(transition.ended_session)
    }

    fn end_active_session(
        &mut self,
        reason: EndReason,
        now: TimestampMs,
    ) -> Result<(), TrackerError> {
        let ended = self
            .engine
            .end_active_session_at(reason, now, EndOptions::default());
        self.persist()?;
        self.store_ended_session(ended)
    }

    fn persist(&mut self) -> Result<(), TrackerError> {
        persist_runtime_state(&mut self.db, &self.engine.export_runtime_state())?;
        Ok(())
    }

    /// Appends an ended session and credits its tab activity.
    fn store_ended_session(&mut self, session: Option<FocusSession>) -> Result<(), TrackerError> {
        let Some(session) = session.filter(FocusSession::is_recordable) else {
            return Ok(());
        };

        self.db.add_session(&session)?;
        if let Some(activity_id) = &session.activity_id {
            self.db.apply_focus_to_tab_activity(
                activity_id.as_str(),
                session.duration_sec,
                session.end_at,
            )?;
        }
        tracing::info!(
            session = %session.id,
            domain = %session.domain,
            duration_sec = session.duration_sec,
            reason = %session.end_reason,
            "recorded focus session"
        );
        Ok(())
    }

    /// Keeps the activity and snapshot for `tab` current.
    ///
    /// Returns the tab's snapshot when it is trackable. A non-trackable tab
    /// has its tracked context closed. A URL change closes the old activity,
    /// opens a new one, and ends the active session if it belongs to the tab.
    fn ensure_tracked_context(
        &mut self,
        tab: &TabContext,
        now: TimestampMs,
    ) -> Result<Option<TabSnapshot>, TrackerError> {
        let Some(tab_id) = tab.id else {
            return Ok(None);
        };
        let existing = self.db.get_tab_snapshot(tab_id)?;

        if !self.classifier.is_trackable(tab) {
            if existing.is_some() {
                self.close_tracked_context(tab_id, now)?;
            }
            return Ok(None);
        }

        match existing {
            None => self.open_tracked_context(tab, now),
            Some(snapshot) if snapshot.url != tab.url_or_empty() => {
                self.close_tracked_context(tab_id, now)?;
                let snapshot = self.open_tracked_context(tab, now)?;
                let navigated_away = self
                    .engine
                    .active_session()
                    .is_some_and(|session| session.tab_id == tab_id);
                if navigated_away {
                    self.end_active_session(EndReason::Navigation, now)?;
                }
                Ok(snapshot)
            }
            Some(mut snapshot) => {
                if let Some(mut activity) = self.db.get_tab_activity(snapshot.activity_id.as_str())?
                {
                    activity.observe(tab, now);
                    self.db.save_tab_activity(&activity)?;
                }
                snapshot.observe(tab, now);
                self.db.upsert_tab_snapshot(&snapshot)?;
                Ok(Some(snapshot))
            }
        }
    }

    fn open_tracked_context(
        &mut self,
        tab: &TabContext,
        now: TimestampMs,
    ) -> Result<Option<TabSnapshot>, TrackerError> {
        let Some(activity) = TabActivity::open(tab, now, &mut *self.activity_ids) else {
            return Ok(None);
        };
        self.db.save_tab_activity(&activity)?;
        let snapshot = TabSnapshot::for_activity(tab, &activity, now);
        self.db.upsert_tab_snapshot(&snapshot)?;
        tracing::debug!(activity = %activity.id, url = %activity.url, "opened tab activity");
        Ok(Some(snapshot))
    }

    fn close_tracked_context(
        &mut self,
        tab_id: i64,
        now: TimestampMs,
    ) -> Result<Option<TabSnapshot>, TrackerError> {
        let Some(snapshot) = self.db.get_tab_snapshot(tab_id)? else {
            return Ok(None);
        };
        self.db
            .close_tab_activity(snapshot.activity_id.as_str(), now)?;
        self.db.delete_tab_snapshot(tab_id)?;
        Ok(Some(snapshot))
    }

    /// Tracks every open tab and closes snapshots of tabs that are gone.
    fn ensure_tracked_contexts_for_open_tabs(&mut self, now: TimestampMs) -> Result<(), TrackerError> {
        let tabs = self.host.all_tabs()?;
        let mut seen = HashSet::new();
        for tab in &tabs {
            if let Some(tab_id) = tab.id {
                seen.insert(tab_id);
            }
            self.ensure_tracked_context(tab, now)?;
        }

        for snapshot in self.db.list_tab_snapshots()? {
            if !seen.contains(&snapshot.tab_id) {
                self.close_tracked_context(snapshot.tab_id, now)?;
            }
        }
        Ok(())
    }
}

impl Tracker<ReplayHost> {
    /// Shows `timed` to the replay host, then handles it.
    pub fn replay(&mut self, timed: &TimedEvent) -> Result<(), TrackerError> {
        self.host.observe(&timed.event);
        self.handle(timed)
    }

    /// Saves the replay host's layout for the next run.
    pub fn save_host(&mut self) -> Result<(), TrackerError> {
        self.host.save(&mut self.db)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tf_core::{RUNTIME_STATE_KEY, RuntimeStore, SettingsPatch, TransitionKind};

    fn tracker() -> Tracker<ReplayHost> {
        tracker_with(Database::open_in_memory().unwrap())
    }

    fn tracker_with(db: Database) -> Tracker<ReplayHost> {
        let mut sessions = 0;
        let engine = SessionEngine::builder()
            .clock(|| 0_i64)
            .ids(move || {
                sessions += 1;
                format!("session-{sessions}")
            });
        let mut activities = 0;
        Tracker::new(db, ReplayHost::new(), engine)
            .unwrap()
            .with_activity_ids(move || {
                activities += 1;
                format!("act{activities:05}")
            })
    }

    fn at(event: HostEvent, now: TimestampMs) -> TimedEvent {
        TimedEvent::new(event, now)
    }

    fn open_tab(t: &mut Tracker<ReplayHost>, id: i64, window_id: i64, url: &str, now: TimestampMs) {
        t.replay(&at(
            HostEvent::TabCreated {
                tab: TabContext::new(id, window_id, url)
                    .with_title(format!("Tab {id}"))
                    .activated(),
            },
            now,
        ))
        .unwrap();
    }

    fn focus_window(t: &mut Tracker<ReplayHost>, window_id: i64, now: TimestampMs) {
        t.replay(&at(
            HostEvent::WindowFocusChanged {
                window_id: Some(window_id),
            },
            now,
        ))
        .unwrap();
    }

    fn sessions(t: &Tracker<ReplayHost>) -> Vec<FocusSession> {
        let mut sessions = t.database().list_sessions_in_range(0, i64::MAX).unwrap();
        sessions.reverse();
        sessions
    }

    fn active_url(t: &Tracker<ReplayHost>) -> Option<String> {
        t.engine().active_session().map(|session| session.url.clone())
    }

    #[test]
    fn focus_switch_records_previous_session_and_credits_activity() {
        let mut t = tracker();
        open_tab(&mut t, 1, 1, "https://docs.test/a", 0);
        focus_window(&mut t, 1, 1_000);
        assert_eq!(active_url(&t).as_deref(), Some("https://docs.test/a"));

        open_tab(&mut t, 2, 1, "https://news.test/", 2_000);
        t.replay(&at(
            HostEvent::TabActivated {
                tab_id: 2,
                window_id: 1,
            },
            6_000,
        ))
        .unwrap();

        let recorded = sessions(&t);
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].domain, "docs.test");
        assert_eq!(recorded[0].duration_sec, 5);
        assert_eq!(recorded[0].end_reason, EndReason::TabSwitch);

        let activity_id = recorded[0].activity_id.clone().unwrap();
        let activity = t
            .database()
            .get_tab_activity(activity_id.as_str())
            .unwrap()
            .unwrap();
        assert_eq!(activity.focus_count, 1);
        assert_eq!(activity.total_focused_sec, 5);
        assert_eq!(activity.last_focused_at, Some(6_000));
        assert_eq!(active_url(&t).as_deref(), Some("https://news.test/"));
    }

    #[test]
    fn window_blur_and_idle_end_the_session() {
        let mut t = tracker();
        open_tab(&mut t, 1, 1, "https://docs.test/", 0);
        focus_window(&mut t, 1, 0);

        t.replay(&at(HostEvent::WindowFocusChanged { window_id: None }, 3_000))
            .unwrap();
        assert_eq!(active_url(&t), None);
        assert_eq!(sessions(&t)[0].end_reason, EndReason::WindowBlur);

        focus_window(&mut t, 1, 4_000);
        t.replay(&at(
            HostEvent::IdleStateChanged {
                state: IdleState::Locked,
            },
            9_000,
        ))
        .unwrap();
        let recorded = sessions(&t);
        assert_eq!(recorded.len(), 2);
        assert_eq!(recorded[1].end_reason, EndReason::Lock);
        assert_eq!(recorded[1].duration_sec, 5);

        // Focus changes while locked do not start a session.
        focus_window(&mut t, 1, 10_000);
        assert_eq!(active_url(&t), None);

        t.replay(&at(
            HostEvent::IdleStateChanged {
                state: IdleState::Active,
            },
            12_000,
        ))
        .unwrap();
        let active = t.engine().active_session().unwrap();
        assert_eq!(active.start_at, 12_000);
    }

    #[test]
    fn navigation_closes_activity_and_ends_session() {
        let mut t = tracker();
        open_tab(&mut t, 1, 1, "https://docs.test/a", 0);
        focus_window(&mut t, 1, 0);
        let first_activity = t.database().get_tab_snapshot(1).unwrap().unwrap().activity_id;

        t.replay(&at(
            HostEvent::TabUpdated {
                tab_id: 1,
                change: TabChange {
                    url: Some("https://docs.test/b".into()),
                    title: Some("B".into()),
                    status: None,
                },
                tab: TabContext::new(1, 1, "https://docs.test/b")
                    .with_title("B")
                    .activated(),
            },
            4_000,
        ))
        .unwrap();

        let recorded = sessions(&t);
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].end_reason, EndReason::Navigation);
        assert_eq!(recorded[0].url, "https://docs.test/a");

        let closed = t
            .database()
            .get_tab_activity(first_activity.as_str())
            .unwrap()
            .unwrap();
        assert_eq!(closed.closed_at, Some(4_000));
        assert_eq!(closed.total_focused_sec, 4);

        let snapshot = t.database().get_tab_snapshot(1).unwrap().unwrap();
        assert_ne!(snapshot.activity_id, first_activity);
        let active = t.engine().active_session().unwrap();
        assert_eq!(active.url, "https://docs.test/b");
        assert_eq!(active.title, "B");
        assert_eq!(active.activity_id.as_ref(), Some(&snapshot.activity_id));
    }

    #[test]
    fn navigation_to_untrackable_page_ends_session() {
        let mut t = tracker();
        open_tab(&mut t, 1, 1, "https://docs.test/", 0);
        focus_window(&mut t, 1, 0);

        t.replay(&at(
            HostEvent::TabUpdated {
                tab_id: 1,
                change: TabChange {
                    url: Some("chrome://settings".into()),
                    ..TabChange::default()
                },
                tab: TabContext::new(1, 1, "chrome://settings").activated(),
            },
            2_000,
        ))
        .unwrap();

        assert_eq!(active_url(&t), None);
        assert_eq!(t.database().get_tab_snapshot(1).unwrap(), None);
        assert_eq!(sessions(&t).len(), 1);
    }

    #[test]
    fn title_change_updates_session_without_ending_it() {
        let mut t = tracker();
        open_tab(&mut t, 1, 1, "https://docs.test/", 0);
        focus_window(&mut t, 1, 0);

        t.replay(&at(
            HostEvent::TabUpdated {
                tab_id: 1,
                change: TabChange {
                    title: Some("Renamed".into()),
                    ..TabChange::default()
                },
                tab: TabContext::new(1, 1, "https://docs.test/")
                    .with_title("Renamed")
                    .activated(),
            },
            1_000,
        ))
        .unwrap();

        let active = t.engine().active_session().unwrap();
        assert_eq!(active.title, "Renamed");
        assert_eq!(active.start_at, 0);
        assert!(sessions(&t).is_empty());

        let stored = t.database().get(RUNTIME_STATE_KEY).unwrap().unwrap();
        assert!(stored.contains("Renamed"));
    }

    #[test]
    fn update_without_tab_body_keeps_tracked_context() {
        let mut t = tracker();
        open_tab(&mut t, 1, 1, "https://docs.test/", 0);
        focus_window(&mut t, 1, 0);
        let activity_id = t.database().get_tab_snapshot(1).unwrap().unwrap().activity_id;

        let update: TimedEvent = serde_json::from_str(
            r#"{"type":"tab_updated","tabId":1,"change":{"title":"Renamed"},"at":1000}"#,
        )
        .unwrap();
        t.replay(&update).unwrap();

        let snapshot = t.database().get_tab_snapshot(1).unwrap().unwrap();
        assert_eq!(snapshot.activity_id, activity_id);
        assert_eq!(snapshot.title, "Renamed");
        assert!(snapshot.active);
        let activity = t
            .database()
            .get_tab_activity(activity_id.as_str())
            .unwrap()
            .unwrap();
        assert_eq!(activity.closed_at, None);
        assert_eq!(activity.last_seen_at, 1_000);

        let active = t.engine().active_session().unwrap();
        assert_eq!(active.title, "Renamed");
        assert_eq!(active.activity_id.as_ref(), Some(&activity_id));
        assert!(sessions(&t).is_empty());
    }

    #[test]
    fn url_change_without_tab_body_switches_session() {
        let mut t = tracker();
        open_tab(&mut t, 1, 1, "https://docs.test/a", 0);
        focus_window(&mut t, 1, 0);

        let update: TimedEvent = serde_json::from_str(
            r#"{"type":"tab_updated","tabId":1,"change":{"url":"https://docs.test/b","status":"complete"},"at":3000}"#,
        )
        .unwrap();
        t.replay(&update).unwrap();

        let recorded = sessions(&t);
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].end_reason, EndReason::Navigation);
        assert_eq!(recorded[0].url, "https://docs.test/a");

        assert_eq!(active_url(&t).as_deref(), Some("https://docs.test/b"));
        let snapshot = t.database().get_tab_snapshot(1).unwrap().unwrap();
        assert_eq!(snapshot.url, "https://docs.test/b");
        assert_eq!(snapshot.window_id, 1);
    }

    #[test]
    fn closing_focused_tab_moves_to_next_active_tab() {
        let mut t = tracker();
        open_tab(&mut t, 1, 1, "https://docs.test/", 0);
        open_tab(&mut t, 2, 1, "https://news.test/", 0);
        focus_window(&mut t, 1, 0);
        assert_eq!(active_url(&t).as_deref(), Some("https://news.test/"));

        t.replay(&at(HostEvent::TabRemoved { tab_id: 2 }, 3_000))
            .unwrap();
        assert_eq!(sessions(&t)[0].end_reason, EndReason::TabClosed);
        assert_eq!(t.database().get_tab_snapshot(2).unwrap(), None);
        // The replay host has no active tab left in window 1.
        assert_eq!(active_url(&t), None);

        t.replay(&at(
            HostEvent::TabActivated {
                tab_id: 1,
                window_id: 1,
            },
            3_500,
        ))
        .unwrap();
        assert_eq!(active_url(&t).as_deref(), Some("https://docs.test/"));
    }

    #[test]
    fn pausing_ends_session_and_blocks_tracking() {
        let mut t = tracker();
        open_tab(&mut t, 1, 1, "https://docs.test/", 0);
        focus_window(&mut t, 1, 0);

        let (mut db, host) = t.into_parts();
        db.update_settings(SettingsPatch {
            paused: Some(true),
            ..SettingsPatch::default()
        })
        .unwrap();
        let mut t = tracker_with(db);
        *t.host_mut() = host;
        t.resume().unwrap();

        t.replay(&at(HostEvent::SettingsUpdated, 5_000)).unwrap();
        assert_eq!(sessions(&t)[0].end_reason, EndReason::TrackingPaused);
        assert!(t.status().paused);

        t.replay(&at(
            HostEvent::TabActivated {
                tab_id: 1,
                window_id: 1,
            },
            6_000,
        ))
        .unwrap();
        assert_eq!(active_url(&t), None);
    }

    #[test]
    fn excluding_a_domain_ends_its_session() {
        let mut t = tracker();
        open_tab(&mut t, 1, 1, "https://mail.example.com/", 0);
        focus_window(&mut t, 1, 0);

        let (mut db, host) = t.into_parts();
        db.update_settings(SettingsPatch {
            excluded_domains: Some(vec!["example.com".into()]),
            ..SettingsPatch::default()
        })
        .unwrap();
        let mut t = tracker_with(db);
        *t.host_mut() = host;
        t.resume().unwrap();
        t.replay(&at(HostEvent::SettingsUpdated, 2_000)).unwrap();

        assert_eq!(active_url(&t), None);
        assert_eq!(t.database().get_tab_snapshot(1).unwrap(), None);
        let recorded = sessions(&t);
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].end_reason, EndReason::from("settings_updated"));
    }

    #[test]
    fn resume_continues_checkpointed_session() {
        let mut t = tracker();
        open_tab(&mut t, 1, 1, "https://docs.test/", 1_000);
        focus_window(&mut t, 1, 1_000);
        t.save_host().unwrap();
        let (db, _) = t.into_parts();

        let host = ReplayHost::load(&db).unwrap();
        let mut t = tracker_with(db);
        *t.host_mut() = host;
        assert!(t.resume().unwrap());
        assert_eq!(t.status().focused_window_id, Some(1));

        t.replay(&at(
            HostEvent::TabActivated {
                tab_id: 1,
                window_id: 1,
            },
            2_000,
        ))
        .unwrap();
        let active = t.engine().active_session().unwrap();
        assert_eq!(active.id.as_str(), "session-1");
        assert_eq!(active.start_at, 1_000);
    }

    #[test]
    fn startup_reconciles_snapshots_and_prunes_sessions() {
        let day = 86_400_000;
        let mut db = Database::open_in_memory().unwrap();
        let stale_tab = TabContext::new(9, 1, "https://old.test/");
        let mut ids = || "stale000".to_string();
        let stale = TabActivity::open(&stale_tab, 0, &mut ids).unwrap();
        db.save_tab_activity(&stale).unwrap();
        db.upsert_tab_snapshot(&TabSnapshot::for_activity(&stale_tab, &stale, 0))
            .unwrap();
        let old_session = FocusSession {
            id: tf_core::SessionId::new("old").unwrap(),
            activity_id: None,
            tab_id: 9,
            window_id: 1,
            url: "https://old.test/".into(),
            title: "Old".into(),
            domain: "old.test".into(),
            start_at: 0,
            end_at: 1_000,
            duration_sec: 1,
            end_reason: EndReason::Idle,
        };
        db.add_session(&old_session).unwrap();

        let mut t = tracker_with(db);
        t.host_mut().observe(&HostEvent::TabCreated {
            tab: TabContext::new(1, 1, "https://docs.test/").activated(),
        });
        t.host_mut()
            .observe(&HostEvent::WindowFocusChanged { window_id: Some(1) });

        let now = 40 * day;
        t.handle(&at(
            HostEvent::Startup {
                reason: "install".into(),
            },
            now,
        ))
        .unwrap();

        assert_eq!(t.database().get_tab_snapshot(9).unwrap(), None);
        let closed = t
            .database()
            .get_tab_activity(stale.id.as_str())
            .unwrap()
            .unwrap();
        assert_eq!(closed.closed_at, Some(now));
        assert!(t.database().list_sessions_in_range(0, now).unwrap().is_empty());
        assert!(t.database().get_tab_snapshot(1).unwrap().is_some());
        let active = t.engine().active_session().unwrap();
        assert_eq!(active.start_at, now);
        assert_eq!(active.url, "https://docs.test/");
    }

    #[test]
    fn retention_cleanup_reports_counts() {
        let day = 86_400_000;
        let mut t = tracker();
        open_tab(&mut t, 1, 1, "https://docs.test/", 0);
        focus_window(&mut t, 1, 0);
        t.replay(&at(HostEvent::WindowFocusChanged { window_id: None }, 60_000))
            .unwrap();

        let (mut db, _) = t.into_parts();
        let settings = db.get_settings().unwrap();
        let report = run_retention_cleanup(&mut db, &settings, 31 * day).unwrap();
        assert_eq!(
            report,
            CleanupReport {
                cutoff: day,
                sessions: 1,
                activities: 1,
                snapshots: 1,
            }
        );
    }

    #[test]
    fn duplicate_focus_events_are_debounced() {
        let mut t = tracker();
        open_tab(&mut t, 1, 1, "https://docs.test/", 0);
        focus_window(&mut t, 1, 0);
        let state = t.engine().read_state();
        assert_eq!(state.last_context_fingerprint, "1:1:https://docs.test/");

        let before = t.engine().read_state();
        t.replay(&at(
            HostEvent::TabActivated {
                tab_id: 1,
                window_id: 1,
            },
            100,
        ))
        .unwrap();
        let after = t.engine().read_state();
        assert_eq!(after.active_session, before.active_session);
        assert_eq!(after.last_context_at, 100);
    }

    struct BrokenHost;

    impl Host for BrokenHost {
        fn active_tab(&self, _window_id: i64) -> Result<Option<TabContext>, HostError> {
            Err(HostError::Query("tabs unavailable".into()))
        }

        fn last_focused_window(&self) -> Result<Option<i64>, HostError> {
            Ok(Some(1))
        }

        fn tab(&self, _tab_id: i64) -> Result<Option<TabContext>, HostError> {
            Err(HostError::Query("tabs unavailable".into()))
        }

        fn all_tabs(&self) -> Result<Vec<TabContext>, HostError> {
            Err(HostError::Query("tabs unavailable".into()))
        }

        fn idle_state(&self) -> Result<IdleState, HostError> {
            Ok(IdleState::Active)
        }
    }

    #[test]
    fn host_failure_ends_session_as_unknown() {
        let mut db = Database::open_in_memory().unwrap();
        let mut engine = SessionEngine::builder()
            .trackability(|_| true)
            .ids(|| "restored".to_string())
            .build()
            .unwrap();
        let transition =
            engine.start_or_switch_session_at(&TabContext::new(1, 1, "https://docs.test/"), "init", 0);
        assert_eq!(transition.kind, TransitionKind::SwitchedOrStarted);
        persist_runtime_state(&mut db, &engine.export_runtime_state()).unwrap();

        let mut t = Tracker::new(db, BrokenHost, SessionEngine::builder()).unwrap();
        t.resume().unwrap();
        t.handle(&at(
            HostEvent::TabActivated {
                tab_id: 1,
                window_id: 1,
            },
            2_000,
        ))
        .unwrap();

        assert!(t.engine().active_session().is_none());
        let recorded = t.database().list_sessions_in_range(0, 10_000).unwrap();
        assert_eq!(recorded[0].end_reason, EndReason::Unknown);
        assert_eq!(recorded[0].duration_sec, 2);

        let err = t.handle(&at(HostEvent::SettingsUpdated, 3_000)).unwrap_err();
        assert!(matches!(err, TrackerError::Host(_)));
    }
}
