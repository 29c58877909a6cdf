//! Browser host events and queries.
//!
//! The tracker never talks to a browser directly. It receives [`HostEvent`]s
//! and asks a [`Host`] about the current tab layout. [`ReplayHost`] rebuilds
//! that layout from the event stream itself, so a recorded stream can be fed
//! through `tf ingest` without a live browser.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use tf_core::{IdleState, PersistenceError, RuntimeStore, TabChange, TabContext, TimestampMs};

/// Window id the host reports when no browser window has focus.
pub const WINDOW_ID_NONE: i64 = -1;

/// Runtime store key holding the replay host's tab layout between runs.
pub const HOST_STATE_KEY: &str = "host_state_v1";

/// A host query failed.
#[derive(Debug, Error)]
pub enum HostError {
    #[error("host query failed: {0}")]
    Query(String),
}

/// A browser event, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum HostEvent {
    TabCreated {
        tab: TabContext,
    },
    TabActivated {
        tab_id: i64,
        window_id: i64,
    },
    TabUpdated {
        tab_id: i64,
        #[serde(default)]
        change: TabChange,
        #[serde(default)]
        tab: TabContext,
    },
    TabRemoved {
        tab_id: i64,
    },
    /// `None` (or [`WINDOW_ID_NONE`]) when every browser window lost focus.
    WindowFocusChanged {
        #[serde(default)]
        window_id: Option<i64>,
    },
    IdleStateChanged {
        state: IdleState,
    },
    /// Settings changed in storage and must be re-read.
    SettingsUpdated,
    /// The host started or the extension was installed.
    Startup {
        #[serde(default = "default_startup_reason")]
        reason: String,
    },
    /// Periodic retention sweep.
    RetentionCleanup,
}

fn default_startup_reason() -> String {
    "startup".to_string()
}

/// A [`HostEvent`] with an optional host timestamp.
///
/// Events without `at` are handled at the tracker's clock time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimedEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub at: Option<TimestampMs>,
    #[serde(flatten)]
    pub event: HostEvent,
}

impl TimedEvent {
    pub const fn new(event: HostEvent, at: TimestampMs) -> Self {
        Self {
            at: Some(at),
            event,
        }
    }
}

/// Treats the host's "no window" sentinel as no window.
pub fn focused_window(window_id: Option<i64>) -> Option<i64> {
    window_id.filter(|&id| id != WINDOW_ID_NONE)
}

/// Queries the tracker makes against the browser.
pub trait Host {
    /// The active tab of `window_id`, if that window has one.
    fn active_tab(&self, window_id: i64) -> Result<Option<TabContext>, HostError>;

    /// The last focused window, if it still has focus.
    fn last_focused_window(&self) -> Result<Option<i64>, HostError>;

    /// The tab `tab_id`, if it is still open.
    fn tab(&self, tab_id: i64) -> Result<Option<TabContext>, HostError>;

    /// Every open tab.
    fn all_tabs(&self) -> Result<Vec<TabContext>, HostError>;

    fn idle_state(&self) -> Result<IdleState, HostError>;
}

/// A host whose tab layout is rebuilt from the events it is shown.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReplayHost {
    tabs: BTreeMap<i64, TabContext>,
    focused_window: Option<i64>,
    idle_state: IdleState,
}

impl ReplayHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads the layout saved by [`ReplayHost::save`], or an empty one.
    pub fn load<S: RuntimeStore>(store: &S) -> Result<Self, S::Error> {
        let Some(raw) = store.get(HOST_STATE_KEY)? else {
            return Ok(Self::default());
        };
        Ok(serde_json::from_str(&raw).unwrap_or_else(|err| {
            tracing::warn!(error = %err, "stored host state is unreadable, starting empty");
            Self::default()
        }))
    }

    pub fn save<S: RuntimeStore>(&self, store: &mut S) -> Result<(), PersistenceError> {
        let json = serde_json::to_string(self)?;
        store
            .put(HOST_STATE_KEY, &json)
            .map_err(|err| PersistenceError::Store(Box::new(err)))
    }

    /// Applies `event` to the tab layout.
    pub fn observe(&mut self, event: &HostEvent) {
        match event {
            HostEvent::TabCreated { tab } => {
                if let Some(tab_id) = tab.id {
                    self.insert(tab_id, tab.clone());
                }
            }
            HostEvent::TabActivated { tab_id, window_id } => {
                let tab = self.tabs.get(tab_id).cloned().unwrap_or_else(|| TabContext {
                    id: Some(*tab_id),
                    ..TabContext::default()
                });
                self.insert(
                    *tab_id,
                    TabContext {
                        window_id: Some(*window_id),
                        active: true,
                        ..tab
                    },
                );
            }
            HostEvent::TabUpdated {
                tab_id,
                change,
                tab,
            } => {
                let mut merged = TabContext {
                    id: Some(*tab_id),
                    ..tab.clone()
                };
                let previous = self.tabs.get(tab_id);
                if merged.window_id.is_none() {
                    merged.window_id = previous.and_then(|prev| prev.window_id);
                }
                if let Some(url) = change.new_url() {
                    merged.url = Some(url.to_string());
                } else if merged.url.is_none() {
                    merged.url = previous.and_then(|prev| prev.url.clone());
                }
                if let Some(title) = change.new_title() {
                    merged.title = Some(title.to_string());
                } else if merged.title.is_none() {
                    merged.title = previous.and_then(|prev| prev.title.clone());
                }
                if change.status.is_some() {
                    merged.status.clone_from(&change.status);
                }
                self.insert(*tab_id, merged);
            }
            HostEvent::TabRemoved { tab_id } => {
                self.tabs.remove(tab_id);
            }
            HostEvent::WindowFocusChanged { window_id } => {
                self.focused_window = focused_window(*window_id);
            }
            HostEvent::IdleStateChanged { state } => self.idle_state = *state,
            HostEvent::SettingsUpdated
            | HostEvent::Startup { .. }
            | HostEvent::RetentionCleanup => {}
        }
    }

    /// Stores `tab`; an active tab deactivates the others in its window.
    fn insert(&mut self, tab_id: i64, tab: TabContext) {
        if tab.active {
            for other in self.tabs.values_mut() {
                if other.window_id == tab.window_id {
                    other.active = false;
                }
            }
        }
        self.tabs.insert(tab_id, tab);
    }
}

impl Host for ReplayHost {
    fn active_tab(&self, window_id: i64) -> Result<Option<TabContext>, HostError> {
        Ok(self
            .tabs
            .values()
            .find(|tab| tab.active && tab.window_id == Some(window_id))
            .cloned())
    }

    fn last_focused_window(&self) -> Result<Option<i64>, HostError> {
        Ok(self.focused_window)
    }

    fn tab(&self, tab_id: i64) -> Result<Option<TabContext>, HostError> {
        Ok(self.tabs.get(&tab_id).cloned())
    }

    fn all_tabs(&self) -> Result<Vec<TabContext>, HostError> {
        Ok(self.tabs.values().cloned().collect())
    }

    fn idle_state(&self) -> Result<IdleState, HostError> {
        Ok(self.idle_state)
    }
}
