//! Long-lived per-tab activity records.
//!
//! A [`TabActivity`] spans the time a tab shows one URL, whether or not it has
//! focus. Focus sessions point back at it and add their duration to its
//! aggregates when they end. A [`TabSnapshot`] maps a live host tab to the
//! activity currently open for it.

use serde::{Deserialize, Serialize};

use crate::clock::IdGenerator;
use crate::page::{extract_domain, readable_title};
use crate::tab::TabContext;
use crate::types::{ActivityId, TimestampMs};

/// Number of id-generator characters kept in an activity id suffix.
const ACTIVITY_SUFFIX_LEN: usize = 8;

/// Focus time an activity needs, in seconds, before it counts as meaningful.
pub const MEANINGFUL_THRESHOLD_SEC: i64 = 10;

/// Everything known about one tab showing one URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabActivity {
    pub id: ActivityId,
    pub tab_id: i64,
    pub window_id: i64,
    pub url: String,
    pub title: String,
    pub domain: String,
    pub opened_at: TimestampMs,
    pub last_seen_at: TimestampMs,
    pub closed_at: Option<TimestampMs>,
    pub ever_focused: bool,
    pub total_focused_sec: i64,
    pub focus_count: i64,
    pub last_focused_at: Option<TimestampMs>,
}

impl TabActivity {
    /// Opens an activity for `tab` at `now`.
    ///
    /// The id has the form `{now}-{tabId}-{suffix}`. Returns `None` when the
    /// tab has no ids.
    pub fn open(tab: &TabContext, now: TimestampMs, ids: &mut dyn IdGenerator) -> Option<Self> {
        let (tab_id, window_id) = (tab.id?, tab.window_id?);
        let suffix: String = ids
            .next_id()
            .chars()
            .filter(char::is_ascii_alphanumeric)
            .take(ACTIVITY_SUFFIX_LEN)
            .collect();
        let id = ActivityId::new(format!("{now}-{tab_id}-{suffix}")).ok()?;
        let url = tab.url_or_empty().to_string();

        Some(Self {
            id,
            tab_id,
            window_id,
            title: readable_title(tab.title.as_deref(), Some(&url)),
            domain: extract_domain(&url),
            url,
            opened_at: now,
            last_seen_at: now,
            closed_at: None,
            ever_focused: false,
            total_focused_sec: 0,
            focus_count: 0,
            last_focused_at: None,
        })
    }

    /// Refreshes the record from a new observation of its tab.
    pub fn observe(&mut self, tab: &TabContext, now: TimestampMs) {
        if let Some(window_id) = tab.window_id {
            self.window_id = window_id;
        }
        if let Some(url) = tab.url.as_deref().filter(|url| !url.is_empty()) {
            url.clone_into(&mut self.url);
        }
        self.title = readable_title(tab.title.as_deref(), tab.url.as_deref());
        self.domain = extract_domain(&self.url);
        self.last_seen_at = now;
        self.closed_at = None;
    }

    /// Marks the activity closed at `now`.
    pub fn close(&mut self, now: TimestampMs) {
        self.closed_at = Some(now);
        self.last_seen_at = self.last_seen_at.max(now);
    }

    /// Adds one ended focus session's duration to the aggregates.
    pub fn apply_focus(&mut self, duration_sec: i64, focused_at: TimestampMs) {
        self.ever_focused = true;
        self.total_focused_sec += duration_sec.max(0);
        self.focus_count += 1;
        self.last_focused_at = Some(focused_at);
        self.last_seen_at = self.last_seen_at.max(focused_at);
    }

    /// True when the activity was alive at some point in `[start, end]`.
    pub fn overlaps(&self, start: TimestampMs, end: TimestampMs) -> bool {
        self.opened_at <= end && self.closed_at.unwrap_or(self.last_seen_at) >= start
    }

    pub const fn is_meaningful(&self) -> bool {
        self.total_focused_sec > MEANINGFUL_THRESHOLD_SEC
    }

    /// Case-insensitive substring match over title, domain and URL.
    pub fn matches_search(&self, query: &str) -> bool {
        let query = query.trim().to_lowercase();
        query.is_empty()
            || format!("{} {} {}", self.title, self.domain, self.url)
                .to_lowercase()
                .contains(&query)
    }
}

/// How a list of activities is filtered and ordered for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ActivityView {
    /// Only activities focused past [`MEANINGFUL_THRESHOLD_SEC`], most focused first.
    #[default]
    Meaningful,
    /// Every activity, most recently seen first.
    All,
}

impl ActivityView {
    /// Filters and sorts `activities` in place.
    pub fn apply(self, activities: &mut Vec<TabActivity>) {
        match self {
            Self::Meaningful => {
                activities.retain(TabActivity::is_meaningful);
                activities.sort_by(|a, b| {
                    b.total_focused_sec
                        .cmp(&a.total_focused_sec)
                        .then(b.last_seen_at.cmp(&a.last_seen_at))
                });
            }
            Self::All => activities.sort_by(|a, b| b.last_seen_at.cmp(&a.last_seen_at)),
        }
    }
}

/// Maps a live host tab to its open activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabSnapshot {
    pub tab_id: i64,
    pub window_id: i64,
    pub url: String,
    pub title: String,
    pub activity_id: ActivityId,
    pub active: bool,
    pub last_seen_at: TimestampMs,
}

impl TabSnapshot {
    /// Snapshot pointing `tab` at `activity`.
    pub fn for_activity(tab: &TabContext, activity: &TabActivity, now: TimestampMs) -> Self {
        Self {
            tab_id: activity.tab_id,
            window_id: activity.window_id,
            url: activity.url.clone(),
            title: activity.title.clone(),
            activity_id: activity.id.clone(),
            active: tab.active,
            last_seen_at: now,
        }
    }

    /// Refreshes the snapshot from a new observation of its tab.
    pub fn observe(&mut self, tab: &TabContext, now: TimestampMs) {
        if let Some(window_id) = tab.window_id {
            self.window_id = window_id;
        }
        if let Some(url) = tab.url.as_deref().filter(|url| !url.is_empty()) {
            url.clone_into(&mut self.url);
        }
        self.title = readable_title(tab.title.as_deref(), tab.url.as_deref());
        self.active = tab.active;
        self.last_seen_at = now;
    }
}
