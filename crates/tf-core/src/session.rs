//! Focus sessions: timed periods of attention on a single tab.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::page::{extract_domain, readable_title};
use crate::tab::TabContext;
use crate::time::duration_seconds;
use crate::types::{ActivityId, SessionId, TimestampMs};

/// Why a focus session ended.
///
/// The host and the tracker use a fixed vocabulary, but any string is accepted
/// so records written by other versions still load.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum EndReason {
    TabSwitch,
    Navigation,
    NavigationNonTrackable,
    Idle,
    Lock,
    WindowBlur,
    WindowFocus,
    TabClosed,
    TrackingPaused,
    /// Sentinel for sessions that are still open or ended for an unknown cause.
    #[default]
    Unknown,
    Other(String),
}

impl EndReason {
    pub fn as_str(&self) -> &str {
        match self {
            Self::TabSwitch => "tab_switch",
            Self::Navigation => "navigation",
            Self::NavigationNonTrackable => "navigation_non_trackable",
            Self::Idle => "idle",
            Self::Lock => "lock",
            Self::WindowBlur => "window_blur",
            Self::WindowFocus => "window_focus",
            Self::TabClosed => "tab_closed",
            Self::TrackingPaused => "tracking_paused",
            Self::Unknown => "unknown",
            Self::Other(reason) => reason,
        }
    }
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for EndReason {
    fn from(s: &str) -> Self {
        match s {
            "tab_switch" => Self::TabSwitch,
            "navigation" => Self::Navigation,
            "navigation_non_trackable" => Self::NavigationNonTrackable,
            "idle" => Self::Idle,
            "lock" => Self::Lock,
            "window_blur" => Self::WindowBlur,
            "window_focus" => Self::WindowFocus,
            "tab_closed" => Self::TabClosed,
            "tracking_paused" => Self::TrackingPaused,
            "" | "unknown" => Self::Unknown,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<String> for EndReason {
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}

impl FromStr for EndReason {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from(s))
    }
}

impl Serialize for EndReason {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EndReason {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Self::from(s))
    }
}

/// A timed record of focused attention on one tab.
///
/// While open, `end_at == start_at` and `duration_sec == 0`; the engine fills
/// both in when the session ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FocusSession {
    pub id: SessionId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activity_id: Option<ActivityId>,
    pub tab_id: i64,
    pub window_id: i64,
    pub url: String,
    pub title: String,
    pub domain: String,
    pub start_at: TimestampMs,
    pub end_at: TimestampMs,
    pub duration_sec: i64,
    #[serde(default)]
    pub end_reason: EndReason,
}

impl FocusSession {
    /// Opens a session for `tab` at `now`.
    pub(crate) fn open(
        id: SessionId,
        tab_id: i64,
        window_id: i64,
        tab: &TabContext,
        now: TimestampMs,
    ) -> Self {
        let url = tab.url_or_empty().to_string();
        Self {
            id,
            activity_id: ActivityId::from_optional(tab.activity_id.as_deref()),
            tab_id,
            window_id,
            title: readable_title(tab.title.as_deref(), Some(&url)),
            domain: extract_domain(&url),
            url,
            start_at: now,
            end_at: now,
            duration_sec: 0,
            end_reason: EndReason::Unknown,
        }
    }

    /// True when this session belongs to the given tab in the given window.
    pub const fn is_same_tab(&self, tab_id: i64, window_id: i64) -> bool {
        self.tab_id == tab_id && self.window_id == window_id
    }

    /// Replaces the URL and re-derives the domain.
    pub(crate) fn set_url(&mut self, url: &str) {
        url.clone_into(&mut self.url);
        self.domain = extract_domain(url);
    }

    /// Replaces the title, falling back to the URL when blank.
    pub(crate) fn set_title(&mut self, title: Option<&str>) {
        self.title = readable_title(title, Some(&self.url));
    }

    /// Closes the session at `now`.
    #[must_use]
    pub(crate) fn finish(mut self, reason: EndReason, now: TimestampMs) -> Self {
        self.end_at = now;
        self.duration_sec = duration_seconds(self.start_at, now);
        self.end_reason = reason;
        self
    }

    /// Whether this ended session is worth appending to the session log.
    pub fn is_recordable(&self) -> bool {
        !self.url.is_empty() && self.duration_sec >= 0
    }

    /// Case-insensitive substring match over title, domain and URL.
    ///
    /// A blank query matches everything.
    pub fn matches_search(&self, query: &str) -> bool {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return true;
        }
        format!("{} {} {}", self.title, self.domain, self.url)
            .to_lowercase()
            .contains(&query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_session(url: &str) -> FocusSession {
        let tab = TabContext::new(3, 1, url).with_title("Docs");
        FocusSession::open(SessionId::new("s-1").unwrap(), 3, 1, &tab, 1_000)
    }

    #[test]
    fn open_session_snapshots_tab() {
        let session = open_session("https://Docs.Example.com/a");
        assert_eq!(session.domain, "docs.example.com");
        assert_eq!(session.title, "Docs");
        assert_eq!(session.start_at, session.end_at);
        assert_eq!(session.duration_sec, 0);
        assert_eq!(session.end_reason, EndReason::Unknown);
        assert_eq!(session.activity_id, None);
    }

    #[test]
    fn finish_computes_rounded_duration() {
        let ended = open_session("https://example.com").finish(EndReason::Idle, 4_600);
        assert_eq!(ended.end_at, 4_600);
        assert_eq!(ended.duration_sec, 4);
        assert_eq!(ended.end_reason, EndReason::Idle);
        assert!(ended.is_recordable());
    }

    #[test]
    fn session_without_url_is_not_recordable() {
        let ended = open_session("").finish(EndReason::Idle, 2_000);
        assert!(!ended.is_recordable());
    }

    #[test]
    fn search_matches_title_domain_and_url() {
        let session = open_session("https://docs.example.com/guide");
        assert!(session.matches_search("  "));
        assert!(session.matches_search("DOCS"));
        assert!(session.matches_search("example.com/guide"));
        assert!(!session.matches_search("news"));
    }

    #[test]
    fn end_reason_keeps_unknown_tags() {
        assert_eq!(EndReason::from("lock"), EndReason::Lock);
        assert_eq!(EndReason::from(""), EndReason::Unknown);
        let custom = EndReason::from("init_startup");
        assert_eq!(custom, EndReason::Other("init_startup".into()));
        assert_eq!(custom.to_string(), "init_startup");
    }

    #[test]
    fn session_serializes_with_camel_case_keys() {
        let session = open_session("https://example.com");
        let value = serde_json::to_value(&session).unwrap();
        assert_eq!(value["tabId"], 3);
        assert_eq!(value["windowId"], 1);
        assert_eq!(value["startAt"], 1_000);
        assert_eq!(value["durationSec"], 0);
        assert_eq!(value["endReason"], "unknown");
        assert!(value.get("activityId").is_none());
    }

    #[test]
    fn ended_session_json_layout() {
        let ended = open_session("https://example.com").finish(EndReason::TabSwitch, 61_400);
        insta::assert_snapshot!(serde_json::to_string_pretty(&ended).unwrap(), @r#"
        {
          "id": "s-1",
          "tabId": 3,
          "windowId": 1,
          "url": "https://example.com",
          "title": "Docs",
          "domain": "example.com",
          "startAt": 1000,
          "endAt": 61400,
          "durationSec": 60,
          "endReason": "tab_switch"
        }
        "#);
    }
}
