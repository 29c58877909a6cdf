//! Host tab records as delivered by the browser.

use serde::{Deserialize, Serialize};

/// A tab as reported by the host.
///
/// Every field is optional because the host omits ids for some tab kinds and
/// the URL for tabs the extension cannot see.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Back-reference to the tab's activity record, filled in by the tracker.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activity_id: Option<String>,
    #[serde(default)]
    pub active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl TabContext {
    /// Creates a tab with ids and URL set.
    pub fn new(id: i64, window_id: i64, url: impl Into<String>) -> Self {
        Self {
            id: Some(id),
            window_id: Some(window_id),
            url: Some(url.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    #[must_use]
    pub fn with_activity(mut self, activity_id: impl Into<String>) -> Self {
        self.activity_id = Some(activity_id.into());
        self
    }

    #[must_use]
    pub const fn activated(mut self) -> Self {
        self.active = true;
        self
    }

    /// The URL, or an empty string when the host did not report one.
    pub fn url_or_empty(&self) -> &str {
        self.url.as_deref().unwrap_or_default()
    }

    /// Debounce key identifying this tab showing this URL: `window:tab:url`.
    ///
    /// Returns `None` when the tab has no ids.
    pub fn fingerprint(&self) -> Option<String> {
        let (Some(tab_id), Some(window_id)) = (self.id, self.window_id) else {
            return None;
        };
        Some(format!("{window_id}:{tab_id}:{}", self.url_or_empty()))
    }
}

/// A metadata-only change reported for a tab.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabChange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl TabChange {
    /// The new URL, if one was reported and is non-empty.
    pub fn new_url(&self) -> Option<&str> {
        self.url.as_deref().filter(|url| !url.is_empty())
    }

    /// The new title, if one was reported and is non-empty.
    pub fn new_title(&self) -> Option<&str> {
        self.title.as_deref().filter(|title| !title.is_empty())
    }

    /// True when the host reports the page finished loading.
    pub fn is_complete(&self) -> bool {
        self.status.as_deref() == Some("complete")
    }
}
