//! User-facing tracking settings.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

use crate::page::normalize_domains;

/// Default number of days to keep sessions and activities.
pub const DEFAULT_RETENTION_DAYS: i64 = 30;

/// Dashboard color theme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Dark,
    Light,
}

impl Theme {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Dark => "dark",
            Self::Light => "light",
        }
    }

    /// Anything other than `light` reads as dark.
    pub fn parse_lenient(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("light") {
            Self::Light
        } else {
            Self::Dark
        }
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Theme {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Self::parse_lenient(&s))
    }
}

/// Tracking settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub retention_days: i64,
    pub paused: bool,
    pub excluded_domains: Vec<String>,
    pub theme: Theme,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            retention_days: DEFAULT_RETENTION_DAYS,
            paused: false,
            excluded_domains: Vec::new(),
            theme: Theme::Dark,
        }
    }
}

impl Settings {
    /// Retention is at least one day; excluded domains are trimmed,
    /// lowercased and deduplicated.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.retention_days = self.retention_days.max(1);
        self.excluded_domains = normalize_domains(&self.excluded_domains);
        self
    }

    /// Retention window in milliseconds.
    pub const fn retention_ms(&self) -> i64 {
        self.retention_days.saturating_mul(24 * 60 * 60 * 1000)
    }
}

/// A partial update to [`Settings`]; unset fields keep their current value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retention_days: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paused: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub excluded_domains: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme: Option<Theme>,
}

impl SettingsPatch {
    /// Applies the patch and normalizes the result.
    #[must_use]
    pub fn apply(self, current: Settings) -> Settings {
        Settings {
            retention_days: self.retention_days.unwrap_or(current.retention_days),
            paused: self.paused.unwrap_or(current.paused),
            excluded_domains: self.excluded_domains.unwrap_or(current.excluded_domains),
            theme: self.theme.unwrap_or(current.theme),
        }
        .normalized()
    }
}
