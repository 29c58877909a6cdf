//! Decides which tabs are eligible for focus tracking.

use std::sync::{Arc, PoisonError, RwLock};

use crate::page::{is_excluded_domain, is_trackable_url, normalize_domains};
use crate::tab::TabContext;

/// Trackability predicate backed by a shared, replaceable exclusion list.
///
/// Clones share the same list, so a classifier captured by the session engine
/// sees updates made through another clone.
#[derive(Debug, Clone, Default)]
pub struct TrackabilityClassifier {
    excluded_domains: Arc<RwLock<Vec<String>>>,
}

impl TrackabilityClassifier {
    pub fn new<I, S>(excluded_domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            excluded_domains: Arc::new(RwLock::new(normalize_domains(excluded_domains))),
        }
    }

    /// Replaces the exclusion list.
    pub fn set_excluded_domains<I, S>(&self, excluded_domains: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let normalized = normalize_domains(excluded_domains);
        *self
            .excluded_domains
            .write()
            .unwrap_or_else(PoisonError::into_inner) = normalized;
    }

    /// Returns the current exclusion list.
    pub fn excluded_domains(&self) -> Vec<String> {
        self.excluded_domains
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// A tab is trackable when it has tab and window ids, an `http(s)` URL,
    /// and a host outside the exclusion list.
    pub fn is_trackable(&self, tab: &TabContext) -> bool {
        if tab.id.is_none() || tab.window_id.is_none() {
            return false;
        }

        let Some(url) = tab.url.as_deref() else {
            return false;
        };
        if !is_trackable_url(url) {
            return false;
        }

        let excluded = self
            .excluded_domains
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        !is_excluded_domain(url, excluded.as_slice())
    }
}
