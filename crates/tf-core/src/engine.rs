//! The focus session state machine.
//!
//! The engine holds at most one open [`FocusSession`]. Every observation of
//! "the tab that currently has focus" goes through
//! [`SessionEngine::start_or_switch_session`], which decides whether to start,
//! continue, switch or end that session.
//!
//! # Debounce
//!
//! Each trackable observation is reduced to a context fingerprint
//! (`window:tab:url`). An observation whose fingerprint matches the previous
//! one and arrives within `debounce_ms` of it changes nothing. The last-seen
//! fingerprint is overwritten on every trackable observation, including the
//! debounced ones.
//!
//! Ending a session because nothing trackable is focused clears the
//! fingerprint. Switching to another tab does not: the new tab's fingerprint
//! has just been recorded, so a duplicate event for it arriving right after
//! the switch is still suppressed.
//!
//! # Recovery
//!
//! [`SessionEngine::export_runtime_state`] and
//! [`SessionEngine::hydrate_runtime_state`] move the whole state in and out so
//! an open session survives a host restart with its original start time.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::clock::{Clock, IdGenerator, SystemClock, UuidGenerator};
use crate::recovery::{SessionRecovery, finite_millis, recover_session};
use crate::session::{EndReason, FocusSession};
use crate::tab::{TabChange, TabContext};
use crate::types::{ActivityId, SessionId, TimestampMs};

/// Default debounce window in milliseconds.
pub const DEFAULT_DEBOUNCE_MS: i64 = 250;

/// Errors raised while building an engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// No trackability predicate was configured.
    #[error("session engine requires a trackability predicate")]
    MissingTrackability,
    /// The debounce window was negative.
    #[error("invalid debounce window: {0}ms")]
    InvalidDebounce(i64),
}

/// The engine's complete internal state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeState {
    pub active_session: Option<FocusSession>,
    #[serde(default)]
    pub last_context_fingerprint: String,
    #[serde(default)]
    pub last_context_at: TimestampMs,
}

impl RuntimeState {
    fn clear_context(&mut self) {
        self.last_context_fingerprint.clear();
        self.last_context_at = 0;
    }
}

/// Which path a call to [`SessionEngine::start_or_switch_session`] took.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionKind {
    /// The tab was not trackable and an active session was ended.
    EndedNonTrackable,
    /// The tab was not trackable and nothing was active.
    NoopNonTrackable,
    /// A duplicate observation inside the debounce window.
    NoopDebounced,
    /// The active session's tab was observed again; metadata was refreshed.
    UpdatedSameSession,
    /// A new session was opened, possibly ending the previous one.
    SwitchedOrStarted,
}

impl TransitionKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::EndedNonTrackable => "ended_non_trackable",
            Self::NoopNonTrackable => "noop_non_trackable",
            Self::NoopDebounced => "noop_debounced",
            Self::UpdatedSameSession => "updated_same_session",
            Self::SwitchedOrStarted => "switched_or_started",
        }
    }
}

impl fmt::Display for TransitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one state transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub kind: TransitionKind,
    /// The session closed by this transition, if it should be recorded.
    pub ended_session: Option<FocusSession>,
    /// Copy of the active session after the transition.
    pub active_session: Option<FocusSession>,
}

impl Transition {
    /// True when session state changed.
    pub const fn changed(&self) -> bool {
        matches!(
            self.kind,
            TransitionKind::EndedNonTrackable
                | TransitionKind::UpdatedSameSession
                | TransitionKind::SwitchedOrStarted
        )
    }
}

/// Options for [`SessionEngine::end_active_session_at`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndOptions {
    /// Reset the debounce fingerprint after ending.
    pub clear_context: bool,
}

impl Default for EndOptions {
    fn default() -> Self {
        Self {
            clear_context: true,
        }
    }
}

type Trackability = Box<dyn Fn(&TabContext) -> bool>;

/// Builder for [`SessionEngine`].
pub struct SessionEngineBuilder {
    trackability: Option<Trackability>,
    debounce_ms: i64,
    clock: Box<dyn Clock>,
    ids: Box<dyn IdGenerator>,
}

impl fmt::Debug for SessionEngineBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionEngineBuilder")
            .field("has_trackability", &self.trackability.is_some())
            .field("debounce_ms", &self.debounce_ms)
            .finish_non_exhaustive()
    }
}

impl Default for SessionEngineBuilder {
    fn default() -> Self {
        Self {
            trackability: None,
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            clock: Box::new(SystemClock),
            ids: Box::new(UuidGenerator),
        }
    }
}

impl SessionEngineBuilder {
    /// Predicate deciding whether a tab may be tracked. Required.
    #[must_use]
    pub fn trackability(mut self, predicate: impl Fn(&TabContext) -> bool + 'static) -> Self {
        self.trackability = Some(Box::new(predicate));
        self
    }

    #[must_use]
    pub const fn debounce_ms(mut self, debounce_ms: i64) -> Self {
        self.debounce_ms = debounce_ms;
        self
    }

    #[must_use]
    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    #[must_use]
    pub fn ids(mut self, ids: impl IdGenerator + 'static) -> Self {
        self.ids = Box::new(ids);
        self
    }

    pub fn build(self) -> Result<SessionEngine, EngineError> {
        let is_trackable = self.trackability.ok_or(EngineError::MissingTrackability)?;
        if self.debounce_ms < 0 {
            return Err(EngineError::InvalidDebounce(self.debounce_ms));
        }
        Ok(SessionEngine {
            state: RuntimeState::default(),
            debounce_ms: self.debounce_ms,
            is_trackable,
            clock: self.clock,
            ids: self.ids,
        })
    }
}

/// Focus session state machine.
///
/// All methods run to completion synchronously. Callers that handle host
/// events concurrently must serialize their calls.
pub struct SessionEngine {
    state: RuntimeState,
    debounce_ms: i64,
    is_trackable: Trackability,
    clock: Box<dyn Clock>,
    ids: Box<dyn IdGenerator>,
}

impl fmt::Debug for SessionEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionEngine")
            .field("state", &self.state)
            .field("debounce_ms", &self.debounce_ms)
            .finish_non_exhaustive()
    }
}

impl SessionEngine {
    pub fn builder() -> SessionEngineBuilder {
        SessionEngineBuilder::default()
    }

    pub const fn debounce_ms(&self) -> i64 {
        self.debounce_ms
    }

    /// Current time according to the engine's clock.
    pub fn now_ms(&self) -> TimestampMs {
        self.clock.now_ms()
    }

    /// Copy of the current state.
    pub fn read_state(&self) -> RuntimeState {
        self.state.clone()
    }

    /// Borrow of the active session, if any.
    pub const fn active_session(&self) -> Option<&FocusSession> {
        self.state.active_session.as_ref()
    }

    /// Snapshot of the state for persistence.
    pub fn export_runtime_state(&self) -> RuntimeState {
        self.read_state()
    }

    /// Replaces the state with one recovered from storage.
    ///
    /// Returns false, leaving the state untouched, when `runtime_state` is not
    /// a JSON object. An unusable active session is discarded and the engine
    /// resumes idle; the stored `startAt` of a usable one is kept.
    pub fn hydrate_runtime_state(&mut self, runtime_state: &Value) -> bool {
        let Some(fields) = runtime_state.as_object() else {
            tracing::warn!("ignoring runtime state that is not an object");
            return false;
        };

        let active_session = match recover_session(fields.get("activeSession"), &mut *self.ids) {
            SessionRecovery::Restored(session) => Some(session),
            SessionRecovery::Absent => None,
            SessionRecovery::Discarded(reason) => {
                tracing::warn!(%reason, "discarding stored active session");
                None
            }
        };

        self.state = RuntimeState {
            active_session,
            last_context_fingerprint: fields
                .get("lastContextFingerprint")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            last_context_at: fields
                .get("lastContextAt")
                .and_then(finite_millis)
                .unwrap_or(0),
        };
        tracing::debug!(
            active = self.state.active_session.is_some(),
            "hydrated runtime state"
        );
        true
    }

    /// Ends the active session now, clearing the debounce context.
    pub fn end_active_session(&mut self, reason: impl Into<EndReason>) -> Option<FocusSession> {
        let now = self.clock.now_ms();
        self.end_active_session_at(reason, now, EndOptions::default())
    }

    /// Ends the active session at `now`.
    ///
    /// Returns `None` when nothing was active, or when the ended session has
    /// no URL. The active session is cleared in both cases.
    pub fn end_active_session_at(
        &mut self,
        reason: impl Into<EndReason>,
        now: TimestampMs,
        options: EndOptions,
    ) -> Option<FocusSession> {
        let session = self.state.active_session.take()?;
        let ended = session.finish(reason.into(), now);

        if options.clear_context {
            self.state.clear_context();
        }

        tracing::debug!(
            session = %ended.id,
            reason = %ended.end_reason,
            duration_sec = ended.duration_sec,
            "ended focus session"
        );

        if ended.url.is_empty() {
            return None;
        }
        Some(ended)
    }

    /// Observes `tab` as the current focus candidate, using the engine clock.
    pub fn start_or_switch_session(
        &mut self,
        tab: &TabContext,
        reason: impl Into<EndReason>,
    ) -> Transition {
        let now = self.clock.now_ms();
        self.start_or_switch_session_at(tab, reason, now)
    }

    /// Observes `tab` as the current focus candidate at `now`.
    pub fn start_or_switch_session_at(
        &mut self,
        tab: &TabContext,
        reason: impl Into<EndReason>,
        now: TimestampMs,
    ) -> Transition {
        let reason = reason.into();

        let ids = (tab.id, tab.window_id, tab.fingerprint());
        let (Some(tab_id), Some(window_id), Some(fingerprint)) = ids else {
            return self.end_non_trackable(reason, now);
        };
        if !(self.is_trackable)(tab) {
            return self.end_non_trackable(reason, now);
        }

        if self.observe_context(fingerprint, now) {
            return Transition {
                kind: TransitionKind::NoopDebounced,
                ended_session: None,
                active_session: self.state.active_session.clone(),
            };
        }

        if let Some(active) = self.state.active_session.as_mut() {
            if active.is_same_tab(tab_id, window_id) {
                if let Some(url) = tab.url.as_deref().filter(|url| !url.is_empty()) {
                    active.set_url(url);
                }
                active.set_title(tab.title.as_deref());
                if let Some(activity_id) = ActivityId::from_optional(tab.activity_id.as_deref()) {
                    active.activity_id = Some(activity_id);
                }
                tracing::debug!(session = %active.id, url = %active.url, "updated focus session");
                return Transition {
                    kind: TransitionKind::UpdatedSameSession,
                    ended_session: None,
                    active_session: Some(active.clone()),
                };
            }
        }

        let ended_session = self.end_active_session_at(
            reason,
            now,
            EndOptions {
                clear_context: false,
            },
        );
        let session = FocusSession::open(self.next_session_id(), tab_id, window_id, tab, now);
        tracing::debug!(session = %session.id, tab_id, window_id, "started focus session");
        self.state.active_session = Some(session.clone());

        Transition {
            kind: TransitionKind::SwitchedOrStarted,
            ended_session,
            active_session: Some(session),
        }
    }

    /// Applies a metadata-only change reported for `tab_id`.
    ///
    /// Returns true when the active session belongs to that tab and its URL or
    /// title was changed.
    pub fn update_active_session_metadata(&mut self, tab_id: i64, change: &TabChange) -> bool {
        let Some(active) = self.state.active_session.as_mut() else {
            return false;
        };
        if active.tab_id != tab_id {
            return false;
        }

        let mut updated = false;
        if let Some(url) = change.new_url() {
            active.set_url(url);
            updated = true;
        }
        if let Some(title) = change.new_title() {
            active.set_title(Some(title));
            updated = true;
        }
        updated
    }

    fn end_non_trackable(&mut self, reason: EndReason, now: TimestampMs) -> Transition {
        let ended_session = self.end_active_session_at(reason, now, EndOptions::default());
        let kind = if ended_session.is_some() {
            TransitionKind::EndedNonTrackable
        } else {
            TransitionKind::NoopNonTrackable
        };
        Transition {
            kind,
            ended_session,
            active_session: None,
        }
    }

    /// Records `fingerprint` as the latest context and reports whether it
    /// duplicates the previous one within the debounce window.
    fn observe_context(&mut self, fingerprint: String, now: TimestampMs) -> bool {
        let duplicate = fingerprint == self.state.last_context_fingerprint
            && now.saturating_sub(self.state.last_context_at) < self.debounce_ms;
        self.state.last_context_fingerprint = fingerprint;
        self.state.last_context_at = now;
        duplicate
    }

    fn next_session_id(&mut self) -> SessionId {
        SessionId::new(self.ids.next_id()).unwrap_or_else(|_| {
            tracing::warn!("id generator returned an empty id, using a random one");
            SessionId::random()
        })
    }
}
