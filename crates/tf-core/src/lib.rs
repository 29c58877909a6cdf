//! Core domain logic for the tab focus tracker.
//!
//! This crate contains the fundamental types and logic for:
//! - Session engine: turning focus observations into timed focus sessions
//! - Trackability: deciding which tabs may be recorded
//! - Recovery: checkpointing and restoring engine state across restarts
//! - Tab activities and settings shared with the storage layer

pub mod activity;
pub mod classifier;
pub mod clock;
pub mod engine;
pub mod page;
pub mod persistence;
pub mod recovery;
pub mod session;
pub mod settings;
pub mod tab;
pub mod time;
pub mod types;

pub use activity::{ActivityView, MEANINGFUL_THRESHOLD_SEC, TabActivity, TabSnapshot};
pub use classifier::TrackabilityClassifier;
pub use clock::{Clock, IdGenerator, SystemClock, UuidGenerator};
pub use engine::{
    DEFAULT_DEBOUNCE_MS, EndOptions, EngineError, RuntimeState, SessionEngine,
    SessionEngineBuilder, Transition, TransitionKind,
};
pub use persistence::{
    MemoryStore, PersistenceError, RUNTIME_STATE_KEY, RuntimeStore, load_runtime_state,
    persist_runtime_state,
};
pub use recovery::{DiscardReason, SessionRecovery, recover_session};
pub use session::{EndReason, FocusSession};
pub use settings::{DEFAULT_RETENTION_DAYS, Settings, SettingsPatch, Theme};
pub use tab::{TabChange, TabContext};
pub use time::{duration_seconds, format_duration};
pub use types::{ActivityId, IdleState, SessionId, TimestampMs, ValidationError};
