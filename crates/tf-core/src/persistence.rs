//! Checkpointing engine runtime state to a key/value store.
//!
//! The store holds a record only while a session is open. Once nothing is
//! tracked the key is deleted, so a restart never resumes a stale session.

use std::collections::HashMap;
use std::convert::Infallible;

use serde_json::Value;
use thiserror::Error;

use crate::engine::RuntimeState;

/// Fixed key under which runtime state is stored.
pub const RUNTIME_STATE_KEY: &str = "runtime_state_v2";

/// Minimal key/value store for runtime state.
pub trait RuntimeStore {
    type Error: std::error::Error + Send + Sync + 'static;

    fn get(&self, key: &str) -> Result<Option<String>, Self::Error>;
    fn put(&mut self, key: &str, value: &str) -> Result<(), Self::Error>;
    fn delete(&mut self, key: &str) -> Result<(), Self::Error>;
}

/// Errors from persisting or loading runtime state.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("runtime store error: {0}")]
    Store(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("failed to serialize runtime state: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl PersistenceError {
    fn store(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Store(Box::new(err))
    }
}

/// Writes `state` when a session is active, otherwise deletes the record.
pub fn persist_runtime_state<S: RuntimeStore>(
    store: &mut S,
    state: &RuntimeState,
) -> Result<(), PersistenceError> {
    if state.active_session.is_some() {
        let json = serde_json::to_string(state)?;
        store
            .put(RUNTIME_STATE_KEY, &json)
            .map_err(PersistenceError::store)?;
    } else {
        store
            .delete(RUNTIME_STATE_KEY)
            .map_err(PersistenceError::store)?;
    }
    Ok(())
}

/// Loads the stored runtime state as raw JSON for hydration.
///
/// A missing record is `Ok(None)`. A record that is not valid JSON is logged
/// and also treated as missing.
pub fn load_runtime_state<S: RuntimeStore>(store: &S) -> Result<Option<Value>, PersistenceError> {
    let Some(raw) = store
        .get(RUNTIME_STATE_KEY)
        .map_err(PersistenceError::store)?
    else {
        return Ok(None);
    };

    match serde_json::from_str(&raw) {
        Ok(value) => Ok(Some(value)),
        Err(err) => {
            tracing::warn!(error = %err, "stored runtime state is not valid JSON");
            Ok(None)
        }
    }
}

/// In-memory store for tests and dry runs.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl RuntimeStore for MemoryStore {
    type Error = Infallible;

    fn get(&self, key: &str) -> Result<Option<String>, Self::Error> {
        Ok(self.entries.get(key).cloned())
    }

    fn put(&mut self, key: &str, value: &str) -> Result<(), Self::Error> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&mut self, key: &str) -> Result<(), Self::Error> {
        self.entries.remove(key);
        Ok(())
    }
}
