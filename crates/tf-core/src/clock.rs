//! Injectable time and identifier sources.

use chrono::Utc;
use uuid::Uuid;

use crate::types::TimestampMs;

/// Source of the current time in milliseconds.
pub trait Clock {
    fn now_ms(&self) -> TimestampMs;
}

/// Wall clock backed by `chrono::Utc`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> TimestampMs {
        Utc::now().timestamp_millis()
    }
}

impl<F> Clock for F
where
    F: Fn() -> TimestampMs,
{
    fn now_ms(&self) -> TimestampMs {
        self()
    }
}

/// Source of unique identifiers.
pub trait IdGenerator {
    fn next_id(&mut self) -> String;
}

/// Random v4 UUIDs.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn next_id(&mut self) -> String {
        Uuid::new_v4().to_string()
    }
}

impl<F> IdGenerator for F
where
    F: FnMut() -> String,
{
    fn next_id(&mut self) -> String {
        self()
    }
}
