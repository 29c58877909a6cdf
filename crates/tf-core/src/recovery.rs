//! Validated parsing of runtime state recovered from storage.
//!
//! Stored runtime state may come from an older build or be partially
//! corrupted. Rather than coercing every field, the active session fragment is
//! either restored whole or discarded with a reason.

use serde_json::{Map, Value};
use thiserror::Error;

use crate::clock::IdGenerator;
use crate::page::{extract_domain, readable_title};
use crate::session::{EndReason, FocusSession};
use crate::types::{ActivityId, SessionId, TimestampMs};

/// Why a stored active session could not be restored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DiscardReason {
    #[error("active session is not an object")]
    NotAnObject,
    #[error("{field} is not a finite number")]
    InvalidTimestamp { field: &'static str },
    #[error("{field} is not an integer")]
    InvalidHostId { field: &'static str },
    #[error("no session id could be assigned")]
    MissingId,
}

/// Outcome of parsing the stored active session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionRecovery {
    /// No session was stored.
    Absent,
    Restored(FocusSession),
    Discarded(DiscardReason),
}

/// Reads a millisecond timestamp from a JSON number.
#[expect(
    clippy::cast_possible_truncation,
    reason = "stored timestamps are rounded to whole milliseconds"
)]
pub(crate) fn finite_millis(value: &Value) -> Option<TimestampMs> {
    if let Some(millis) = value.as_i64() {
        return Some(millis);
    }
    value
        .as_f64()
        .filter(|millis| millis.is_finite())
        .map(|millis| millis.round() as i64)
}

fn non_empty_str<'a>(fields: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    fields
        .get(key)
        .and_then(Value::as_str)
        .filter(|value| !value.is_empty())
}

fn timestamp_field(
    fields: &Map<String, Value>,
    field: &'static str,
) -> Result<TimestampMs, DiscardReason> {
    fields
        .get(field)
        .and_then(finite_millis)
        .ok_or(DiscardReason::InvalidTimestamp { field })
}

fn host_id_field(fields: &Map<String, Value>, field: &'static str) -> Result<i64, DiscardReason> {
    fields
        .get(field)
        .and_then(Value::as_i64)
        .ok_or(DiscardReason::InvalidHostId { field })
}

fn parse_session(
    fields: &Map<String, Value>,
    ids: &mut dyn IdGenerator,
) -> Result<FocusSession, DiscardReason> {
    let start_at = timestamp_field(fields, "startAt")?;
    let end_at = timestamp_field(fields, "endAt")?;
    let tab_id = host_id_field(fields, "tabId")?;
    let window_id = host_id_field(fields, "windowId")?;

    let id = non_empty_str(fields, "id")
        .and_then(|id| SessionId::new(id).ok())
        .or_else(|| SessionId::new(ids.next_id()).ok())
        .ok_or(DiscardReason::MissingId)?;
    let url = non_empty_str(fields, "url").unwrap_or_default().to_string();

    Ok(FocusSession {
        id,
        activity_id: ActivityId::from_optional(non_empty_str(fields, "activityId")),
        tab_id,
        window_id,
        title: readable_title(
            fields.get("title").and_then(Value::as_str),
            Some(&url),
        ),
        domain: extract_domain(&url),
        url,
        start_at,
        end_at,
        duration_sec: fields
            .get("durationSec")
            .and_then(finite_millis)
            .unwrap_or(0)
            .max(0),
        end_reason: non_empty_str(fields, "endReason")
            .map_or(EndReason::Unknown, EndReason::from),
    })
}

/// Parses the `activeSession` fragment of a stored runtime state.
///
/// A missing id is regenerated with `ids`; domain and title are re-derived
/// from the URL. Missing or non-numeric timestamps or host ids discard the
/// whole session.
pub fn recover_session(value: Option<&Value>, ids: &mut dyn IdGenerator) -> SessionRecovery {
    match value {
        None | Some(Value::Null) => SessionRecovery::Absent,
        Some(Value::Object(fields)) => match parse_session(fields, ids) {
            Ok(session) => SessionRecovery::Restored(session),
            Err(reason) => SessionRecovery::Discarded(reason),
        },
        Some(_) => SessionRecovery::Discarded(DiscardReason::NotAnObject),
    }
}
