//! Duration arithmetic and formatting.

use crate::types::TimestampMs;

const ONE_SECOND_MS: i64 = 1000;
const ONE_MINUTE_SECONDS: i64 = 60;
const ONE_HOUR_SECONDS: i64 = 3600;

/// Whole seconds between two millisecond timestamps, rounded half up.
///
/// Never negative: an `end_at` before `start_at` yields zero.
pub const fn duration_seconds(start_at: TimestampMs, end_at: TimestampMs) -> i64 {
    let delta_ms = end_at.saturating_sub(start_at);
    if delta_ms <= 0 {
        return 0;
    }
    delta_ms.saturating_add(ONE_SECOND_MS / 2) / ONE_SECOND_MS
}

/// Formats seconds for display: `45s`, `5m`, `5m 3s`, `2h 5m`.
pub fn format_duration(total_seconds: i64) -> String {
    let seconds_total = total_seconds.max(0);

    if seconds_total < ONE_MINUTE_SECONDS {
        return format!("{seconds_total}s");
    }

    let hours = seconds_total / ONE_HOUR_SECONDS;
    let minutes = (seconds_total % ONE_HOUR_SECONDS) / ONE_MINUTE_SECONDS;
    let seconds = seconds_total % ONE_MINUTE_SECONDS;

    if hours > 0 {
        return format!("{hours}h {minutes}m");
    }
    if seconds == 0 {
        return format!("{minutes}m");
    }
    format!("{minutes}m {seconds}s")
}
