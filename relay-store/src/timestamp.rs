use chrono::DateTime;
use relay_core::Event;
use serde_json::Value;

/// Rewrite a legacy string `timestamp` to epoch milliseconds.
///
/// Numbers and absent timestamps are left alone. Empty or unparsable strings
/// are removed so clients never receive a malformed value.
pub fn normalize_timestamp(event: &mut Event) {
    let Some(Value::String(raw)) = event.timestamp() else {
        return;
    };

    let normalized = if raw.is_empty() {
        None
    } else {
        match DateTime::parse_from_rfc3339(raw) {
            Ok(parsed) => Some(Value::from(parsed.timestamp_millis())),
            Err(_) => {
                tracing::warn!(timestamp = %raw, "removing unparsable event timestamp");
                None
            }
        }
    };

    event.set_timestamp(normalized);
}
