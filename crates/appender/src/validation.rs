//! Payload validation and default-property merging.
//!
//! Pure functions with no connection state. The limits mirror what the
//! collection backend enforces server-side, so oversized payloads are
//! trimmed here instead of being rejected after transmission.

use crate::event::{EventData, PropertyValue};
use std::collections::HashMap;

/// Maximum length of a property or measurement key.
pub const MAX_KEY_LEN: usize = 150;

/// Maximum length of a string property value.
pub const MAX_VALUE_LEN: usize = 8192;

/// Merges default properties into an event payload.
///
/// Defaults fill in only where the event did not supply the key;
/// event-supplied values always win on collision.
pub fn merge_defaults(mut data: EventData, defaults: &HashMap<String, PropertyValue>) -> EventData {
    for (key, value) in defaults {
        if !data.properties.contains_key(key) {
            data.properties.insert(key.clone(), value.clone());
        }
    }
    data
}

/// Sanitizes a merged payload before transmission.
///
/// Drops empty keys, truncates over-long keys and string values, and
/// removes non-finite measurements. Never fails; malformed entries are
/// silently discarded rather than surfaced to the caller.
pub fn sanitize(data: EventData) -> EventData {
    let properties = data
        .properties
        .into_iter()
        .filter(|(key, _)| !key.is_empty())
        .map(|(key, value)| (truncate(key, MAX_KEY_LEN), sanitize_value(value)))
        .collect();

    let measurements = data
        .measurements
        .into_iter()
        .filter(|(key, value)| !key.is_empty() && value.is_finite())
        .map(|(key, value)| (truncate(key, MAX_KEY_LEN), value))
        .collect();

    EventData {
        properties,
        measurements,
    }
}

fn sanitize_value(value: PropertyValue) -> PropertyValue {
    match value {
        PropertyValue::String(s) => PropertyValue::String(truncate(s, MAX_VALUE_LEN)),
        other => other,
    }
}

fn truncate(mut s: String, max: usize) -> String {
    if s.len() > max {
        // Back up to the nearest char boundary so truncation stays valid UTF-8
        let mut end = max;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        s.truncate(end);
    }
    s
}
