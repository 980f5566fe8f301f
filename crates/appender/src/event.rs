use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Property value types for event metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for PropertyValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// Per-call event payload supplied to [`Appender::log`](crate::Appender::log).
///
/// Properties are merged with the appender's default properties before
/// submission; event-supplied values win on key collision. Measurements
/// are numeric-only and bypass the default set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventData {
    /// Event properties
    pub properties: HashMap<String, PropertyValue>,
    /// Numeric measurements
    pub measurements: HashMap<String, f64>,
}

impl EventData {
    /// Creates an empty payload
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a property
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Adds a measurement
    pub fn with_measurement(mut self, key: impl Into<String>, value: f64) -> Self {
        self.measurements.insert(key.into(), value);
        self
    }
}

/// A validated outbound event, ready for transmission.
///
/// Constructed per `log()` call and handed to the connection; not retained
/// after submission. The name carries the appender's event prefix.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Envelope {
    /// Fully-qualified event name (`{prefix}/{event_name}`)
    pub name: String,
    /// Sanitized event properties
    pub properties: HashMap<String, PropertyValue>,
    /// Sanitized numeric measurements
    pub measurements: HashMap<String, f64>,
}
