// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::collections::BTreeMap;

use serde_json::Value;
use time::OffsetDateTime;

use crate::log_level::LogLevel;

/// A structured log event as handed to the sink by the application.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEvent {
    pub timestamp: OffsetDateTime,
    pub level: LogLevel,
    pub message: String,
    pub exception: Option<String>,
    pub properties: BTreeMap<String, Value>,
}

impl LogEvent {
    /// Creates an event stamped with the current local time (UTC when the local
    /// offset cannot be determined).
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        LogEvent {
            timestamp: OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc()),
            level,
            message: message.into(),
            exception: None,
            properties: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_timestamp(mut self, timestamp: OffsetDateTime) -> Self {
        self.timestamp = timestamp;
        self
    }

    #[must_use]
    pub fn with_exception(mut self, exception: impl Into<String>) -> Self {
        self.exception = Some(exception.into());
        self
    }

    #[must_use]
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}

/// The text form of an event together with its size in bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedEvent {
    text: String,
    byte_len: usize,
}

impl RenderedEvent {
    pub fn new(text: String) -> Self {
        let byte_len = text.len();
        RenderedEvent { text, byte_len }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn byte_len(&self) -> usize {
        self.byte_len
    }

    #[must_use]
    pub fn into_string(self) -> String {
        self.text
    }
}

impl From<String> for RenderedEvent {
    fn from(text: String) -> Self {
        RenderedEvent::new(text)
    }
}

impl From<&str> for RenderedEvent {
    fn from(text: &str) -> Self {
        RenderedEvent::new(text.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn test_rendered_event_counts_bytes_not_chars() {
        let event = RenderedEvent::from("héllo");
        assert_eq!(event.byte_len(), 6);
        assert_eq!(event.as_str(), "héllo");
    }

    #[test]
    fn test_log_event_builders() {
        let event = LogEvent::new(LogLevel::Warn, "disk almost full")
            .with_timestamp(datetime!(2024-03-01 10:00:00 UTC))
            .with_exception("IoError: ENOSPC")
            .with_property("free_mb", 12);

        assert_eq!(event.level, LogLevel::Warn);
        assert_eq!(event.message, "disk almost full");
        assert_eq!(event.exception.as_deref(), Some("IoError: ENOSPC"));
        assert_eq!(event.properties["free_mb"], Value::from(12));
        assert_eq!(event.timestamp, datetime!(2024-03-01 10:00:00 UTC));
    }
}
