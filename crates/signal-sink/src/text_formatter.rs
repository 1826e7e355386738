// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Rendering of a single [`LogEvent`] into text.
//!
//! Rendering runs on the producer's thread before the queue lock is taken, so
//! formatters must be cheap and must not block.

use std::fmt::Write as _;

use serde::Serialize;
use serde_json::{Map, Value};
use time::format_description::well_known::Rfc3339;
use time::format_description::OwnedFormatItem;
use time::{OffsetDateTime, UtcOffset};

use crate::config::Options;
use crate::constants;
use crate::error::SinkError;
use crate::event::LogEvent;

/// Renders one event into its textual form.
pub trait TextFormatter: Send + Sync {
    fn format(&self, event: &LogEvent) -> String;
}

/// How timestamps are written, resolved once from [`Options`].
#[derive(Debug, Clone)]
pub struct TimestampFormat {
    in_utc: bool,
    format: Option<OwnedFormatItem>,
}

impl TimestampFormat {
    pub fn from_options(options: &Options) -> Result<Self, SinkError> {
        let description = options.time_format.trim();
        let format = if description.is_empty()
            || description == constants::ROUND_TRIP_TIME_FORMAT
            || description.eq_ignore_ascii_case("rfc3339")
        {
            None
        } else {
            Some(
                time::format_description::parse_owned::<2>(description).map_err(|e| {
                    SinkError::InvalidConfig(format!("invalid time_format '{description}': {e}"))
                })?,
            )
        };

        Ok(TimestampFormat {
            in_utc: options.timestamp_in_utc,
            format,
        })
    }

    #[must_use]
    pub fn render(&self, timestamp: OffsetDateTime) -> String {
        let timestamp = if self.in_utc {
            timestamp.to_offset(UtcOffset::UTC)
        } else {
            timestamp
        };

        let rendered = match &self.format {
            None => timestamp.format(&Rfc3339),
            Some(format) => timestamp.format(format),
        };
        // Only fails for years outside RFC 3339's four digits.
        rendered.unwrap_or_else(|_| timestamp.to_string())
    }
}

/// Renders an event as one compact JSON object.
///
/// ```json
/// {"Timestamp":"2024-03-01T10:00:00Z","Level":"ERROR","RenderedMessage":"disk full"}
/// ```
///
/// `Exception` and `Properties` are only written when present.
#[derive(Debug, Clone)]
pub struct NormalRenderedTextFormatter {
    timestamp: TimestampFormat,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct NormalRenderedEvent<'a> {
    timestamp: String,
    level: &'a str,
    rendered_message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    exception: Option<&'a str>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    properties: Map<String, Value>,
}

impl NormalRenderedTextFormatter {
    pub fn new(options: &Options) -> Result<Self, SinkError> {
        Ok(Self {
            timestamp: TimestampFormat::from_options(options)?,
        })
    }
}

impl TextFormatter for NormalRenderedTextFormatter {
    fn format(&self, event: &LogEvent) -> String {
        let rendered = NormalRenderedEvent {
            timestamp: self.timestamp.render(event.timestamp),
            level: event.level.as_ref(),
            rendered_message: &event.message,
            exception: event.exception.as_deref(),
            properties: event
                .properties
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        };
        // Serializing strings and JSON values into a String cannot fail.
        serde_json::to_string(&rendered).unwrap_or_default()
    }
}

/// Renders an event as a human readable line, `"{timestamp} [{LVL}] {message}"`.
///
/// Properties follow as `key=value` pairs and the exception, if any, on the next line.
#[derive(Debug, Clone)]
pub struct PlainTextFormatter {
    timestamp: TimestampFormat,
}

impl PlainTextFormatter {
    pub fn new(options: &Options) -> Result<Self, SinkError> {
        Ok(Self {
            timestamp: TimestampFormat::from_options(options)?,
        })
    }
}

impl TextFormatter for PlainTextFormatter {
    fn format(&self, event: &LogEvent) -> String {
        let mut line = format!(
            "{} [{}] {}",
            self.timestamp.render(event.timestamp),
            event.level.short_name(),
            event.message
        );
        for (key, value) in &event.properties {
            match value {
                Value::String(s) => {
                    let _ = write!(line, " {key}={s}");
                }
                other => {
                    let _ = write!(line, " {key}={other}");
                }
            }
        }
        if let Some(exception) = &event.exception {
            line.push('\n');
            line.push_str(exception);
        }
        line
    }
}
