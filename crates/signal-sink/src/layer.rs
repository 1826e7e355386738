// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! `tracing` integration: ship every `tracing` event through an [`HttpSink`].

use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

use crate::constants::{CRATE_TARGET, TRANSPORT_TARGETS};
use crate::event::LogEvent;
use crate::log_level::LogLevel;
use crate::sink::HttpSink;

/// A [`Layer`] forwarding events at or above the sink's minimum level.
///
/// Events emitted by this crate itself or by the HTTP stack it posts with are
/// skipped, otherwise every flush would log about the previous flush and keep
/// the sink busy forever.
#[derive(Debug, Clone)]
pub struct SignalLayer {
    sink: HttpSink,
}

impl SignalLayer {
    #[must_use]
    pub fn new(sink: HttpSink) -> Self {
        SignalLayer { sink }
    }
}

impl<S> Layer<S> for SignalLayer
where
    S: Subscriber,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if is_internal_target(metadata.target()) {
            return;
        }
        let level = LogLevel::from(*metadata.level());
        if !self.sink.minimum_level().admits(level) {
            return;
        }

        let mut visitor = EventVisitor::default();
        event.record(&mut visitor);

        let mut log_event = LogEvent::new(level, visitor.message.unwrap_or_default());
        log_event.exception = visitor.exception;
        log_event.properties = visitor.properties;
        log_event
            .properties
            .insert("target".to_string(), Value::from(metadata.target()));

        self.sink.emit(&log_event);
    }
}

fn is_internal_target(target: &str) -> bool {
    std::iter::once(CRATE_TARGET)
        .chain(TRANSPORT_TARGETS.iter().copied())
        .any(|prefix| {
            target == prefix
                || target
                    .strip_prefix(prefix)
                    .is_some_and(|rest| rest.starts_with("::"))
        })
}

/// Collects the fields of one event: `message`, `error`/`exception`, and the rest as properties.
#[derive(Default)]
struct EventVisitor {
    message: Option<String>,
    exception: Option<String>,
    properties: BTreeMap<String, Value>,
}

impl EventVisitor {
    fn record_value(&mut self, field: &Field, value: Value) {
        match field.name() {
            "message" => {
                self.message = Some(match value {
                    Value::String(s) => s,
                    other => other.to_string(),
                });
            }
            "error" | "exception" => {
                self.exception = Some(match value {
                    Value::String(s) => s,
                    other => other.to_string(),
                });
            }
            name => {
                self.properties.insert(name.to_string(), value);
            }
        }
    }
}

impl Visit for EventVisitor {
    fn record_f64(&mut self, field: &Field, value: f64) {
        self.record_value(field, Value::from(value));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.record_value(field, Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.record_value(field, Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.record_value(field, Value::from(value));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.record_value(field, Value::from(value));
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.record_value(field, Value::from(value.to_string()));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.record_value(field, Value::from(format!("{value:?}")));
    }
}
