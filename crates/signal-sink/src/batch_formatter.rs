// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Strategies turning a batch of rendered events into one payload.

use crate::event::RenderedEvent;

/// Combines rendered events into the text sent as one message.
///
/// Implementations must be deterministic and free of side effects.
pub trait BatchFormatter: Send + Sync {
    fn format(&self, events: &[RenderedEvent]) -> String;
}

/// Frames events as a JSON array, `[e1,e2,...]`.
///
/// Events are written verbatim, so the payload is valid JSON when the text
/// formatter renders JSON (the default).
#[derive(Debug, Clone, Copy, Default)]
pub struct ArrayBatchFormatter;

impl BatchFormatter for ArrayBatchFormatter {
    fn format(&self, events: &[RenderedEvent]) -> String {
        let content: usize = events.iter().map(RenderedEvent::byte_len).sum();
        let mut payload = String::with_capacity(content + events.len() + 2);

        payload.push('[');
        for (i, event) in events.iter().enumerate() {
            if i > 0 {
                payload.push(',');
            }
            payload.push_str(event.as_str());
        }
        payload.push(']');
        payload
    }
}

/// Joins events with a fixed delimiter.
#[derive(Debug, Clone)]
pub struct DelimitedBatchFormatter {
    delimiter: String,
}

impl DelimitedBatchFormatter {
    pub fn new(delimiter: impl Into<String>) -> Self {
        DelimitedBatchFormatter {
            delimiter: delimiter.into(),
        }
    }

    /// One event per line; reads naturally as a chat message.
    #[must_use]
    pub fn newline() -> Self {
        Self::new("\n")
    }
}

impl BatchFormatter for DelimitedBatchFormatter {
    fn format(&self, events: &[RenderedEvent]) -> String {
        events
            .iter()
            .map(RenderedEvent::as_str)
            .collect::<Vec<_>>()
            .join(&self.delimiter)
    }
}
