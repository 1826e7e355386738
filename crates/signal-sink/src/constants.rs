// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

/// Default number of events combined into one payload.
pub const DEFAULT_LOG_EVENTS_IN_BATCH_LIMIT: usize = 1000;

/// Default time between two flush cycles.
pub const DEFAULT_PERIOD: Duration = Duration::from_secs(2);

/// Upper bound for the drain performed on shutdown, including in-flight requests.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

pub const DEFAULT_COMPRESSION_LEVEL: i32 = 3;

/// Round-trip specifier, accepted as an alias for RFC 3339.
pub const ROUND_TRIP_TIME_FORMAT: &str = "o";

/// Events recorded under this target are never shipped by [`crate::layer::SignalLayer`].
pub const CRATE_TARGET: &str = "signal_sink";

/// Targets of the HTTP stack used to post batches. Shipping their events
/// would make every flush enqueue the next one.
pub const TRANSPORT_TARGETS: &[&str] = &["h2", "hyper", "hyper_util", "reqwest", "rustls"];
