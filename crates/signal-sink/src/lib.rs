// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Non-durable log sink that batches events in memory and forwards them to a
//! Signal REST gateway over HTTP.
//!
//! # Architecture
//!
//! ```text
//!   application thread
//!          │  emit() / SignalLayer
//!          v
//!   ┌──────────────┐
//!   │ TextFormatter│  (render one event)
//!   └──────┬───────┘
//!          v
//!   ┌──────────────┐
//!   │ BoundedQueue │  (byte budget, drop-newest)
//!   └──────┬───────┘
//!          │  every `period`
//!          v
//!   ┌──────────────┐    ┌──────────────┐
//!   │BatchFormatter│ -> │  HttpClient  │ -> Signal gateway
//!   └──────────────┘    └──────────────┘
//! ```
//!
//! Events are dropped, never persisted, when the queue is full, when a single
//! event is larger than the per-event limit, or when a dispatch fails.
//!
//! # Example
//!
//! ```no_run
//! use signal_sink::config::{Options, SignalSettings, SinkConfig};
//! use signal_sink::event::LogEvent;
//! use signal_sink::log_level::LogLevel;
//! use signal_sink::sink::HttpSink;
//!
//! # async fn run() -> Result<(), signal_sink::error::SinkError> {
//! let options = Options {
//!     signal_settings: Some(SignalSettings {
//!         request_uri: "http://localhost:8080/v2/send".to_string(),
//!         sender_number: "+4912345".to_string(),
//!         recipients: vec!["+4967890".to_string()],
//!     }),
//!     ..Default::default()
//! };
//! let sink = HttpSink::builder(options)
//!     .config(SinkConfig {
//!         queue_limit_bytes: Some(1_024 * 1_024),
//!         ..Default::default()
//!     })
//!     .build()?;
//! sink.start()?;
//! sink.emit(&LogEvent::new(LogLevel::Error, "disk full"));
//! sink.shutdown().await?;
//! # Ok(())
//! # }
//! ```

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod batch_formatter;
pub mod config;
pub mod constants;
pub mod error;
pub mod event;
pub mod http;
pub mod http_client;
pub mod layer;
pub mod log_level;
pub mod queue;
pub mod sink;
pub mod text_formatter;
