// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use reqwest::StatusCode;

/// Errors surfaced to the code that builds, starts or stops a sink.
///
/// Nothing in here is ever returned from [`crate::sink::HttpSink::emit`]: dropped
/// events are silent by contract.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Missing required setting: {0}")]
    MissingSetting(&'static str),

    #[error("Sink already started")]
    AlreadyStarted,

    #[error("Sink must be started from within a tokio runtime")]
    NoRuntime,

    #[error("Shutdown timeout exceeded")]
    ShutdownTimeout,
}

/// Outcome of a failed dispatch. Caught and logged by the flush cycle.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Failed to serialize payload: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Failed to compress payload: {0}")]
    Compress(#[from] std::io::Error),

    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Collector responded with {0}")]
    Status(StatusCode),
}
