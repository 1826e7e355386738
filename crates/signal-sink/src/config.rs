// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::env;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::constants;
use crate::error::SinkError;
use crate::log_level::LogLevel;

/// Addressing of the Signal REST gateway.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SignalSettings {
    /// Full URI messages are posted to, e.g. `http://signal-api:8080/v2/send`
    pub request_uri: String,
    /// Registered number the gateway sends from
    pub sender_number: String,
    /// Numbers or group ids every message is delivered to
    pub recipients: Vec<String>,
}

/// Sink options shared by the formatters and the transport.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Options {
    pub signal_settings: Option<SignalSettings>,
    /// Render timestamps in UTC instead of the offset they were recorded with
    pub timestamp_in_utc: bool,
    /// `"o"` or `"rfc3339"` for RFC 3339, otherwise a `time` format description
    pub time_format: String,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            signal_settings: None,
            timestamp_in_utc: true,
            time_format: constants::ROUND_TRIP_TIME_FORMAT.to_string(),
        }
    }
}

impl Options {
    pub fn from_env() -> Result<Self, SinkError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Reads options through `lookup`, which maps a variable name to its value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, SinkError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let request_uri = lookup("SIGNAL_REQUEST_URI");
        let sender_number = lookup("SIGNAL_SENDER_NUMBER");
        let recipients = lookup("SIGNAL_RECIPIENTS").map(|val| {
            val.split(',')
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .map(str::to_string)
                .collect::<Vec<_>>()
        });

        let signal_settings = match (request_uri, sender_number, recipients) {
            (None, None, None) => None,
            (request_uri, sender_number, recipients) => Some(SignalSettings {
                request_uri: request_uri.ok_or(SinkError::MissingSetting("SIGNAL_REQUEST_URI"))?,
                sender_number: sender_number
                    .ok_or(SinkError::MissingSetting("SIGNAL_SENDER_NUMBER"))?,
                recipients: recipients.ok_or(SinkError::MissingSetting("SIGNAL_RECIPIENTS"))?,
            }),
        };

        let defaults = Self::default();
        let options = Self {
            signal_settings,
            timestamp_in_utc: parse_optional(
                &|key: &str| lookup(key).map(|val| val.to_lowercase()),
                "SIGNAL_TIMESTAMP_IN_UTC",
            )?
            .unwrap_or(defaults.timestamp_in_utc),
            time_format: lookup("SIGNAL_TIME_FORMAT").unwrap_or(defaults.time_format),
        };

        options.validate()?;
        Ok(options)
    }

    /// Fails unless the gateway address, sender and at least one recipient are set.
    pub fn validate(&self) -> Result<&SignalSettings, SinkError> {
        let settings = self
            .signal_settings
            .as_ref()
            .ok_or(SinkError::MissingSetting("signal_settings"))?;

        if settings.request_uri.trim().is_empty() {
            return Err(SinkError::MissingSetting("signal_settings.request_uri"));
        }
        if !settings.request_uri.starts_with("http://")
            && !settings.request_uri.starts_with("https://")
        {
            return Err(SinkError::InvalidConfig(format!(
                "request_uri '{}' must be an http or https URI",
                settings.request_uri
            )));
        }
        if settings.sender_number.trim().is_empty() {
            return Err(SinkError::MissingSetting("signal_settings.sender_number"));
        }
        if settings.recipients.is_empty() {
            return Err(SinkError::MissingSetting("signal_settings.recipients"));
        }

        Ok(settings)
    }
}

/// Limits and cadence of the in-memory queue and the flush loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkConfig {
    /// Maximum bytes buffered in memory; newer events are dropped beyond it
    pub queue_limit_bytes: Option<usize>,
    /// Events whose rendered form is larger are dropped
    pub log_event_limit_bytes: Option<usize>,
    pub log_events_in_batch_limit: Option<usize>,
    /// Approximate payload limit; framing added by the batch formatter is not counted
    pub batch_size_limit_bytes: Option<usize>,
    pub period: Duration,
    pub minimum_level: LogLevel,
    pub shutdown_timeout: Duration,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            queue_limit_bytes: None,
            log_event_limit_bytes: None,
            log_events_in_batch_limit: Some(constants::DEFAULT_LOG_EVENTS_IN_BATCH_LIMIT),
            batch_size_limit_bytes: None,
            period: constants::DEFAULT_PERIOD,
            minimum_level: LogLevel::default(),
            shutdown_timeout: constants::DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }
}

impl SinkConfig {
    pub fn from_env() -> Result<Self, SinkError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, SinkError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let config = Self {
            queue_limit_bytes: parse_optional(&lookup, "SIGNAL_QUEUE_LIMIT_BYTES")?,
            log_event_limit_bytes: parse_optional(&lookup, "SIGNAL_LOG_EVENT_LIMIT_BYTES")?,
            log_events_in_batch_limit: parse_optional(&lookup, "SIGNAL_LOG_EVENTS_IN_BATCH_LIMIT")?
                .or(defaults.log_events_in_batch_limit),
            batch_size_limit_bytes: parse_optional(&lookup, "SIGNAL_BATCH_SIZE_LIMIT_BYTES")?,
            period: parse_optional(&lookup, "SIGNAL_PERIOD_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.period),
            minimum_level: match lookup("SIGNAL_MINIMUM_LEVEL") {
                Some(val) => LogLevel::from_str(&val).map_err(SinkError::InvalidConfig)?,
                None => defaults.minimum_level,
            },
            shutdown_timeout: parse_optional(&lookup, "SIGNAL_SHUTDOWN_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.shutdown_timeout),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), SinkError> {
        if self.period.is_zero() {
            return Err(SinkError::InvalidConfig(
                "period must be greater than 0".to_string(),
            ));
        }
        if self.log_events_in_batch_limit == Some(0) {
            return Err(SinkError::InvalidConfig(
                "log_events_in_batch_limit must be greater than 0".to_string(),
            ));
        }
        if self.batch_size_limit_bytes == Some(0) {
            return Err(SinkError::InvalidConfig(
                "batch_size_limit_bytes must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_optional<F, T>(lookup: &F, key: &str) -> Result<Option<T>, SinkError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        None => Ok(None),
        Some(val) if val.trim().is_empty() => Ok(None),
        Some(val) => val
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| SinkError::InvalidConfig(format!("{key} has invalid value '{val}'"))),
    }
}
