// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Transport posting formatted batches to the Signal gateway.

use std::env;
use std::io::Write;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use flate2::write::GzEncoder;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_ENCODING, CONTENT_TYPE};
use serde::Serialize;
use tracing::debug;
use zstd::stream::write::Encoder as ZstdEncoder;

use crate::constants;
use crate::error::{SinkError, TransportError};
use crate::http::get_client;

/// Body of a Signal REST `send` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignalLogMessage {
    pub message: String,
    pub number: String,
    pub recipients: Vec<String>,
}

/// Posts one message to the collector.
///
/// A failed post is reported through the returned error and is never retried
/// by the sink.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn post(
        &self,
        request_uri: &str,
        message: &SignalLogMessage,
    ) -> Result<(), TransportError>;
}

/// Content encoding applied to the JSON body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
    #[default]
    None,
    Gzip,
    Zstd,
}

impl Compression {
    fn content_encoding(self) -> Option<&'static str> {
        match self {
            Compression::None => None,
            Compression::Gzip => Some("gzip"),
            Compression::Zstd => Some("zstd"),
        }
    }
}

impl FromStr for Compression {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "" | "none" => Ok(Compression::None),
            "gzip" => Ok(Compression::Gzip),
            "zstd" => Ok(Compression::Zstd),
            _ => Err(format!(
                "Invalid compression: '{s}'. Valid values are: none, gzip, zstd"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpClientConfig {
    pub timeout: Duration,
    pub https_proxy: Option<String>,
    pub compression: Compression,
    /// gzip accepts 0-9, zstd 1-22; out of range values are clamped
    pub compression_level: i32,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: constants::DEFAULT_HTTP_TIMEOUT,
            https_proxy: None,
            compression: Compression::None,
            compression_level: constants::DEFAULT_COMPRESSION_LEVEL,
        }
    }
}

impl HttpClientConfig {
    pub fn from_env() -> Result<Self, SinkError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, SinkError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let timeout = match lookup("SIGNAL_HTTP_TIMEOUT_SECS") {
            Some(val) => Duration::from_secs(val.trim().parse().map_err(|_| {
                SinkError::InvalidConfig(format!(
                    "SIGNAL_HTTP_TIMEOUT_SECS has invalid value '{val}'"
                ))
            })?),
            None => defaults.timeout,
        };
        let compression = match lookup("SIGNAL_COMPRESSION") {
            Some(val) => Compression::from_str(&val).map_err(SinkError::InvalidConfig)?,
            None => defaults.compression,
        };
        let compression_level = match lookup("SIGNAL_COMPRESSION_LEVEL") {
            Some(val) => val.trim().parse().map_err(|_| {
                SinkError::InvalidConfig(format!(
                    "SIGNAL_COMPRESSION_LEVEL has invalid value '{val}'"
                ))
            })?,
            None => defaults.compression_level,
        };
        let https_proxy = lookup("SIGNAL_PROXY_HTTPS").or_else(|| lookup("HTTPS_PROXY"));

        Ok(Self {
            timeout,
            https_proxy,
            compression,
            compression_level,
        })
    }
}

/// Posts messages as JSON, optionally gzip or zstd compressed.
#[derive(Debug, Clone)]
pub struct JsonHttpClient {
    client: reqwest::Client,
    compression: Compression,
    compression_level: i32,
    headers: HeaderMap,
}

impl JsonHttpClient {
    #[must_use]
    pub fn new(config: &HttpClientConfig) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(encoding) = config.compression.content_encoding() {
            headers.insert(CONTENT_ENCODING, HeaderValue::from_static(encoding));
        }

        JsonHttpClient {
            client: get_client(config),
            compression: config.compression,
            compression_level: config.compression_level,
            headers,
        }
    }

    /// A client compressing every body with gzip at the default level.
    #[must_use]
    pub fn gzip() -> Self {
        Self::new(&HttpClientConfig {
            compression: Compression::Gzip,
            ..Default::default()
        })
    }

    fn encode(&self, body: Vec<u8>) -> Result<Vec<u8>, TransportError> {
        match self.compression {
            Compression::None => Ok(body),
            Compression::Gzip => {
                let level = u32::try_from(self.compression_level.clamp(0, 9)).unwrap_or(6);
                let mut encoder = GzEncoder::new(Vec::new(), flate2::Compression::new(level));
                encoder.write_all(&body)?;
                Ok(encoder.finish()?)
            }
            Compression::Zstd => {
                let mut encoder = ZstdEncoder::new(Vec::new(), self.compression_level.clamp(1, 22))?;
                encoder.write_all(&body)?;
                Ok(encoder.finish()?)
            }
        }
    }
}

impl Default for JsonHttpClient {
    fn default() -> Self {
        Self::new(&HttpClientConfig::default())
    }
}

#[async_trait]
impl HttpClient for JsonHttpClient {
    async fn post(
        &self,
        request_uri: &str,
        message: &SignalLogMessage,
    ) -> Result<(), TransportError> {
        let body = self.encode(serde_json::to_vec(message)?)?;
        let size = body.len();

        let response = self
            .client
            .post(request_uri)
            .headers(self.headers.clone())
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            debug!("Posted {size} bytes to {request_uri}: {status}");
            Ok(())
        } else {
            Err(TransportError::Status(status))
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::io::Read;

    fn message() -> SignalLogMessage {
        SignalLogMessage {
            message: "[\"a\"]".to_string(),
            number: "+4912345".to_string(),
            recipients: vec!["+4967890".to_string()],
        }
    }

    #[test]
    fn test_message_serialization() {
        let json = serde_json::to_string(&message()).unwrap();

        assert_eq!(
            json,
            r#"{"message":"[\"a\"]","number":"+4912345","recipients":["+4967890"]}"#
        );
    }

    #[test]
    fn test_compression_from_str() {
        assert_eq!(Compression::from_str("GZIP").unwrap(), Compression::Gzip);
        assert_eq!(Compression::from_str("zstd").unwrap(), Compression::Zstd);
        assert_eq!(Compression::from_str("none").unwrap(), Compression::None);
        assert!(Compression::from_str("brotli").is_err());
    }

    #[test]
    fn test_headers_without_compression() {
        let client = JsonHttpClient::default();

        assert_eq!(client.headers[CONTENT_TYPE], "application/json");
        assert!(!client.headers.contains_key(CONTENT_ENCODING));
    }

    #[test]
    fn test_gzip_encode_round_trip() {
        let client = JsonHttpClient::gzip();
        let body = serde_json::to_vec(&message()).unwrap();

        let encoded = client.encode(body.clone()).unwrap();

        assert_eq!(client.headers[CONTENT_ENCODING], "gzip");
        let mut decoded = Vec::new();
        GzDecoder::new(encoded.as_slice())
            .read_to_end(&mut decoded)
            .unwrap();
        assert_eq!(decoded, body);
    }

    #[test]
    fn test_zstd_encode_round_trip() {
        let client = JsonHttpClient::new(&HttpClientConfig {
            compression: Compression::Zstd,
            ..Default::default()
        });
        let body = serde_json::to_vec(&message()).unwrap();

        let encoded = client.encode(body.clone()).unwrap();

        assert_eq!(client.headers[CONTENT_ENCODING], "zstd");
        assert_eq!(zstd::decode_all(encoded.as_slice()).unwrap(), body);
    }

    #[test]
    fn test_config_from_lookup() {
        let config = HttpClientConfig::from_lookup(|key| match key {
            "SIGNAL_COMPRESSION" => Some("gzip".to_string()),
            "SIGNAL_HTTP_TIMEOUT_SECS" => Some("3".to_string()),
            "HTTPS_PROXY" => Some("http://proxy:3128".to_string()),
            _ => None,
        })
        .unwrap();

        assert_eq!(config.compression, Compression::Gzip);
        assert_eq!(config.timeout, Duration::from_secs(3));
        assert_eq!(config.https_proxy.as_deref(), Some("http://proxy:3128"));
        assert_eq!(config.compression_level, 3);
    }

    #[test]
    fn test_config_from_lookup_rejects_unknown_compression() {
        let result = HttpClientConfig::from_lookup(|key| {
            (key == "SIGNAL_COMPRESSION").then(|| "lz4".to_string())
        });

        assert!(matches!(result, Err(SinkError::InvalidConfig(_))));
    }
}
