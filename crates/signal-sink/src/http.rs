// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use core::time::Duration;
use std::error::Error;

use tracing::error;

use crate::http_client::HttpClientConfig;

/// Builds the `reqwest` client used for the collector.
///
/// A proxy that cannot be parsed is logged and ignored instead of failing the
/// sink: losing the proxy is better than losing every log event.
#[must_use]
pub fn get_client(config: &HttpClientConfig) -> reqwest::Client {
    match build_client(config, true) {
        Ok(client) => client,
        Err(e) => {
            error!(
                "Unable to parse proxy configuration: {}, falling back to direct connection",
                e
            );
            match build_client(config, false) {
                Ok(client) => client,
                Err(inner) => {
                    error!(
                        "Failed to build HTTP client without proxy: {}, using reqwest defaults",
                        inner
                    );
                    reqwest::Client::new()
                }
            }
        }
    }
}

fn build_client(
    config: &HttpClientConfig,
    allow_proxy: bool,
) -> Result<reqwest::Client, Box<dyn Error>> {
    let mut client = reqwest::Client::builder()
        .timeout(config.timeout)
        .pool_idle_timeout(Some(Duration::from_secs(270)))
        .tcp_keepalive(Some(Duration::from_secs(120)));

    if allow_proxy {
        if let Some(https_proxy) = &config.https_proxy {
            client = client.proxy(reqwest::Proxy::https(https_proxy)?);
        }
    }

    Ok(client.build()?)
}
