// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::env;
use std::process::ExitCode;

use tokio::io::{stdin, AsyncBufReadExt, BufReader};
use tracing::{debug, error, info};
use tracing_subscriber::{
    filter::filter_fn, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer,
};

use signal_sink::{
    config::{Options, SinkConfig},
    error::SinkError,
    event::LogEvent,
    http_client::HttpClientConfig,
    layer::SignalLayer,
    log_level::LogLevel,
    sink::HttpSink,
};

const BIN_TARGET: &str = "signal_forwarder";

fn build_sink() -> Result<HttpSink, SinkError> {
    let options = Options::from_env()?;
    let config = SinkConfig::from_env()?;
    let http_client_config = HttpClientConfig::from_env()?;

    HttpSink::builder(options)
        .config(config)
        .http_client_config(http_client_config)
        .build()
}

#[tokio::main]
pub async fn main() -> ExitCode {
    let log_level = env::var("SIGNAL_LOG_LEVEL")
        .map(|val| val.to_lowercase())
        .unwrap_or("info".to_string());
    let env_filter = format!("h2=off,hyper=off,rustls=off,{log_level}");
    let env_filter = EnvFilter::try_new(&env_filter).unwrap_or_else(|_| EnvFilter::new("info"));

    let sink = build_sink();

    // The sink applies its own minimum level; only the console output is env filtered.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_level(true)
                .with_thread_names(false)
                .with_thread_ids(false)
                .with_line_number(false)
                .with_file(false)
                .with_target(true)
                .without_time()
                .with_writer(std::io::stderr)
                .with_filter(env_filter),
        )
        .with(sink.as_ref().ok().map(|sink| {
            SignalLayer::new(sink.clone())
                .with_filter(filter_fn(|metadata| !metadata.target().starts_with(BIN_TARGET)))
        }))
        .init();

    debug!("Logging subsystem enabled");

    let sink = match sink {
        Ok(sink) => sink,
        Err(e) => {
            error!("Invalid sink configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = sink.start() {
        error!("Failed to start sink: {e}");
        return ExitCode::FAILURE;
    }
    info!("Forwarding stdin to Signal");

    let mut lines = BufReader::new(stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                debug!("Received interrupt, shutting down");
                break;
            }
            line = lines.next_line() => match line {
                Ok(Some(line)) if line.trim().is_empty() => {}
                Ok(Some(line)) => {
                    sink.emit(&LogEvent::new(LogLevel::Info, line));
                }
                Ok(None) => {
                    debug!("Reached end of input, shutting down");
                    break;
                }
                Err(e) => {
                    error!("Failed to read from stdin: {e}");
                    break;
                }
            }
        }
    }

    match sink.shutdown().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Sink did not shut down cleanly: {e}");
            ExitCode::FAILURE
        }
    }
}
