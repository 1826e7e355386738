// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The sink: producers enqueue rendered events, a background task flushes them.
//!
//! # Lifecycle
//!
//! ```text
//! Idle --start()--> Running --shutdown()--> Draining --> Stopped
//! ```
//!
//! While `Running`, one flush cycle runs per `period`. A cycle that outlasts
//! the period delays the next tick; cycles never overlap and missed ticks are
//! not replayed.
//!
//! On shutdown the task performs a bounded drain: at most as many cycles as
//! there were events queued when the drain began, so producers that keep
//! logging cannot hold the process open.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::batch_formatter::{ArrayBatchFormatter, BatchFormatter};
use crate::config::{Options, SignalSettings, SinkConfig};
use crate::error::SinkError;
use crate::event::{LogEvent, RenderedEvent};
use crate::http_client::{HttpClient, HttpClientConfig, JsonHttpClient, SignalLogMessage};
use crate::log_level::LogLevel;
use crate::queue::{BoundedQueue, EnqueueOutcome, QueueStats};
use crate::text_formatter::{NormalRenderedTextFormatter, TextFormatter};

/// Lifecycle state of an [`HttpSink`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkState {
    /// Built, flush task not started.
    Idle,
    /// Flushing one batch per period.
    Running,
    /// Shutdown requested, flushing what is left.
    Draining,
    /// Terminal. Events may still be enqueued but are never sent.
    Stopped,
}

/// Assembles an [`HttpSink`]; unset collaborators fall back to the defaults.
pub struct HttpSinkBuilder {
    options: Options,
    config: SinkConfig,
    text_formatter: Option<Arc<dyn TextFormatter>>,
    batch_formatter: Option<Arc<dyn BatchFormatter>>,
    http_client: Option<Arc<dyn HttpClient>>,
    http_client_config: Option<HttpClientConfig>,
}

impl HttpSinkBuilder {
    #[must_use]
    pub fn config(mut self, config: SinkConfig) -> Self {
        self.config = config;
        self
    }

    /// Defaults to [`NormalRenderedTextFormatter`].
    #[must_use]
    pub fn text_formatter(mut self, formatter: Arc<dyn TextFormatter>) -> Self {
        self.text_formatter = Some(formatter);
        self
    }

    /// Defaults to [`ArrayBatchFormatter`].
    #[must_use]
    pub fn batch_formatter(mut self, formatter: Arc<dyn BatchFormatter>) -> Self {
        self.batch_formatter = Some(formatter);
        self
    }

    /// Defaults to a [`JsonHttpClient`] built from [`Self::http_client_config`].
    #[must_use]
    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Configuration for the default client. Ignored when a client is supplied.
    #[must_use]
    pub fn http_client_config(mut self, config: HttpClientConfig) -> Self {
        self.http_client_config = Some(config);
        self
    }

    /// Validates the configuration and creates an idle sink.
    pub fn build(self) -> Result<HttpSink, SinkError> {
        let settings = self.options.validate()?.clone();
        self.config.validate()?;

        let text_formatter = match self.text_formatter {
            Some(formatter) => formatter,
            None => Arc::new(NormalRenderedTextFormatter::new(&self.options)?),
        };
        let batch_formatter = self
            .batch_formatter
            .unwrap_or_else(|| Arc::new(ArrayBatchFormatter));
        let http_client = match self.http_client {
            Some(client) => client,
            None => Arc::new(JsonHttpClient::new(
                &self.http_client_config.unwrap_or_default(),
            )),
        };

        let queue = BoundedQueue::new(
            self.config.queue_limit_bytes,
            self.config.log_event_limit_bytes,
        );

        Ok(HttpSink {
            inner: Arc::new(SinkInner {
                settings,
                config: self.config,
                queue,
                text_formatter,
                batch_formatter,
                http_client,
                state: Mutex::new(SinkState::Idle),
                task: Mutex::new(None),
                cancel_token: CancellationToken::new(),
            }),
        })
    }
}

struct SinkInner {
    settings: SignalSettings,
    config: SinkConfig,
    queue: BoundedQueue,
    text_formatter: Arc<dyn TextFormatter>,
    batch_formatter: Arc<dyn BatchFormatter>,
    http_client: Arc<dyn HttpClient>,
    state: Mutex<SinkState>,
    task: Mutex<Option<JoinHandle<()>>>,
    cancel_token: CancellationToken,
}

/// Non-durable batching sink forwarding log events to a Signal gateway.
///
/// Cheap to clone; all clones share the same queue and flush task.
#[derive(Clone)]
pub struct HttpSink {
    inner: Arc<SinkInner>,
}

impl std::fmt::Debug for HttpSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpSink")
            .field("request_uri", &self.inner.settings.request_uri)
            .field("state", &self.state())
            .field("queue", &self.queue_stats())
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl HttpSink {
    #[must_use]
    pub fn builder(options: Options) -> HttpSinkBuilder {
        HttpSinkBuilder {
            options,
            config: SinkConfig::default(),
            text_formatter: None,
            batch_formatter: None,
            http_client: None,
            http_client_config: None,
        }
    }

    #[must_use]
    pub fn state(&self) -> SinkState {
        *lock(&self.inner.state)
    }

    #[must_use]
    pub fn minimum_level(&self) -> LogLevel {
        self.inner.config.minimum_level
    }

    #[must_use]
    pub fn queue_stats(&self) -> QueueStats {
        self.inner.queue.stats()
    }

    /// Renders `event` and queues it for the next flush.
    ///
    /// Never blocks on I/O and never fails: oversized events and events that do
    /// not fit the queue are dropped. Returns `None` when the event is below the
    /// minimum level and was not rendered at all.
    pub fn emit(&self, event: &LogEvent) -> Option<EnqueueOutcome> {
        if !self.inner.config.minimum_level.admits(event.level) {
            return None;
        }
        let rendered = RenderedEvent::new(self.inner.text_formatter.format(event));
        Some(self.inner.queue.enqueue(rendered))
    }

    /// Spawns the periodic flush task on the current tokio runtime.
    pub fn start(&self) -> Result<(), SinkError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| SinkError::NoRuntime)?;

        // Running implies the task handle is stored.
        let mut state = lock(&self.inner.state);
        if *state != SinkState::Idle {
            return Err(SinkError::AlreadyStarted);
        }
        let inner = Arc::clone(&self.inner);
        let handle = runtime.spawn(async move { inner.run().await });
        *lock(&self.inner.task) = Some(handle);
        *state = SinkState::Running;
        drop(state);

        debug!(
            "Signal sink started, flushing every {}ms",
            self.inner.config.period.as_millis()
        );
        Ok(())
    }

    /// Runs one flush cycle now. Returns the number of events dispatched,
    /// whether or not the dispatch succeeded.
    pub async fn flush_cycle(&self) -> usize {
        self.inner.flush_cycle().await
    }

    /// Stops the flush task after a bounded drain of the queue.
    ///
    /// Returns [`SinkError::ShutdownTimeout`] when the drain does not finish
    /// within the configured shutdown timeout; the task is aborted and the
    /// remaining events are discarded.
    pub async fn shutdown(&self) -> Result<(), SinkError> {
        let previous = {
            let mut state = lock(&self.inner.state);
            let previous = *state;
            if matches!(previous, SinkState::Idle | SinkState::Running) {
                *state = SinkState::Draining;
            }
            previous
        };

        let timeout = self.inner.config.shutdown_timeout;
        match previous {
            SinkState::Draining | SinkState::Stopped => Ok(()),
            SinkState::Idle => {
                let drained = tokio::time::timeout(timeout, self.inner.drain()).await;
                self.inner.set_state(SinkState::Stopped);
                drained.map_err(|_| SinkError::ShutdownTimeout)
            }
            SinkState::Running => {
                self.inner.cancel_token.cancel();
                let Some(mut task) = lock(&self.inner.task).take() else {
                    self.inner.set_state(SinkState::Stopped);
                    return Ok(());
                };

                match tokio::time::timeout(timeout, &mut task).await {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(e)) => {
                        error!("Signal sink flush task failed: {e}");
                        self.inner.set_state(SinkState::Stopped);
                        Ok(())
                    }
                    Err(_) => {
                        warn!(
                            "Signal sink drain exceeded {}ms, discarding {} queued events",
                            timeout.as_millis(),
                            self.inner.queue.len()
                        );
                        task.abort();
                        self.inner.set_state(SinkState::Stopped);
                        Err(SinkError::ShutdownTimeout)
                    }
                }
            }
        }
    }
}

impl SinkInner {
    fn set_state(&self, state: SinkState) {
        *lock(&self.state) = state;
    }

    /// Moves to `state` unless the sink is already `Stopped`, which is terminal.
    fn advance_state(&self, state: SinkState) -> bool {
        let mut current = lock(&self.state);
        if *current == SinkState::Stopped {
            return false;
        }
        *current = state;
        true
    }

    async fn run(&self) {
        let mut flush_interval = interval(self.config.period);
        flush_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        flush_interval.tick().await; // discard first tick, which is instantaneous

        loop {
            tokio::select! {
                biased;
                () = self.cancel_token.cancelled() => break,
                _ = flush_interval.tick() => {
                    self.flush_cycle().await;
                }
            }
        }

        if !self.advance_state(SinkState::Draining) {
            debug!("Signal sink already stopped, skipping drain");
            return;
        }
        self.drain().await;
        self.set_state(SinkState::Stopped);
        debug!("Signal sink stopped");
    }

    /// Flushes until the queue is empty, for at most as many cycles as there
    /// were events when the drain started.
    async fn drain(&self) {
        let max_cycles = self.queue.len().max(1);
        let mut sent = 0;
        for _ in 0..max_cycles {
            let count = self.flush_cycle().await;
            if count == 0 {
                break;
            }
            sent += count;
        }
        debug!("Signal sink drained {sent} events on shutdown");
    }

    async fn flush_cycle(&self) -> usize {
        let batch = self.queue.try_dequeue_batch(
            self.config.log_events_in_batch_limit,
            self.config.batch_size_limit_bytes,
        );
        if batch.is_empty() {
            return 0;
        }

        let count = batch.len();
        let message = SignalLogMessage {
            message: self.batch_formatter.format(&batch),
            number: self.settings.sender_number.clone(),
            recipients: self.settings.recipients.clone(),
        };
        drop(batch);

        match self
            .http_client
            .post(&self.settings.request_uri, &message)
            .await
        {
            Ok(()) => debug!("Flushed {count} log events"),
            Err(e) => error!("Failed to flush {count} log events, dropping them: {e}"),
        }
        count
    }
}
