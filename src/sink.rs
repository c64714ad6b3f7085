//! Public sink facade: wiring, the periodic flush, and the shutdown drain.

use crate::backoff::Backoff;
use crate::buffer::{BufferLimits, Event, EventBuffer};
use crate::client::{ClientRetryPolicy, QueueClient, RetryingStreamClient, StreamClient};
use crate::clock::{Clock, MonotonicClock};
use crate::config::SinkConfig;
use crate::error::ConfigError;
use crate::fallback::FallbackSubmitter;
use crate::primary::PrimarySubmitter;
use crate::scheduler::{Scheduler, Sleeper, TokioSleeper};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// How long shutdown waits for in-flight submissions before giving up.
pub const SHUTDOWN_BUDGET: Duration = Duration::from_secs(10);

/// The surface the HTTP layer drives.
#[async_trait]
pub trait Sink: Send + Sync {
    /// Largest payload the sink accepts; callers may short-circuit oversize
    /// bodies before they reach `store_raw_events`.
    fn max_bytes(&self) -> usize;

    /// Accept raw payloads for delivery under `key`. Fire-and-forget toward
    /// the caller: the returned list is always empty and exists for parity
    /// with sinks that reject synchronously.
    fn store_raw_events(&self, payloads: Vec<Vec<u8>>, key: &str) -> Vec<Vec<u8>>;

    /// Whether the downstream looked reachable at the last check.
    fn is_healthy(&self) -> bool;

    /// Drain pending events and stop, bounded by [`SHUTDOWN_BUDGET`].
    async fn shutdown(&self);
}

struct Shared {
    buffer: EventBuffer,
    primary: Arc<PrimarySubmitter>,
    scheduler: Arc<Scheduler>,
    clock: Arc<dyn Clock>,
    time_limit: Duration,
    min_backoff: Duration,
    max_bytes: usize,
    healthy: Arc<AtomicBool>,
    shutting_down: AtomicBool,
}

impl Shared {
    fn submit(&self, snapshot: Vec<Event>) {
        if snapshot.is_empty() {
            return;
        }
        let submitter = Arc::clone(&self.primary);
        let first_backoff = self.min_backoff;
        self.scheduler.spawn(Box::pin(async move {
            submitter.send_batch(snapshot, first_backoff).await;
        }));
    }
}

/// Re-arm the flush timer. Each firing compares the buffer's drain
/// timestamp against the time limit: a quiet buffer is flushed and the
/// timer restarts at the full interval, while a recent flush pushes the
/// next tick out by what is left of the interval. Bursty size-triggered
/// flushes therefore delay the timer instead of stacking onto it.
fn schedule_flush_tick(shared: &Arc<Shared>, delay: Duration) {
    let s = Arc::clone(shared);
    shared.scheduler.schedule_after(
        delay,
        Box::pin(async move {
            if s.shutting_down.load(Ordering::SeqCst) {
                return;
            }
            let elapsed =
                Duration::from_millis(s.clock.now_millis().saturating_sub(s.buffer.last_flush_at()));
            let next = if elapsed >= s.time_limit {
                let snapshot = s.buffer.flush();
                if !snapshot.is_empty() {
                    tracing::debug!(count = snapshot.len(), "time limit reached, flushing buffer");
                }
                s.submit(snapshot);
                s.time_limit
            } else {
                s.time_limit - elapsed
            };
            schedule_flush_tick(&s, next);
        }),
    );
}

/// Buffered, batched sink targeting a primary stream, with optional
/// spillover to an auxiliary queue. Built through [`StreamSink::builder`].
pub struct StreamSink {
    shared: Arc<Shared>,
}

impl StreamSink {
    pub fn builder(config: SinkConfig) -> StreamSinkBuilder {
        StreamSinkBuilder {
            config,
            stream_client: None,
            queue_client: None,
            sleeper: Arc::new(TokioSleeper),
            clock: Arc::new(MonotonicClock::default()),
            client_retry: Some(ClientRetryPolicy::default()),
        }
    }

    pub fn max_bytes(&self) -> usize {
        self.shared.max_bytes
    }

    pub fn is_healthy(&self) -> bool {
        self.shared.healthy.load(Ordering::Relaxed)
    }

    /// Forward each payload to the buffer; a snapshot drained by a size or
    /// count trigger is handed to the submitter on the worker pool. Late
    /// calls during shutdown are accepted best-effort and are lost if the
    /// final drain has already run.
    pub fn store_raw_events(&self, payloads: Vec<Vec<u8>>, key: &str) -> Vec<Vec<u8>> {
        for payload in payloads {
            if let Some(snapshot) = self.shared.buffer.store(payload, key) {
                self.shared.submit(snapshot);
            }
        }
        Vec::new()
    }

    /// Drain once, then stop the scheduler: no new tasks, unfired waits
    /// discarded, and up to [`SHUTDOWN_BUDGET`] granted to submissions
    /// already in flight. Idempotent.
    pub async fn shutdown(&self) {
        if self.shared.shutting_down.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::info!("sink shutting down, draining pending events");
        let snapshot = self.shared.buffer.flush();
        self.shared.submit(snapshot);
        if self.shared.scheduler.shutdown(SHUTDOWN_BUDGET).await {
            tracing::info!("sink drained cleanly");
        } else {
            tracing::warn!("shutdown budget elapsed with submissions still in flight");
        }
    }
}

impl std::fmt::Debug for StreamSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamSink")
            .field("max_bytes", &self.shared.max_bytes)
            .field("healthy", &self.is_healthy())
            .finish()
    }
}

#[async_trait]
impl Sink for StreamSink {
    fn max_bytes(&self) -> usize {
        StreamSink::max_bytes(self)
    }

    fn store_raw_events(&self, payloads: Vec<Vec<u8>>, key: &str) -> Vec<Vec<u8>> {
        StreamSink::store_raw_events(self, payloads, key)
    }

    fn is_healthy(&self) -> bool {
        StreamSink::is_healthy(self)
    }

    async fn shutdown(&self) {
        StreamSink::shutdown(self).await
    }
}

/// Assembles a [`StreamSink`]: validates the configuration, wraps the
/// stream client with its internal retry policy, runs the startup checks,
/// and starts the flush timer.
pub struct StreamSinkBuilder {
    config: SinkConfig,
    stream_client: Option<Arc<dyn StreamClient>>,
    queue_client: Option<Arc<dyn QueueClient>>,
    sleeper: Arc<dyn Sleeper>,
    clock: Arc<dyn Clock>,
    client_retry: Option<ClientRetryPolicy>,
}

impl StreamSinkBuilder {
    pub fn stream_client(mut self, client: Arc<dyn StreamClient>) -> Self {
        self.stream_client = Some(client);
        self
    }

    pub fn queue_client(mut self, client: Arc<dyn QueueClient>) -> Self {
        self.queue_client = Some(client);
        self
    }

    pub fn sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the internal retry policy applied to the stream client.
    pub fn client_retry(mut self, policy: ClientRetryPolicy) -> Self {
        self.client_retry = Some(policy);
        self
    }

    /// Use the stream client as given, without the internal retry wrapper.
    pub fn no_client_retry(mut self) -> Self {
        self.client_retry = None;
        self
    }

    pub async fn init(self) -> Result<StreamSink, ConfigError> {
        let config = self.config;
        config.validate()?;
        let credentials = config.credentials()?;
        tracing::debug!(mode = ?credentials, "resolved credential mode");

        let raw_client = self.stream_client.ok_or(ConfigError::MissingStreamClient)?;
        let client: Arc<dyn StreamClient> = match self.client_retry {
            Some(policy) => Arc::new(
                RetryingStreamClient::with_policy(raw_client, policy).sleeper(self.sleeper.clone()),
            ),
            None => raw_client,
        };

        let fallback = match (&config.fallback_queue_name, self.queue_client) {
            (Some(name), Some(queue_client)) => {
                Some(Arc::new(FallbackSubmitter::new(queue_client, name.clone())))
            }
            (Some(_), None) => return Err(ConfigError::MissingQueueClient),
            (None, _) => None,
        };

        let healthy = Arc::new(AtomicBool::new(false));
        startup_checks(&client, &config.stream_name, fallback.as_deref(), &healthy).await;

        let scheduler = Arc::new(Scheduler::with_sleeper(config.thread_pool_size, self.sleeper));
        let backoff = Backoff::new(config.min_backoff_duration(), config.max_backoff_duration());
        let primary = Arc::new(PrimarySubmitter::new(
            client,
            config.stream_name.clone(),
            Arc::clone(&scheduler),
            backoff,
            fallback,
            Arc::clone(&healthy),
        ));

        let limits = BufferLimits {
            byte_limit: config.byte_limit,
            record_limit: config.record_limit,
            max_bytes: config.max_bytes(),
        };
        let shared = Arc::new(Shared {
            buffer: EventBuffer::new(limits, self.clock.clone()),
            primary,
            scheduler,
            clock: self.clock,
            time_limit: config.flush_interval(),
            min_backoff: config.min_backoff_duration(),
            max_bytes: config.max_bytes(),
            healthy,
            shutting_down: AtomicBool::new(false),
        });

        schedule_flush_tick(&shared, shared.time_limit);
        tracing::info!(
            stream = %config.stream_name,
            fallback = config.fallback_queue_name.as_deref().unwrap_or("none"),
            max_bytes = shared.max_bytes,
            "sink initialized"
        );
        Ok(StreamSink { shared })
    }
}

/// Verify the downstream at startup. Missing resources are logged, never
/// fatal: the stream or queue may be provisioned after the collector comes
/// up, and refusing to start would lose the events arriving meanwhile.
async fn startup_checks(
    client: &Arc<dyn StreamClient>,
    stream_name: &str,
    fallback: Option<&FallbackSubmitter>,
    healthy: &Arc<AtomicBool>,
) {
    let stream_ok = match client.describe_stream(stream_name).await {
        Ok(status) if status.is_writable() => true,
        Ok(status) => {
            tracing::error!(stream = %stream_name, ?status, "primary stream exists but is not writable");
            false
        }
        Err(e) if e.is_not_found() => {
            tracing::error!(stream = %stream_name, "primary stream does not exist");
            false
        }
        Err(e) => {
            tracing::error!(stream = %stream_name, error = %e, "could not check the primary stream");
            false
        }
    };

    let queue_ok = match fallback {
        Some(submitter) => match submitter.resolve_queue_url().await {
            Ok(_) => true,
            Err(e) => {
                tracing::error!(queue = %submitter.queue_name(), error = %e, "fallback queue is not reachable");
                false
            }
        },
        None => {
            if !stream_ok {
                tracing::warn!(
                    stream = %stream_name,
                    "primary stream is unavailable and no fallback queue is configured, events will be dropped"
                );
            }
            true
        }
    };

    healthy.store(stream_ok && queue_ok, Ordering::Relaxed);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> SinkConfig {
        serde_json::from_str(
            r#"{
                "streamName": "tracker-good",
                "fallbackQueueName": "tracker-buffer",
                "byteLimit": 250000,
                "recordLimit": 500,
                "timeLimit": 5000,
                "minBackoff": 50,
                "maxBackoff": 10000
            }"#,
        )
        .expect("config parses")
    }

    #[tokio::test]
    async fn init_requires_a_stream_client() {
        let err = StreamSink::builder(config()).init().await.expect_err("no client");
        assert_eq!(err, ConfigError::MissingStreamClient);
    }

    #[tokio::test]
    async fn init_requires_a_queue_client_when_fallback_is_configured() {
        #[derive(Debug)]
        struct Stub;

        #[async_trait]
        impl StreamClient for Stub {
            async fn describe_stream(
                &self,
                _name: &str,
            ) -> Result<crate::client::StreamStatus, crate::error::ClientError> {
                Ok(crate::client::StreamStatus::Active)
            }

            async fn put_records(
                &self,
                _name: &str,
                records: &[Event],
            ) -> Result<Vec<crate::client::RecordResult>, crate::error::ClientError> {
                Ok(vec![crate::client::RecordResult::ok(); records.len()])
            }
        }

        let err = StreamSink::builder(config())
            .stream_client(Arc::new(Stub))
            .init()
            .await
            .expect_err("fallback configured without a queue client");
        assert_eq!(err, ConfigError::MissingQueueClient);
    }
}
