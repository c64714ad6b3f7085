//! Contracts for the primary-stream and fallback-queue clients.
//!
//! The sink never talks to a concrete vendor SDK; the embedder supplies
//! implementations of [`StreamClient`] and [`QueueClient`]. Production
//! stream clients are wrapped in [`RetryingStreamClient`] at init so that
//! transient transport failures are absorbed client-side while throughput
//! exhaustion surfaces immediately to the outer retry machinery.

use crate::backoff::Backoff;
use crate::buffer::Event;
use crate::error::ClientError;
use crate::scheduler::{Sleeper, TokioSleeper};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Bulk-put ceiling of the primary stream API, records per call.
pub const STREAM_BATCH_MAX: usize = 500;

/// Batch-send ceiling of the fallback queue API, entries per call.
pub const QUEUE_BATCH_MAX: usize = 10;

/// Lifecycle status of the primary stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamStatus {
    Creating,
    Active,
    Updating,
    Deleting,
}

impl StreamStatus {
    /// Whether the stream accepts writes in this state.
    pub fn is_writable(self) -> bool {
        matches!(self, Self::Active | Self::Updating)
    }
}

/// Per-record outcome of a bulk put, positionally aligned with the request.
/// A populated `error_message` marks the record as failed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordResult {
    pub error_code: Option<String>,
    pub error_message: Option<String>,
}

impl RecordResult {
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn err(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self { error_code: Some(code.into()), error_message: Some(message.into()) }
    }

    pub fn is_failed(&self) -> bool {
        self.error_message.is_some()
    }
}

/// Client for the primary stream.
#[async_trait]
pub trait StreamClient: Send + Sync + std::fmt::Debug {
    async fn describe_stream(&self, name: &str) -> Result<StreamStatus, ClientError>;

    /// Bulk-put `records` under their partition keys. The result vector is
    /// positionally aligned with `records`.
    async fn put_records(
        &self,
        name: &str,
        records: &[Event],
    ) -> Result<Vec<RecordResult>, ClientError>;
}

#[async_trait]
impl<C: StreamClient + ?Sized> StreamClient for Arc<C> {
    async fn describe_stream(&self, name: &str) -> Result<StreamStatus, ClientError> {
        (**self).describe_stream(name).await
    }

    async fn put_records(
        &self,
        name: &str,
        records: &[Event],
    ) -> Result<Vec<RecordResult>, ClientError> {
        (**self).put_records(name, records).await
    }
}

/// One entry of a fallback batch send. Ids are required by the queue API
/// and must be unique within a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueBatchEntry {
    pub id: String,
    pub body: String,
    pub attributes: HashMap<String, String>,
}

/// Outcome of a fallback batch send, split by entry id.
#[derive(Debug, Clone, Default)]
pub struct QueueBatchOutcome {
    pub successful: Vec<String>,
    pub failed: Vec<QueueEntryFailure>,
}

#[derive(Debug, Clone)]
pub struct QueueEntryFailure {
    pub id: String,
    pub code: String,
    pub message: String,
}

/// Client for the fallback queue.
#[async_trait]
pub trait QueueClient: Send + Sync + std::fmt::Debug {
    async fn get_queue_url(&self, name: &str) -> Result<String, ClientError>;

    async fn send_message_batch(
        &self,
        queue_url: &str,
        entries: Vec<QueueBatchEntry>,
    ) -> Result<QueueBatchOutcome, ClientError>;
}

/// Retry policy applied inside the primary client.
///
/// Transient transport failures are cheap to retry close to the wire, so
/// they get up to `max_attempts` tries with full-jitter waits between the
/// backoff bounds. Throughput exhaustion is excluded: it surfaces at once so
/// the sink can choose between rescheduling and spilling to the fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientRetryPolicy {
    pub max_attempts: usize,
    pub backoff: Backoff,
}

impl Default for ClientRetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            backoff: Backoff::new(Duration::from_secs(1), Duration::from_secs(5 * 60 * 60)),
        }
    }
}

/// Wraps a [`StreamClient`] with [`ClientRetryPolicy`].
#[derive(Debug)]
pub struct RetryingStreamClient<C> {
    inner: C,
    policy: ClientRetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl<C: StreamClient> RetryingStreamClient<C> {
    pub fn new(inner: C) -> Self {
        Self::with_policy(inner, ClientRetryPolicy::default())
    }

    pub fn with_policy(inner: C, policy: ClientRetryPolicy) -> Self {
        Self { inner, policy, sleeper: Arc::new(TokioSleeper) }
    }

    pub fn sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }
}

#[async_trait]
impl<C: StreamClient> StreamClient for RetryingStreamClient<C> {
    async fn describe_stream(&self, name: &str) -> Result<StreamStatus, ClientError> {
        self.inner.describe_stream(name).await
    }

    async fn put_records(
        &self,
        name: &str,
        records: &[Event],
    ) -> Result<Vec<RecordResult>, ClientError> {
        let mut last = self.policy.backoff.min();
        let mut attempt = 1;
        loop {
            match self.inner.put_records(name, records).await {
                Ok(results) => return Ok(results),
                Err(e) if e.is_throughput_exceeded() => return Err(e),
                Err(e) if attempt >= self.policy.max_attempts => return Err(e),
                Err(e) => {
                    let delay = self.policy.backoff.next(last);
                    tracing::warn!(
                        attempt,
                        error = %e,
                        "bulk put failed, retrying client-side in {delay:?}"
                    );
                    self.sleeper.sleep(delay).await;
                    last = delay;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::InstantSleeper;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Debug)]
    struct FlakyStream {
        calls: AtomicUsize,
        errors: Mutex<Vec<ClientError>>,
    }

    impl FlakyStream {
        fn failing(errors: Vec<ClientError>) -> Self {
            Self { calls: AtomicUsize::new(0), errors: Mutex::new(errors) }
        }
    }

    #[async_trait]
    impl StreamClient for FlakyStream {
        async fn describe_stream(&self, _name: &str) -> Result<StreamStatus, ClientError> {
            Ok(StreamStatus::Active)
        }

        async fn put_records(
            &self,
            _name: &str,
            records: &[Event],
        ) -> Result<Vec<RecordResult>, ClientError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let next = self.errors.lock().unwrap().pop();
            match next {
                Some(e) => Err(e),
                None => Ok(vec![RecordResult::ok(); records.len()]),
            }
        }
    }

    fn events(n: usize) -> Vec<Event> {
        (0..n).map(|i| Event::new(vec![i as u8], "k")).collect()
    }

    fn policy(max_attempts: usize) -> ClientRetryPolicy {
        ClientRetryPolicy {
            max_attempts,
            backoff: Backoff::new(Duration::from_millis(1), Duration::from_millis(2)),
        }
    }

    #[tokio::test]
    async fn transport_errors_are_retried() {
        let inner = FlakyStream::failing(vec![
            ClientError::Transport("reset".into()),
            ClientError::Transport("reset".into()),
        ]);
        let client = RetryingStreamClient::with_policy(inner, policy(10))
            .sleeper(Arc::new(InstantSleeper));

        let results = client.put_records("s", &events(2)).await.expect("retried to success");
        assert_eq!(results.len(), 2);
        assert_eq!(client.inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn throughput_exceeded_surfaces_immediately() {
        let inner = FlakyStream::failing(vec![ClientError::ThroughputExceeded("rate".into())]);
        let client = RetryingStreamClient::with_policy(inner, policy(10))
            .sleeper(Arc::new(InstantSleeper));

        let err = client.put_records("s", &events(1)).await.expect_err("escalates");
        assert!(err.is_throughput_exceeded());
        assert_eq!(client.inner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn attempts_are_capped() {
        let inner = FlakyStream::failing(vec![ClientError::Transport("reset".into()); 20]);
        let client = RetryingStreamClient::with_policy(inner, policy(10))
            .sleeper(Arc::new(InstantSleeper));

        let err = client.put_records("s", &events(1)).await.expect_err("gives up");
        assert!(matches!(err, ClientError::Transport(_)));
        assert_eq!(client.inner.calls.load(Ordering::SeqCst), 10);
    }
}
