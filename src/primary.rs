//! Batch submission to the primary stream and failure routing.

use crate::backoff::Backoff;
use crate::buffer::Event;
use crate::client::{RecordResult, StreamClient, STREAM_BATCH_MAX};
use crate::fallback::FallbackSubmitter;
use crate::scheduler::Scheduler;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Writes flushed snapshots to the primary stream and routes whatever the
/// stream rejects: to the fallback queue when one is configured, otherwise
/// back through the scheduler with a growing backoff.
#[derive(Debug)]
pub struct PrimarySubmitter {
    client: Arc<dyn StreamClient>,
    stream_name: String,
    scheduler: Arc<Scheduler>,
    backoff: Backoff,
    fallback: Option<Arc<FallbackSubmitter>>,
    healthy: Arc<AtomicBool>,
}

impl PrimarySubmitter {
    pub fn new(
        client: Arc<dyn StreamClient>,
        stream_name: impl Into<String>,
        scheduler: Arc<Scheduler>,
        backoff: Backoff,
        fallback: Option<Arc<FallbackSubmitter>>,
        healthy: Arc<AtomicBool>,
    ) -> Self {
        Self {
            client,
            stream_name: stream_name.into(),
            scheduler,
            backoff,
            fallback,
            healthy,
        }
    }

    /// Submit a snapshot, splitting it into bulk-put calls of at most
    /// [`STREAM_BATCH_MAX`] records. `last_backoff` is the wait that
    /// preceded this attempt; the first submission of a batch passes the
    /// configured minimum.
    ///
    /// A whole-call failure marks every record of that call as failed; a
    /// partial response marks the records the stream reported on. Failures
    /// from all calls are aggregated and routed once.
    pub async fn send_batch(self: Arc<Self>, events: Vec<Event>, last_backoff: Duration) {
        if events.is_empty() {
            return;
        }

        let mut failures = Vec::new();
        for chunk in events.chunks(STREAM_BATCH_MAX) {
            match self.client.put_records(&self.stream_name, chunk).await {
                Ok(results) => {
                    let failed = failed_subset(chunk, &results);
                    if failed.is_empty() {
                        self.healthy.store(true, Ordering::Relaxed);
                        tracing::debug!(
                            count = chunk.len(),
                            stream = %self.stream_name,
                            "wrote records to the primary stream"
                        );
                    } else {
                        log_record_errors(&results, failed.len(), chunk.len());
                        failures.extend(failed);
                    }
                }
                Err(e) => {
                    self.healthy.store(false, Ordering::Relaxed);
                    tracing::error!(
                        count = chunk.len(),
                        stream = %self.stream_name,
                        error = %e,
                        "bulk put to the primary stream failed"
                    );
                    failures.extend_from_slice(chunk);
                }
            }
        }

        if !failures.is_empty() {
            self.handle_failures(failures, last_backoff).await;
        }
    }

    /// Route rejected events. With a fallback configured they spill to the
    /// queue and no retry is scheduled. Without one, the retry fires after
    /// `last_backoff` and carries the grown wait forward, so the first retry
    /// of a batch lands after the configured minimum.
    fn handle_failures(
        self: Arc<Self>,
        failures: Vec<Event>,
        last_backoff: Duration,
    ) -> futures::future::BoxFuture<'static, ()> {
        Box::pin(async move {
            let next_backoff = self.backoff.next(last_backoff);
            match &self.fallback {
                Some(fallback) => {
                    tracing::warn!(
                        count = failures.len(),
                        queue = %fallback.queue_name(),
                        "redirecting rejected records to the fallback queue"
                    );
                    fallback.put(failures).await;
                }
                None => {
                    tracing::warn!(
                        count = failures.len(),
                        retry_in = ?last_backoff,
                        "rescheduling rejected records"
                    );
                    let submitter = Arc::clone(&self);
                    self.scheduler.schedule_after(
                        last_backoff,
                        Box::pin(async move {
                            submitter.send_batch(failures, next_backoff).await;
                        }),
                    );
                }
            }
        })
    }
}

fn failed_subset(chunk: &[Event], results: &[RecordResult]) -> Vec<Event> {
    chunk
        .iter()
        .zip(results)
        .filter(|(_, result)| result.is_failed())
        .map(|(event, _)| event.clone())
        .collect()
}

fn log_record_errors(results: &[RecordResult], failed: usize, total: usize) {
    if let Some(first) = results.iter().find(|r| r.is_failed()) {
        tracing::error!(
            failed,
            total,
            code = first.error_code.as_deref().unwrap_or("unknown"),
            message = first.error_message.as_deref().unwrap_or(""),
            "primary stream rejected records"
        );
    }
}
