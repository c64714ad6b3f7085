//! Spillover of failed events to the fallback queue.
//!
//! The queue is the last resort: it exists to bound collector memory when
//! the primary stream rejects records, so entries the queue itself rejects
//! are logged and dropped rather than retried.

use crate::buffer::Event;
use crate::client::{QueueBatchEntry, QueueClient, QUEUE_BATCH_MAX};
use crate::error::ClientError;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use uuid::Uuid;

/// Message attribute carrying the event's original partition key.
pub const PARTITION_KEY_ATTRIBUTE: &str = "kinesisKey";

/// Redirects events to the fallback queue in batches.
#[derive(Debug)]
pub struct FallbackSubmitter {
    client: Arc<dyn QueueClient>,
    queue_name: String,
    queue_url: OnceLock<String>,
}

impl FallbackSubmitter {
    pub fn new(client: Arc<dyn QueueClient>, queue_name: impl Into<String>) -> Self {
        Self { client, queue_name: queue_name.into(), queue_url: OnceLock::new() }
    }

    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    /// Resolve and cache the queue URL. A queue provisioned after startup is
    /// picked up on the first send that needs it.
    pub async fn resolve_queue_url(&self) -> Result<&str, ClientError> {
        if let Some(url) = self.queue_url.get() {
            return Ok(url);
        }
        let url = self.client.get_queue_url(&self.queue_name).await?;
        Ok(self.queue_url.get_or_init(|| url))
    }

    /// Send `events` to the queue, base64-encoded, in groups of at most
    /// [`QUEUE_BATCH_MAX`]. Entries the queue reports as failed are dropped
    /// with an error log; nothing is re-queued from here.
    pub async fn put(&self, events: Vec<Event>) {
        let url = match self.resolve_queue_url().await {
            Ok(url) => url.to_string(),
            Err(e) => {
                tracing::error!(
                    queue = %self.queue_name,
                    count = events.len(),
                    error = %e,
                    "fallback queue is unreachable, dropping events"
                );
                return;
            }
        };

        for group in events.chunks(QUEUE_BATCH_MAX) {
            let entries: Vec<QueueBatchEntry> = group.iter().map(batch_entry).collect();
            let sent = entries.len();
            match self.client.send_message_batch(&url, entries).await {
                Ok(outcome) if outcome.failed.is_empty() => {
                    tracing::debug!(count = sent, queue = %self.queue_name, "spilled events to fallback queue");
                }
                Ok(outcome) => {
                    let first = &outcome.failed[0];
                    tracing::error!(
                        failed = outcome.failed.len(),
                        sent,
                        queue = %self.queue_name,
                        code = %first.code,
                        message = %first.message,
                        "fallback queue rejected entries, dropping them"
                    );
                }
                Err(e) => {
                    tracing::error!(
                        count = sent,
                        queue = %self.queue_name,
                        error = %e,
                        "fallback batch send failed, dropping events"
                    );
                }
            }
        }
    }
}

fn batch_entry(event: &Event) -> QueueBatchEntry {
    let mut attributes = HashMap::new();
    attributes.insert(PARTITION_KEY_ATTRIBUTE.to_string(), event.key.clone());
    QueueBatchEntry {
        id: Uuid::new_v4().to_string(),
        body: BASE64.encode(&event.payload),
        attributes,
    }
}
