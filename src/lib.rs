#![forbid(unsafe_code)]

//! # Spillway
//!
//! Buffered, batched, retrying delivery of collector events to a primary
//! stream, with optional spillover to an auxiliary queue.
//!
//! ## Features
//!
//! - **Event buffer** with byte, record, and time flush triggers
//! - **Parallel batch submission** on a bounded worker pool
//! - **Full-jitter backoff** between configurable bounds for rescheduled
//!   batches
//! - **Fallback spillover**: records the stream rejects are redirected to a
//!   queue instead of growing collector memory without bound
//! - **Bounded shutdown drain** with a final flush
//!
//! Delivery is at-least-once: a retried batch may duplicate records
//! downstream, and consumers are expected to be idempotent. Arrival order
//! is preserved within a flushed batch but not across batches.
//!
//! ## Quick Start
//!
//! ```no_run
//! use async_trait::async_trait;
//! use spillway::prelude::*;
//! use spillway::{ClientError, Event, RecordResult, StreamStatus};
//! use std::sync::Arc;
//!
//! #[derive(Debug)]
//! struct NoopStream;
//!
//! #[async_trait]
//! impl StreamClient for NoopStream {
//!     async fn describe_stream(&self, _: &str) -> Result<StreamStatus, ClientError> {
//!         Ok(StreamStatus::Active)
//!     }
//!
//!     async fn put_records(
//!         &self,
//!         _: &str,
//!         records: &[Event],
//!     ) -> Result<Vec<RecordResult>, ClientError> {
//!         Ok(vec![RecordResult::ok(); records.len()])
//!     }
//! }
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), ConfigError> {
//!     let config: SinkConfig = serde_json::from_str(
//!         r#"{
//!             "streamName": "tracker-good",
//!             "byteLimit": 250000,
//!             "recordLimit": 500,
//!             "timeLimit": 5000,
//!             "minBackoff": 50,
//!             "maxBackoff": 10000
//!         }"#,
//!     )
//!     .expect("valid config");
//!
//!     let sink = StreamSink::builder(config)
//!         .stream_client(Arc::new(NoopStream))
//!         .init()
//!         .await?;
//!
//!     sink.store_raw_events(vec![b"event-body".to_vec()], "partition-1");
//!     sink.shutdown().await;
//!     Ok(())
//! }
//! ```

mod backoff;
mod buffer;
mod client;
mod clock;
mod config;
mod error;
mod fallback;
mod primary;
mod scheduler;
mod sink;

// Re-exports
pub use backoff::Backoff;
pub use buffer::{BufferLimits, Event, EventBuffer};
pub use client::{
    ClientRetryPolicy, QueueBatchEntry, QueueBatchOutcome, QueueClient, QueueEntryFailure,
    RecordResult, RetryingStreamClient, StreamClient, StreamStatus, QUEUE_BATCH_MAX,
    STREAM_BATCH_MAX,
};
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use config::{Credentials, SinkConfig, MAX_BYTES_FALLBACK, MAX_BYTES_PRIMARY};
pub use error::{ClientError, ConfigError};
pub use fallback::{FallbackSubmitter, PARTITION_KEY_ATTRIBUTE};
pub use primary::PrimarySubmitter;
pub use scheduler::{InstantSleeper, Scheduler, Sleeper, TokioSleeper, TrackingSleeper};
pub use sink::{Sink, StreamSink, StreamSinkBuilder, SHUTDOWN_BUDGET};

pub mod prelude;
