#![allow(dead_code)]

//! Scripted mock clients and helpers shared by the integration tests.

use async_trait::async_trait;
use spillway::{
    ClientError, Event, QueueBatchEntry, QueueBatchOutcome, QueueClient, QueueEntryFailure,
    RecordResult, SinkConfig, StreamClient, StreamStatus,
};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

/// Outcome the mock stream returns for one `put_records` call. Calls beyond
/// the script succeed.
#[derive(Debug, Clone)]
pub enum PutScript {
    /// Every record accepted.
    Ok,
    /// Records at these indices fail; the rest are accepted.
    PerRecord(Vec<usize>),
    /// The whole call fails.
    Fail(ClientError),
}

#[derive(Debug)]
pub struct MockStreamClient {
    status: Result<StreamStatus, ClientError>,
    script: Mutex<VecDeque<PutScript>>,
    calls: Mutex<Vec<(Instant, Vec<Event>)>>,
}

impl MockStreamClient {
    pub fn active() -> Arc<Self> {
        Self::with_script(Vec::new())
    }

    pub fn with_script(script: Vec<PutScript>) -> Arc<Self> {
        Arc::new(Self {
            status: Ok(StreamStatus::Active),
            script: Mutex::new(script.into()),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn missing() -> Arc<Self> {
        Arc::new(Self {
            status: Err(ClientError::NotFound("stream".into())),
            script: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Record batches per call, in call order.
    pub fn put_calls(&self) -> Vec<Vec<Event>> {
        self.calls.lock().unwrap().iter().map(|(_, events)| events.clone()).collect()
    }

    /// Timestamps of each call, on the tokio clock.
    pub fn call_times(&self) -> Vec<Instant> {
        self.calls.lock().unwrap().iter().map(|(at, _)| *at).collect()
    }
}

#[async_trait]
impl StreamClient for MockStreamClient {
    async fn describe_stream(&self, _name: &str) -> Result<StreamStatus, ClientError> {
        self.status.clone()
    }

    async fn put_records(
        &self,
        _name: &str,
        records: &[Event],
    ) -> Result<Vec<RecordResult>, ClientError> {
        self.calls.lock().unwrap().push((Instant::now(), records.to_vec()));
        let next = self.script.lock().unwrap().pop_front();
        match next {
            None | Some(PutScript::Ok) => Ok(vec![RecordResult::ok(); records.len()]),
            Some(PutScript::PerRecord(failing)) => Ok((0..records.len())
                .map(|i| {
                    if failing.contains(&i) {
                        RecordResult::err("ProvisionedThroughputExceededException", "rate exceeded")
                    } else {
                        RecordResult::ok()
                    }
                })
                .collect()),
            Some(PutScript::Fail(e)) => Err(e),
        }
    }
}

#[derive(Debug)]
pub struct MockQueueClient {
    url: Result<String, ClientError>,
    reject_all: bool,
    batches: Mutex<Vec<Vec<QueueBatchEntry>>>,
}

impl MockQueueClient {
    pub fn available() -> Arc<Self> {
        Arc::new(Self {
            url: Ok("https://queue.test/tracker-buffer".into()),
            reject_all: false,
            batches: Mutex::new(Vec::new()),
        })
    }

    pub fn rejecting() -> Arc<Self> {
        Arc::new(Self {
            url: Ok("https://queue.test/tracker-buffer".into()),
            reject_all: true,
            batches: Mutex::new(Vec::new()),
        })
    }

    pub fn missing() -> Arc<Self> {
        Arc::new(Self {
            url: Err(ClientError::NotFound("queue".into())),
            reject_all: false,
            batches: Mutex::new(Vec::new()),
        })
    }

    pub fn batch_count(&self) -> usize {
        self.batches.lock().unwrap().len()
    }

    pub fn batches(&self) -> Vec<Vec<QueueBatchEntry>> {
        self.batches.lock().unwrap().clone()
    }
}

#[async_trait]
impl QueueClient for MockQueueClient {
    async fn get_queue_url(&self, _name: &str) -> Result<String, ClientError> {
        self.url.clone()
    }

    async fn send_message_batch(
        &self,
        _queue_url: &str,
        entries: Vec<QueueBatchEntry>,
    ) -> Result<QueueBatchOutcome, ClientError> {
        self.batches.lock().unwrap().push(entries.clone());
        if self.reject_all {
            Ok(QueueBatchOutcome {
                successful: Vec::new(),
                failed: entries
                    .into_iter()
                    .map(|entry| QueueEntryFailure {
                        id: entry.id,
                        code: "InternalError".into(),
                        message: "queue unavailable".into(),
                    })
                    .collect(),
            })
        } else {
            Ok(QueueBatchOutcome {
                successful: entries.into_iter().map(|entry| entry.id).collect(),
                failed: Vec::new(),
            })
        }
    }
}

/// Quiet limits: only the trigger under test should ever fire.
pub fn base_config() -> SinkConfig {
    serde_json::from_str(
        r#"{
            "streamName": "tracker-good",
            "byteLimit": 1000000000,
            "recordLimit": 1000000000,
            "timeLimit": 3600000,
            "minBackoff": 50,
            "maxBackoff": 1000,
            "threadPoolSize": 4
        }"#,
    )
    .expect("config parses")
}

/// Route log output through the test harness capture.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Poll until `cond` holds, yielding through the paused-time runtime.
pub async fn wait_for(cond: impl Fn() -> bool) {
    for _ in 0..500 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    panic!("condition not reached in time");
}
