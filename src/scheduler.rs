//! Delayed one-shot task scheduling on a bounded worker pool.
//!
//! The scheduler backs every asynchronous part of the sink: batch
//! submissions, retry waits, and the periodic flush timer. Parallelism is
//! capped with a semaphore sized from the pool configuration. Shutdown stops
//! intake, discards waits that have not fired yet, and drains running tasks
//! within a caller-supplied budget.

use async_trait::async_trait;
use futures::future::BoxFuture;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{watch, Notify, Semaphore};

/// Abstraction for waiting, so retry and timer delays can be observed or
/// skipped in tests.
#[async_trait]
pub trait Sleeper: Send + Sync + std::fmt::Debug {
    async fn sleep(&self, duration: Duration);
}

/// Production sleeper using the tokio timer.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await
    }
}

/// Test sleeper that returns immediately.
#[derive(Debug, Default, Clone, Copy)]
pub struct InstantSleeper;

#[async_trait]
impl Sleeper for InstantSleeper {
    async fn sleep(&self, _duration: Duration) {
        // no-op
    }
}

/// Test sleeper that records every requested delay without waiting.
#[derive(Debug, Clone, Default)]
pub struct TrackingSleeper {
    delays: Arc<Mutex<Vec<Duration>>>,
}

impl TrackingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every delay requested so far, in call order.
    pub fn delays(&self) -> Vec<Duration> {
        self.delays.lock().expect("TrackingSleeper.delays: mutex poisoned").clone()
    }
}

#[async_trait]
impl Sleeper for TrackingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.delays.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).push(duration);
    }
}

#[derive(Debug, Default)]
struct ActiveTasks {
    count: AtomicUsize,
    idle: Notify,
}

impl ActiveTasks {
    fn enter(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }

    fn exit(&self) {
        if self.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }

    /// Wait until no tasks remain, up to `budget`. Returns whether the pool
    /// went idle in time.
    async fn drained(&self, budget: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + budget;
        loop {
            let idle = self.idle.notified();
            if self.count.load(Ordering::SeqCst) == 0 {
                return true;
            }
            let now = tokio::time::Instant::now();
            if now >= deadline {
                return false;
            }
            // Either the pool drains or the remaining budget elapses; the
            // loop re-checks the count in both cases.
            let _ = tokio::time::timeout(deadline - now, idle).await;
        }
    }
}

/// Runs tasks on the tokio runtime with bounded parallelism, optionally
/// after a delay. Must be used from within a runtime.
#[derive(Debug)]
pub struct Scheduler {
    permits: Arc<Semaphore>,
    accepting: Arc<AtomicBool>,
    active: Arc<ActiveTasks>,
    cancel: watch::Sender<bool>,
    sleeper: Arc<dyn Sleeper>,
}

impl Scheduler {
    pub fn new(pool_size: usize) -> Self {
        Self::with_sleeper(pool_size, Arc::new(TokioSleeper))
    }

    pub fn with_sleeper(pool_size: usize, sleeper: Arc<dyn Sleeper>) -> Self {
        let (cancel, _) = watch::channel(false);
        Self {
            permits: Arc::new(Semaphore::new(pool_size.max(1))),
            accepting: Arc::new(AtomicBool::new(true)),
            active: Arc::new(ActiveTasks::default()),
            cancel,
            sleeper,
        }
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::SeqCst)
    }

    /// Run `task` as soon as a worker is free. Tasks submitted after
    /// shutdown began are dropped.
    pub fn spawn(&self, task: BoxFuture<'static, ()>) {
        if !self.is_accepting() {
            tracing::debug!("scheduler is draining, task dropped");
            return;
        }
        self.active.enter();
        let permits = Arc::clone(&self.permits);
        let active = Arc::clone(&self.active);
        tokio::spawn(async move {
            if let Ok(_permit) = permits.acquire_owned().await {
                task.await;
            }
            active.exit();
        });
    }

    /// Run `task` after `delay`. The wait is abandoned if shutdown begins
    /// before it fires; a task that has started running is not interrupted.
    pub fn schedule_after(&self, delay: Duration, task: BoxFuture<'static, ()>) {
        if !self.is_accepting() {
            tracing::debug!(?delay, "scheduler is draining, delayed task dropped");
            return;
        }
        self.active.enter();
        let permits = Arc::clone(&self.permits);
        let active = Arc::clone(&self.active);
        let accepting = Arc::clone(&self.accepting);
        let sleeper = Arc::clone(&self.sleeper);
        let mut cancelled = self.cancel.subscribe();
        tokio::spawn(async move {
            tokio::select! {
                _ = sleeper.sleep(delay) => {
                    if accepting.load(Ordering::SeqCst) {
                        if let Ok(_permit) = permits.acquire_owned().await {
                            task.await;
                        }
                    } else {
                        tracing::trace!(?delay, "delayed task discarded at shutdown");
                    }
                }
                _ = cancelled.changed() => {
                    tracing::trace!(?delay, "delayed task discarded at shutdown");
                }
            }
            active.exit();
        });
    }

    /// Stop accepting tasks, discard unfired waits, and wait up to `budget`
    /// for running tasks. Returns whether the pool drained in time.
    pub async fn shutdown(&self, budget: Duration) -> bool {
        self.accepting.store(false, Ordering::SeqCst);
        let _ = self.cancel.send(true);
        let drained = self.active.drained(budget).await;
        if !drained {
            tracing::warn!(?budget, "scheduler shutdown budget elapsed with tasks still in flight");
        }
        drained
    }
}
