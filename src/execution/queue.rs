//! Single-worker processing queue.
//!
//! Scheduler ticks and HTTP calls only submit a [`Trigger`]; one worker task executes them
//! in arrival order, so no two runs ever overlap.

use crate::execution::RunOutcome;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub const DEFAULT_QUEUE_CAPACITY: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    InitialSync,
    DeltaSync,
    Cleanup,
    Flush,
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Trigger::InitialSync => "initial-sync",
            Trigger::DeltaSync => "delta-sync",
            Trigger::Cleanup => "delta-cleanup",
            Trigger::Flush => "flush",
        };
        f.write_str(name)
    }
}

/// What the worker executes for each trigger.
#[async_trait]
pub trait Runs: Send + Sync {
    async fn run(&self, trigger: Trigger) -> RunOutcome;
}

type Request = (Trigger, Option<oneshot::Sender<RunOutcome>>);

pub struct ProcessingQueue {
    sender: mpsc::Sender<Request>,
    worker: JoinHandle<()>,
}

impl ProcessingQueue {
    /// Spawn the worker on the current runtime.
    pub fn start(runs: Arc<dyn Runs>, capacity: usize) -> Self {
        let (sender, mut receiver) = mpsc::channel::<Request>(capacity.max(1));
        let worker = tokio::spawn(async move {
            while let Some((trigger, reply)) = receiver.recv().await {
                debug!(%trigger, "starting run");
                let outcome = runs.run(trigger).await;
                match &outcome {
                    RunOutcome::Failed { job, error } => {
                        warn!(%trigger, job = ?job, error = %error, "run failed");
                    }
                    other => info!(%trigger, outcome = ?other, "run finished"),
                }
                if let Some(reply) = reply {
                    let _ = reply.send(outcome);
                }
            }
            debug!("processing queue closed");
        });
        Self { sender, worker }
    }

    /// Queue `trigger` without waiting for it. Returns `false` when the queue is full or
    /// closed and the trigger was dropped.
    pub fn submit(&self, trigger: Trigger) -> bool {
        match self.sender.try_send((trigger, None)) {
            Ok(()) => true,
            Err(e) => {
                warn!(%trigger, error = %e, "dropping trigger");
                false
            }
        }
    }

    /// Queue `trigger` and wait for its outcome. `None` when the worker is gone.
    pub async fn run(&self, trigger: Trigger) -> Option<RunOutcome> {
        let (reply, outcome) = oneshot::channel();
        self.sender.send((trigger, Some(reply))).await.ok()?;
        outcome.await.ok()
    }

    /// Stop accepting triggers and wait for the queued ones to finish.
    pub async fn shutdown(self) {
        drop(self.sender);
        let _ = self.worker.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct Counting {
        active: AtomicUsize,
        max_active: AtomicUsize,
        order: Mutex<Vec<Trigger>>,
    }

    #[async_trait]
    impl Runs for Counting {
        async fn run(&self, trigger: Trigger) -> RunOutcome {
            let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(active, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.order.lock().unwrap().push(trigger);
            self.active.fetch_sub(1, Ordering::SeqCst);
            RunOutcome::NothingToDo
        }
    }

    #[tokio::test]
    async fn test_runs_never_overlap() {
        let runs = Arc::new(Counting::default());
        let queue = ProcessingQueue::start(runs.clone(), 8);

        for trigger in [Trigger::DeltaSync, Trigger::Cleanup, Trigger::DeltaSync, Trigger::InitialSync] {
            assert!(queue.submit(trigger));
        }
        assert_eq!(queue.run(Trigger::Flush).await, Some(RunOutcome::NothingToDo));

        assert_eq!(runs.max_active.load(Ordering::SeqCst), 1, "at most one run at a time");
        assert_eq!(
            *runs.order.lock().unwrap(),
            vec![
                Trigger::DeltaSync,
                Trigger::Cleanup,
                Trigger::DeltaSync,
                Trigger::InitialSync,
                Trigger::Flush
            ]
        );
        queue.shutdown().await;
    }

    #[tokio::test]
    async fn test_full_queue_drops_triggers() {
        let runs = Arc::new(Counting::default());
        let queue = ProcessingQueue::start(runs, 1);
        let accepted = (0..20).filter(|_| queue.submit(Trigger::DeltaSync)).count();
        assert!(accepted < 20);
        queue.shutdown().await;
    }
}
