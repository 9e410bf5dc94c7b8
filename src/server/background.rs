//! The queue that finalizes uploads after their client already got its reply.

use super::session::TraceId;
use crate::{metrics, storage::BackgroundTransfer};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

/// A transfer that was handed to the queue and did not finish yet.
#[derive(Debug, Clone)]
pub struct QueuedTransfer {
    /// The back-end's identifier for the transfer
    pub transfer_id: String,
    /// The session the upload came in on
    pub trace_id: TraceId,
    /// When the transfer was submitted
    pub queued_at: DateTime<Utc>,
}

struct Job {
    key: Uuid,
    transfer: Box<dyn BackgroundTransfer>,
    trace_id: TraceId,
}

/// Shared by all sessions of a server. Submitting never waits: one worker task drains the queue
/// and runs every transfer in a task of its own.
#[derive(Debug, Clone)]
pub(crate) struct BackgroundTransferQueue {
    tx: mpsc::UnboundedSender<Job>,
    in_flight: Arc<DashMap<Uuid, QueuedTransfer>>,
    logger: slog::Logger,
}

impl BackgroundTransferQueue {
    /// Starts the worker. Must be called from within a tokio runtime.
    pub fn spawn(logger: slog::Logger, collect_metrics: bool) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
        let in_flight: Arc<DashMap<Uuid, QueuedTransfer>> = Arc::new(DashMap::new());

        let worker_logger = logger.clone();
        let registry = in_flight.clone();
        tokio::spawn(async move {
            while let Some(Job { key, transfer, trace_id }) = rx.recv().await {
                let logger = worker_logger.new(slog::o!(
                    "trace-id" => trace_id.to_string(),
                    "transfer-id" => transfer.transfer_id().to_string()
                ));
                let registry = registry.clone();
                tokio::spawn(async move {
                    let result = transfer.finish().await;
                    let queued_at = registry.remove(&key).map(|(_, queued)| queued.queued_at);
                    if collect_metrics {
                        metrics::add_background_transfer_metric(result.is_ok());
                    }
                    match result {
                        Ok(()) => slog::info!(logger, "Background transfer finished"; "queued-at" => ?queued_at),
                        Err(err) => slog::warn!(logger, "Background transfer failed: {:?}", err; "queued-at" => ?queued_at),
                    }
                });
            }
            slog::debug!(worker_logger, "Background transfer queue closed");
        });

        BackgroundTransferQueue { tx, in_flight, logger }
    }

    /// Hands `transfer` over to the worker. The caller learns nothing about the outcome.
    pub fn submit(&self, transfer: Box<dyn BackgroundTransfer>, trace_id: TraceId) {
        let key = Uuid::new_v4();
        let transfer_id = transfer.transfer_id().to_string();
        self.in_flight.insert(
            key,
            QueuedTransfer {
                transfer_id: transfer_id.clone(),
                trace_id,
                queued_at: Utc::now(),
            },
        );
        if self.tx.send(Job { key, transfer, trace_id }).is_err() {
            self.in_flight.remove(&key);
            slog::error!(self.logger, "Background transfer queue is gone, dropping transfer {}", transfer_id; "trace-id" => trace_id.to_string());
        }
    }

    /// The transfers that were submitted but did not finish yet.
    pub fn in_flight(&self) -> Vec<QueuedTransfer> {
        self.in_flight.iter().map(|item| item.value().clone()).collect()
    }

    /// The number of unfinished transfers that came in on the given session.
    pub fn in_flight_for(&self, trace_id: TraceId) -> usize {
        self.in_flight.iter().filter(|item| item.value().trace_id == trace_id).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::test_support::MockCompletion;
    use crate::storage::{BackgroundTransfer, ErrorKind, FinishFuture};

    use pretty_assertions::assert_eq;
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };
    use tokio::sync::oneshot;

    fn logger() -> slog::Logger {
        slog::Logger::root(slog::Discard, slog::o!())
    }

    async fn wait_until_drained(queue: &BackgroundTransferQueue) {
        for _ in 0..500 {
            if queue.in_flight().is_empty() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        panic!("background transfers did not finish: {:?}", queue.in_flight());
    }

    #[tokio::test]
    async fn runs_submitted_transfers() {
        let queue = BackgroundTransferQueue::spawn(logger(), false);
        let finished = Arc::new(AtomicUsize::new(0));
        let trace_id = TraceId::new();
        for id in ["a", "b", "c"] {
            let transfer = MockCompletion {
                id: id.to_string(),
                finished: finished.clone(),
            };
            queue.submit(Box::new(transfer), trace_id);
        }
        wait_until_drained(&queue).await;
        assert_eq!(finished.load(Ordering::SeqCst), 3);
    }

    #[derive(Debug)]
    struct Gated {
        gate: Option<oneshot::Receiver<()>>,
        fail: bool,
    }

    impl BackgroundTransfer for Gated {
        fn transfer_id(&self) -> &str {
            "gated"
        }

        fn finish(mut self: Box<Self>) -> FinishFuture {
            let gate = self.gate.take();
            Box::pin(async move {
                if let Some(gate) = gate {
                    let _ = gate.await;
                }
                if self.fail { Err(ErrorKind::LocalError.into()) } else { Ok(()) }
            })
        }
    }

    #[tokio::test]
    async fn submit_returns_before_the_transfer_finishes() {
        let queue = BackgroundTransferQueue::spawn(logger(), false);
        let (open, gate) = oneshot::channel();
        let session = TraceId::new();
        let other_session = TraceId::new();

        queue.submit(Box::new(Gated { gate: Some(gate), fail: false }), session);

        assert_eq!(queue.in_flight_for(session), 1);
        assert_eq!(queue.in_flight_for(other_session), 0);
        assert_eq!(queue.in_flight()[0].transfer_id, "gated");

        open.send(()).unwrap();
        wait_until_drained(&queue).await;
        assert_eq!(queue.in_flight_for(session), 0);
    }

    #[tokio::test]
    async fn failed_transfers_leave_the_queue_too() {
        let queue = BackgroundTransferQueue::spawn(logger(), false);
        queue.submit(Box::new(Gated { gate: None, fail: true }), TraceId::new());
        wait_until_drained(&queue).await;
    }
}
