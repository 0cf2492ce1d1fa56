// src/sink/processor.rs
use futures::future::join_all;
use std::{
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Mutex as StdMutex,
    },
    time::Duration,
};
use tokio::{
    sync::{mpsc, Mutex},
    task::JoinHandle,
    time::Instant,
};
use tracing::{debug, info, warn};

use super::{BatchReport, BulkOp, BulkTransport, FailurePolicy, SinkError};
use crate::trip::EnrichedTrip;

/// Batching and worker-pool knobs.
#[derive(Debug, Clone)]
pub struct BulkConfig {
    /// Concurrent workers draining the queue.
    pub workers: usize,
    /// Operations per batch.
    pub batch_size: usize,
    /// Dispatch a partial batch once this much time has passed since the last one.
    pub flush_interval: Duration,
    /// Batches that may wait in the queue before `submit` blocks.
    pub queue_capacity: usize,
}

impl Default for BulkConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            batch_size: 1_000,
            flush_interval: Duration::from_secs(30),
            queue_capacity: 8,
        }
    }
}

/// Totals reported once the processor has drained.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SinkStats {
    pub submitted: u64,
    pub batches: u64,
    pub committed: u64,
    pub rejected: u64,
}

struct Batch {
    index: u64,
    ops: Vec<BulkOp>,
}

/// State shared between the producer and the workers.
#[derive(Default)]
struct Shared {
    failed: AtomicBool,
    error: StdMutex<Option<SinkError>>,
    batches: AtomicU64,
    committed: AtomicU64,
    rejected: AtomicU64,
}

impl Shared {
    /// Keep the first fatal error; later ones are only logged.
    fn fail(&self, err: SinkError) {
        let mut slot = self.error.lock().unwrap_or_else(|e| e.into_inner());
        if self.failed.swap(true, Ordering::AcqRel) {
            warn!(error = %err, "additional bulk failure after abort");
            return;
        }
        *slot = Some(err);
    }

    fn take_error(&self) -> Option<SinkError> {
        self.error.lock().unwrap_or_else(|e| e.into_inner()).take()
    }

    fn has_failed(&self) -> bool {
        self.failed.load(Ordering::Acquire)
    }
}

/// Groups documents into create-only batches and ships them through a bounded
/// queue to a fixed pool of workers.
pub struct BulkProcessor {
    config: BulkConfig,
    batch: Vec<BulkOp>,
    batch_index: u64,
    submitted: u64,
    last_dispatch: Instant,
    tx: mpsc::Sender<Batch>,
    workers: Vec<JoinHandle<()>>,
    shared: Arc<Shared>,
}

impl BulkProcessor {
    /// Spawn the worker pool on the current tokio runtime.
    pub fn new(
        transport: Arc<dyn BulkTransport>,
        policy: Arc<dyn FailurePolicy>,
        config: BulkConfig,
    ) -> Self {
        let workers_n = config.workers.max(1);
        let (tx, rx) = mpsc::channel::<Batch>(config.queue_capacity.max(1));
        let rx = Arc::new(Mutex::new(rx));
        let shared = Arc::new(Shared::default());

        let workers = (0..workers_n)
            .map(|worker| {
                tokio::spawn(run_worker(
                    worker,
                    Arc::clone(&rx),
                    Arc::clone(&transport),
                    Arc::clone(&policy),
                    Arc::clone(&shared),
                ))
            })
            .collect();
        info!(
            workers = workers_n,
            batch_size = config.batch_size,
            "bulk processor started"
        );

        Self {
            batch: Vec::with_capacity(config.batch_size),
            config,
            batch_index: 0,
            submitted: 0,
            last_dispatch: Instant::now(),
            tx,
            workers,
            shared,
        }
    }

    /// Queue one trip as a create operation keyed by its id. Waits only when
    /// the queue is full. Returns the first fatal failure a worker reported.
    pub async fn submit(&mut self, trip: EnrichedTrip) -> Result<(), SinkError> {
        if self.shared.has_failed() {
            return Err(self.shared.take_error().unwrap_or(SinkError::Aborted));
        }

        let body = serde_json::to_string(&trip).map_err(|source| SinkError::Serialize {
            id: trip.id,
            source,
        })?;
        self.batch.push(BulkOp {
            id: trip.id.to_string(),
            body,
        });
        self.submitted += 1;

        if self.batch.len() >= self.config.batch_size
            || self.last_dispatch.elapsed() >= self.config.flush_interval
        {
            self.dispatch().await?;
        }
        Ok(())
    }

    async fn dispatch(&mut self) -> Result<(), SinkError> {
        self.last_dispatch = Instant::now();
        if self.batch.is_empty() {
            return Ok(());
        }
        let ops = std::mem::replace(&mut self.batch, Vec::with_capacity(self.config.batch_size));
        let batch = Batch {
            index: self.batch_index,
            ops,
        };
        self.batch_index += 1;
        debug!(batch = batch.index, ops = batch.ops.len(), "dispatching batch");
        self.tx.send(batch).await.map_err(|_| SinkError::Aborted)
    }

    /// Send what is left, wait for every worker to drain, and report.
    pub async fn flush(mut self) -> Result<SinkStats, SinkError> {
        if !self.shared.has_failed() {
            self.dispatch().await?;
        }

        let BulkProcessor {
            tx,
            workers,
            shared,
            submitted,
            ..
        } = self;
        drop(tx);

        for (worker, joined) in join_all(workers).await.into_iter().enumerate() {
            if let Err(e) = joined {
                shared.fail(SinkError::Worker {
                    worker,
                    message: e.to_string(),
                });
            }
        }

        if shared.has_failed() {
            return Err(shared.take_error().unwrap_or(SinkError::Aborted));
        }

        let stats = SinkStats {
            submitted,
            batches: shared.batches.load(Ordering::Acquire),
            committed: shared.committed.load(Ordering::Acquire),
            rejected: shared.rejected.load(Ordering::Acquire),
        };
        info!(?stats, "bulk processor flushed");
        Ok(stats)
    }
}

async fn run_worker(
    worker: usize,
    rx: Arc<Mutex<mpsc::Receiver<Batch>>>,
    transport: Arc<dyn BulkTransport>,
    policy: Arc<dyn FailurePolicy>,
    shared: Arc<Shared>,
) {
    loop {
        let next = { rx.lock().await.recv().await };
        let Some(batch) = next else {
            break;
        };
        if shared.has_failed() {
            debug!(worker, batch = batch.index, "dropping batch after abort");
            continue;
        }

        let total = batch.ops.len();
        match transport.send(&batch.ops).await {
            Ok(failures) => {
                shared.batches.fetch_add(1, Ordering::AcqRel);
                shared
                    .committed
                    .fetch_add(total.saturating_sub(failures.len()) as u64, Ordering::AcqRel);
                shared
                    .rejected
                    .fetch_add(failures.len() as u64, Ordering::AcqRel);

                let report = BatchReport {
                    batch: batch.index,
                    worker,
                    total,
                    failures,
                };
                if let Err(e) = policy.after_commit(&report) {
                    shared.fail(e);
                }
            }
            Err(e) => {
                warn!(worker, batch = batch.index, error = %e, "bulk request failed");
                shared.fail(SinkError::Transport(e));
            }
        }
    }
    debug!(worker, "bulk worker finished");
}
