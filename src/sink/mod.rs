// src/sink/mod.rs
pub mod elastic;
pub mod policy;
pub mod processor;

use async_trait::async_trait;
use std::fmt;
use thiserror::Error;

pub use elastic::{ElasticClient, StoreError};
pub use policy::{FailFast, FailurePolicy, LogAndContinue};
pub use processor::{BulkConfig, BulkProcessor, SinkStats};

/// A create-only write of one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkOp {
    pub id: String,
    /// Serialized JSON document.
    pub body: String,
}

/// A single operation the store refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemFailure {
    pub id: String,
    pub status: u16,
    pub reason: String,
}

impl fmt::Display for ItemFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.id, self.status, self.reason)
    }
}

/// Outcome of one committed batch, handed to the failure policy.
#[derive(Debug, Clone)]
pub struct BatchReport {
    pub batch: u64,
    pub worker: usize,
    pub total: usize,
    pub failures: Vec<ItemFailure>,
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("serializing trip {id}: {source}")]
    Serialize {
        id: i64,
        #[source]
        source: serde_json::Error,
    },

    #[error("bulk request failed: {0}")]
    Transport(#[from] StoreError),

    #[error("bulk batch {batch} had {failed} of {total} operations rejected; first: {first}")]
    BatchFailed {
        batch: u64,
        failed: usize,
        total: usize,
        first: ItemFailure,
    },

    #[error("bulk ingestion aborted after an earlier failure")]
    Aborted,

    #[error("bulk worker {worker} stopped unexpectedly: {message}")]
    Worker { worker: usize, message: String },
}

/// Where batches of create operations end up.
#[async_trait]
pub trait BulkTransport: Send + Sync {
    /// Send one batch. `Ok` carries the per-document rejections, if any;
    /// `Err` means the batch as a whole did not go through.
    async fn send(&self, ops: &[BulkOp]) -> Result<Vec<ItemFailure>, StoreError>;
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::{
        collections::HashSet,
        sync::{
            atomic::{AtomicUsize, Ordering},
            Mutex,
        },
    };

    /// Records every id it receives; rejects ids in `conflicts` with a 409.
    #[derive(Default)]
    pub struct RecordingTransport {
        pub attempts: AtomicUsize,
        pub received: Mutex<Vec<BulkOp>>,
        pub batches: Mutex<Vec<usize>>,
        pub conflicts: HashSet<String>,
        pub down: bool,
    }

    impl RecordingTransport {
        pub fn rejecting<I: IntoIterator<Item = &'static str>>(ids: I) -> Self {
            Self {
                conflicts: ids.into_iter().map(str::to_string).collect(),
                ..Default::default()
            }
        }

        pub fn unreachable() -> Self {
            Self {
                down: true,
                ..Default::default()
            }
        }

        pub fn ids(&self) -> Vec<String> {
            self.received
                .lock()
                .unwrap()
                .iter()
                .map(|op| op.id.clone())
                .collect()
        }
    }

    #[async_trait]
    impl BulkTransport for RecordingTransport {
        async fn send(&self, ops: &[BulkOp]) -> Result<Vec<ItemFailure>, StoreError> {
            self.attempts.fetch_add(1, Ordering::AcqRel);
            if self.down {
                return Err(StoreError::Status {
                    op: "bulk",
                    status: 503,
                    body: "no living connections".into(),
                });
            }
            self.batches.lock().unwrap().push(ops.len());
            self.received.lock().unwrap().extend(ops.iter().cloned());
            Ok(ops
                .iter()
                .filter(|op| self.conflicts.contains(&op.id))
                .map(|op| ItemFailure {
                    id: op.id.clone(),
                    status: 409,
                    reason: "version_conflict_engine_exception".into(),
                })
                .collect())
        }
    }
}
