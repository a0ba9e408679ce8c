//! Compensating-transaction coordinator for one ingestion call.
//!
//! Every successful create is recorded here before the next write starts.
//! [`Saga::rollback`] deletes everything recorded, newest batch first. The
//! accumulator sits behind a mutex so concurrent writers can share one saga.

use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};
use uwb_common::RecordId;

use crate::logging::event_names;
use crate::service::{ObjectType, QueryService};

/// Ids created by one successful create call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommittedBatch {
    pub object_type: ObjectType,
    pub ids: Vec<RecordId>,
}

/// Outcome of a complete rollback.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackReport {
    /// Records confirmed gone (deleted or already absent).
    pub deleted: usize,
    pub batches: usize,
}

fn count_ids(batches: &[CommittedBatch]) -> usize {
    batches.iter().map(|b| b.ids.len()).sum()
}

/// Rollback could not remove every committed record.
///
/// `remaining` lists exactly what still needs manual cleanup.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("rollback incomplete, {} records need manual cleanup: {message}", count_ids(.remaining))]
pub struct RollbackError {
    pub message: String,
    pub remaining: Vec<CommittedBatch>,
}

impl RollbackError {
    pub fn remaining_count(&self) -> usize {
        count_ids(&self.remaining)
    }
}

#[derive(Debug)]
pub struct Saga {
    committed: Mutex<Vec<CommittedBatch>>,
    delete_chunk_size: usize,
}

impl Default for Saga {
    fn default() -> Self {
        Saga::new(1000)
    }
}

impl Saga {
    /// Create an empty saga deleting at most `delete_chunk_size` ids per call.
    pub fn new(delete_chunk_size: usize) -> Self {
        Saga {
            committed: Mutex::new(Vec::new()),
            delete_chunk_size: delete_chunk_size.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<CommittedBatch>> {
        self.committed
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record ids returned by a successful create.
    pub fn record(&self, object_type: ObjectType, ids: Vec<RecordId>) {
        if ids.is_empty() {
            return;
        }
        self.lock().push(CommittedBatch { object_type, ids });
    }

    /// Number of ids currently awaiting commit or rollback.
    pub fn committed_count(&self) -> usize {
        count_ids(&self.lock())
    }

    /// Snapshot of the recorded batches, oldest first.
    pub fn committed(&self) -> Vec<CommittedBatch> {
        self.lock().clone()
    }

    /// Forget every recorded batch; the call succeeded.
    pub fn commit(&self) -> Vec<CommittedBatch> {
        std::mem::take(&mut *self.lock())
    }

    /// Delete every recorded id, newest batch first.
    ///
    /// Best effort: a failed delete does not stop later batches. On success
    /// the saga is empty. On failure the saga keeps exactly the ids that
    /// survived, so calling `rollback` again retries only those.
    pub fn rollback(&self, service: &dyn QueryService) -> Result<RollbackReport, RollbackError> {
        let batches = std::mem::take(&mut *self.lock());
        let mut report = RollbackReport {
            deleted: 0,
            batches: batches.len(),
        };
        let mut remaining: Vec<CommittedBatch> = Vec::new();
        let mut first_failure: Option<String> = None;

        for batch in batches.into_iter().rev() {
            let mut left = Vec::new();
            for chunk in batch.ids.chunks(self.delete_chunk_size) {
                match service.delete(batch.object_type, chunk) {
                    Ok(statuses) if statuses.len() == chunk.len() => {
                        for (id, status) in chunk.iter().zip(statuses) {
                            if status.is_gone() {
                                report.deleted += 1;
                            } else {
                                first_failure.get_or_insert_with(|| {
                                    format!("{} {}: {:?}", batch.object_type, id, status)
                                });
                                left.push(id.clone());
                            }
                        }
                    }
                    Ok(statuses) => {
                        first_failure.get_or_insert_with(|| {
                            format!(
                                "{} delete returned {} statuses for {} ids",
                                batch.object_type,
                                statuses.len(),
                                chunk.len()
                            )
                        });
                        left.extend_from_slice(chunk);
                    }
                    Err(e) => {
                        warn!(
                            target: event_names::ROLLBACK_FAILED,
                            object_type = %batch.object_type,
                            ids = chunk.len(),
                            error = %e,
                            "Delete call failed during rollback"
                        );
                        first_failure.get_or_insert_with(|| e.to_string());
                        left.extend_from_slice(chunk);
                    }
                }
            }
            debug!(
                object_type = %batch.object_type,
                requested = batch.ids.len(),
                left = left.len(),
                "Rolled back batch"
            );
            if !left.is_empty() {
                remaining.push(CommittedBatch {
                    object_type: batch.object_type,
                    ids: left,
                });
            }
        }

        if remaining.is_empty() {
            return Ok(report);
        }
        // keep oldest-first order for the next attempt
        remaining.reverse();
        self.lock().extend(remaining.iter().cloned());
        Err(RollbackError {
            message: first_failure.unwrap_or_else(|| "unknown delete failure".to_string()),
            remaining,
        })
    }
}
