use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;

use super::{MeasurementBatch, Publisher};

#[derive(Debug, thiserror::Error)]
pub enum MemoryPublisherError {
    #[error("Mutex poisoned: {0}")]
    MutexPoisoned(String),

    #[error("publish rejected ({remaining} more failures scheduled)")]
    Rejected { remaining: usize },
}

impl<T> From<PoisonError<T>> for MemoryPublisherError {
    fn from(err: PoisonError<T>) -> Self {
        MemoryPublisherError::MutexPoisoned(err.to_string())
    }
}

/// Keeps published batches in memory.
/// Intended for tests and for running the dispatcher without a sink.
#[derive(Clone, Default)]
pub struct MemoryPublisher {
    batches: Arc<Mutex<Vec<MeasurementBatch>>>,
    failures: Arc<AtomicUsize>,
}

impl MemoryPublisher {
    /// Make the next `count` publishes fail.
    pub fn fail_next(&self, count: usize) {
        self.failures.store(count, Ordering::SeqCst);
    }

    pub fn batches(&self) -> Result<Vec<MeasurementBatch>, MemoryPublisherError> {
        Ok(self.batches.lock()?.clone())
    }

    pub fn measurement_count(&self) -> Result<usize, MemoryPublisherError> {
        Ok(self.batches.lock()?.iter().map(MeasurementBatch::len).sum())
    }
}

#[async_trait]
impl Publisher for MemoryPublisher {
    type Error = MemoryPublisherError;

    async fn publish(&self, batch: &MeasurementBatch) -> Result<(), Self::Error> {
        let scheduled = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if let Ok(previous) = scheduled {
            return Err(MemoryPublisherError::Rejected {
                remaining: previous - 1,
            });
        }

        self.batches.lock()?.push(batch.clone());
        Ok(())
    }
}
