pub mod memory;
pub mod stdout;

use async_trait::async_trait;
use serde::Serialize;
use ulid::Ulid;

use crate::buffer::MeasurementRecord;

/// Unique identifier for a published batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct BatchId(pub Ulid);

/// Measurements handed to a sink in one publish.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeasurementBatch {
    pub id: BatchId,
    /// Node id, zero-padded to sixteen characters.
    pub sender_id: Box<str>,
    pub measurements: Box<[MeasurementRecord]>,
    pub timestamp: jiff::Timestamp,
}

impl MeasurementBatch {
    pub fn new(sender_id: &str, measurements: Vec<MeasurementRecord>) -> Self {
        Self {
            id: BatchId(Ulid::new()),
            sender_id: sender_id.into(),
            measurements: measurements.into_boxed_slice(),
            timestamp: jiff::Timestamp::now(),
        }
    }

    pub fn len(&self) -> usize {
        self.measurements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.measurements.is_empty()
    }

    pub fn into_measurements(self) -> Vec<MeasurementRecord> {
        self.measurements.into_vec()
    }
}

/// Destination for measurement batches.
///
/// A failed publish leaves the batch with the caller, which retries it on
/// a later tick.
#[async_trait]
pub trait Publisher: Send + Sync + 'static {
    /// Error type specific to this sink
    type Error: std::error::Error + Send + Sync + 'static;

    async fn publish(&self, batch: &MeasurementBatch) -> Result<(), Self::Error>;
}
