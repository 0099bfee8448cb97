use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use sensorlink_core::{DecodedPacket, Reading};
use serde::Serialize;

use crate::edge::LinkId;

/// One calibrated field, ready to publish.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeasurementRecord {
    pub link: LinkId,
    pub sensor_id: u8,
    /// Whether the board flagged the subpacket as trustworthy.
    pub valid: bool,
    pub name: Box<str>,
    pub reading: Reading,
    pub timestamp: jiff::Timestamp,
}

impl MeasurementRecord {
    /// Flattens a decoded frame into records, in subpacket order.
    pub fn from_packet(
        link: LinkId,
        packet: &DecodedPacket,
        timestamp: jiff::Timestamp,
    ) -> Vec<MeasurementRecord> {
        packet
            .sensors
            .iter()
            .flat_map(|sensor| {
                sensor.fields.iter().map(move |(name, reading)| MeasurementRecord {
                    link,
                    sensor_id: sensor.sensor_id,
                    valid: sensor.valid && sensor.error.is_none(),
                    name: name.clone(),
                    reading: reading.clone(),
                    timestamp,
                })
            })
            .collect()
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Mutex poisoned: {0}")]
pub struct BufferError(String);

impl<T> From<PoisonError<T>> for BufferError {
    fn from(err: PoisonError<T>) -> Self {
        BufferError(err.to_string())
    }
}

/// Measurements waiting for the next publish.
#[derive(Debug, Clone, Default)]
pub struct MeasurementBuffer {
    records: Arc<Mutex<VecDeque<MeasurementRecord>>>,
}

impl MeasurementBuffer {
    pub fn add(&self, record: MeasurementRecord) -> Result<(), BufferError> {
        self.records.lock()?.push_back(record);
        Ok(())
    }

    pub fn extend(&self, records: Vec<MeasurementRecord>) -> Result<(), BufferError> {
        self.records.lock()?.extend(records);
        Ok(())
    }

    /// Drop everything without publishing.
    pub fn clear(&self) -> Result<usize, BufferError> {
        let mut records = self.records.lock()?;
        let dropped = records.len();
        records.clear();
        Ok(dropped)
    }

    /// Remove up to `max` of the oldest records.
    pub fn take(&self, max: usize) -> Result<Vec<MeasurementRecord>, BufferError> {
        let mut records = self.records.lock()?;
        let count = records.len().min(max);
        Ok(records.drain(..count).collect())
    }

    /// Put an unpublished batch back ahead of newer records.
    pub fn restore(&self, batch: Vec<MeasurementRecord>) -> Result<(), BufferError> {
        let mut records = self.records.lock()?;
        for record in batch.into_iter().rev() {
            records.push_front(record);
        }
        Ok(())
    }

    pub fn len(&self) -> Result<usize, BufferError> {
        Ok(self.records.lock()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, BufferError> {
        Ok(self.records.lock()?.is_empty())
    }
}
