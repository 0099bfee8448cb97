use std::sync::Arc;
use std::time::Duration;

use sensorlink_core::Decoder;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::buffer::{MeasurementBuffer, MeasurementRecord};
use crate::edge::EdgeFrame;
use crate::publish::{MeasurementBatch, Publisher};
use crate::state::DispatchState;

/// Decode frames from the edge and buffer their measurements until the
/// channel closes or `cancel` fires. Frames already queued when `cancel`
/// fires are still buffered.
pub async fn run_collector(
    mut edge_rx: mpsc::Receiver<EdgeFrame>,
    decoder: Arc<Decoder>,
    buffer: MeasurementBuffer,
    state: DispatchState,
    cancel: CancellationToken,
) {
    info!("Collector started");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                edge_rx.close();
                let mut drained = 0usize;
                while let Some(frame) = edge_rx.recv().await {
                    collect_frame(&frame, &decoder, &buffer, &state).await;
                    drained += 1;
                }
                info!(drained, "Collector shutting down");
                break;
            }
            frame = edge_rx.recv() => {
                let Some(frame) = frame else {
                    info!("Edge channel closed, collector shutting down");
                    break;
                };
                collect_frame(&frame, &decoder, &buffer, &state).await;
            }
        }
    }
}

async fn collect_frame(
    frame: &EdgeFrame,
    decoder: &Decoder,
    buffer: &MeasurementBuffer,
    state: &DispatchState,
) {
    let packet = match decoder.decode(&frame.bytes) {
        Ok(packet) => packet,
        Err(e) => {
            warn!(error = %e, link = %frame.link, "Dropping frame");
            state.frame_rejected().await;
            return;
        }
    };

    let subpacket_errors = packet.errors().count();
    let records = MeasurementRecord::from_packet(frame.link, &packet, frame.received_at);
    let count = records.len();

    if let Err(e) = buffer.extend(records) {
        error!(error = %e, link = %frame.link, "Failed to buffer measurements");
        return;
    }

    debug!(
        link = %frame.link,
        version = packet.packet.version(),
        measurements = count,
        subpacket_errors,
        "Buffered frame"
    );
    state.frame_accepted(count, subpacket_errors).await;
}

/// Timing and size limits for [`run_publisher`].
#[derive(Debug, Clone, Copy)]
pub struct PublishSchedule {
    pub interval: Duration,
    pub max_batch: usize,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl PublishSchedule {
    pub fn new(interval: Duration, max_batch: usize) -> Self {
        Self {
            interval,
            max_batch,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(60),
        }
    }
}

/// Periodically hand buffered measurements to `publisher`.
///
/// A failed batch goes back to the front of the buffer and the next
/// attempt waits with exponential backoff. On shutdown the buffer is
/// flushed batch by batch until it is empty or a publish fails.
pub async fn run_publisher<P: Publisher>(
    buffer: MeasurementBuffer,
    publisher: P,
    sender_id: String,
    schedule: PublishSchedule,
    state: DispatchState,
    cancel: CancellationToken,
) {
    info!(
        %sender_id,
        interval_secs = schedule.interval.as_secs(),
        max_batch = schedule.max_batch,
        "Publisher started"
    );

    let mut interval = tokio::time::interval(schedule.interval);
    let mut backoff = schedule.initial_backoff;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("Publisher shutting down");
                break;
            }
            _ = interval.tick() => {
                match publish_once(&buffer, &publisher, &sender_id, schedule.max_batch, &state).await {
                    Ok(_) => backoff = schedule.initial_backoff,
                    Err(()) => {
                        warn!(backoff_millis = backoff.as_millis() as u64, "Publish failed, will retry");
                        tokio::select! {
                            _ = cancel.cancelled() => {}
                            _ = tokio::time::sleep(backoff) => {}
                        }
                        backoff = (backoff * 2).min(schedule.max_backoff);
                    }
                }
            }
        }
    }

    while let Ok(published) =
        publish_once(&buffer, &publisher, &sender_id, schedule.max_batch, &state).await
    {
        if published == 0 {
            break;
        }
    }

    match buffer.len() {
        Ok(0) => {}
        Ok(left) => warn!(left, "Shutting down with unpublished measurements"),
        Err(e) => error!(error = %e, "Failed to read measurement buffer at shutdown"),
    }
}

/// Publish one batch of up to `max_batch` measurements.
///
/// Returns the number published; zero when the buffer was empty.
async fn publish_once<P: Publisher>(
    buffer: &MeasurementBuffer,
    publisher: &P,
    sender_id: &str,
    max_batch: usize,
    state: &DispatchState,
) -> Result<usize, ()> {
    let measurements = match buffer.take(max_batch) {
        Ok(measurements) => measurements,
        Err(e) => {
            error!(error = %e, "Failed to read measurement buffer");
            return Err(());
        }
    };

    if measurements.is_empty() {
        debug!("No measurements to publish");
        return Ok(0);
    }

    let batch = MeasurementBatch::new(sender_id, measurements);
    let count = batch.len();

    match publisher.publish(&batch).await {
        Ok(()) => {
            info!(batch_id = %batch.id.0, measurements = count, "Published batch");
            state.batch_published(count).await;
            Ok(count)
        }
        Err(e) => {
            error!(error = %e, batch_id = %batch.id.0, "Failed to publish batch");
            state.publish_failed().await;
            if let Err(e) = buffer.restore(batch.into_measurements()) {
                error!(error = %e, "Failed to restore unpublished batch, measurements lost");
            }
            Err(())
        }
    }
}
