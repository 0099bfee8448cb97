use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use sensorlink_core::{FramingError, Packet, Subpacket};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use ulid::Ulid;

use super::{EdgeFrame, EdgeReceiver, LinkId};
use crate::state::DispatchState;

/// Chemical sensor instances present in the bundled calibration sample.
const CHEMSENSE_INSTANCES: [&str; 2] = ["5410EC38E5F0", "083020D95EE0"];

/// Mock edge receiver that encodes frames from simulated boards.
pub struct MockEdgeReceiver {
    frame_interval: Duration,
    boards: Arc<Vec<MockBoard>>,
    state: DispatchState,
}

impl MockEdgeReceiver {
    pub fn new(frame_interval_millis: u64, board_count: usize, state: DispatchState) -> Self {
        let boards = (0..board_count).map(MockBoard::new).collect();

        Self {
            frame_interval: Duration::from_millis(frame_interval_millis),
            boards: Arc::new(boards),
            state,
        }
    }

    pub fn links(&self) -> Vec<LinkId> {
        self.boards.iter().map(|b| b.link).collect()
    }
}

/// A simulated sensor board with a stable link id.
struct MockBoard {
    link: LinkId,
    chemsense_instance: &'static str,
    sequence: std::sync::atomic::AtomicU32,
}

impl MockBoard {
    fn new(index: usize) -> Self {
        Self {
            link: LinkId(Ulid::new()),
            chemsense_instance: CHEMSENSE_INSTANCES[index % CHEMSENSE_INSTANCES.len()],
            sequence: std::sync::atomic::AtomicU32::new(0),
        }
    }

    fn generate_frame(&self) -> Result<Box<[u8]>, FramingError> {
        let mut rng = rand::rng();
        let sequence = self
            .sequence
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);

        // tmp112 register: 12-bit count in bits 3..15
        let celsius_counts: u16 = rng.random_range(200..480);
        let humidity: u16 = rng.random_range(150..700);
        let rain_tips: u16 = rng.random_range(0..12);
        let light: u16 = rng.random_range(80..900);

        let sound: Vec<u8> = (0..8)
            .flat_map(|_| rng.random_range(480u16..560).to_be_bytes())
            .collect();

        let chemsense = format!(
            "BAD={} SQN={:x} SHH={} IRR={} SO2={} NO2={} CMO={} AT0={} AT1={} AT2={} AT3={}",
            self.chemsense_instance,
            sequence,
            rng.random_range(2000..8000),
            rng.random_range(-2000..2000),
            rng.random_range(-300..300),
            rng.random_range(-400..400),
            rng.random_range(-600..600),
            rng.random_range(3800..4200),
            rng.random_range(3800..4200),
            rng.random_range(3800..4200),
            rng.random_range(3800..4200),
        );

        let subpackets = vec![
            Subpacket::new(0x01, true, &(celsius_counts << 3).to_be_bytes())?,
            Subpacket::new(0x02, true, &humidity.to_be_bytes())?,
            Subpacket::new(0x03, true, &rain_tips.to_be_bytes())?,
            Subpacket::new(0x04, rng.random_ratio(19, 20), &light.to_be_bytes())?,
            Subpacket::new(0x05, true, &sound)?,
            Subpacket::new(0x2A, true, chemsense.as_bytes())?,
        ];

        Ok(Packet::new(2, subpackets)?.to_bytes().into_boxed_slice())
    }
}

#[async_trait]
impl EdgeReceiver for MockEdgeReceiver {
    type Error = std::convert::Infallible;

    async fn start(
        &self,
        cancel: CancellationToken,
    ) -> Result<mpsc::Receiver<EdgeFrame>, Self::Error> {
        let (tx, rx) = mpsc::channel(100);

        let boards = Arc::clone(&self.boards);
        let frame_interval = self.frame_interval;
        let state = self.state.clone();

        info!(
            board_count = boards.len(),
            frame_interval_millis = frame_interval.as_millis() as u64,
            "Starting mock edge receiver"
        );

        for board in boards.iter() {
            state.link_connected(board.link).await;
        }

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(frame_interval);

            'generate: loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        info!("Mock frame generator shutting down");
                        break;
                    }
                    _ = interval.tick() => {
                        for board in boards.iter() {
                            let bytes = match board.generate_frame() {
                                Ok(bytes) => bytes,
                                Err(e) => {
                                    warn!(error = %e, link = %board.link, "Mock board produced no frame");
                                    continue;
                                }
                            };

                            let frame = EdgeFrame {
                                link: board.link,
                                bytes,
                                received_at: jiff::Timestamp::now(),
                            };
                            if tx.send(frame).await.is_err() {
                                info!("Channel closed, frame generator shutting down");
                                break 'generate;
                            }
                        }
                    }
                }
            }

            for board in boards.iter() {
                state.link_disconnected(board.link).await;
            }
        });

        Ok(rx)
    }
}
