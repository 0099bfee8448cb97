pub mod buffer;
pub mod config;
pub mod edge;
pub mod http;
pub mod pipeline;
pub mod publish;
pub mod state;

pub use buffer::{BufferError, MeasurementBuffer, MeasurementRecord};
pub use config::{
    Config, DecoderConfig, EdgeConfig, NodeConfig, PublishConfig, ServerConfig, SinkConfig,
};
pub use edge::mock::MockEdgeReceiver;
pub use edge::tcp::TcpEdgeReceiver;
pub use edge::{EdgeFrame, EdgeReceiver, LinkId};
pub use pipeline::{PublishSchedule, run_collector, run_publisher};
pub use publish::memory::MemoryPublisher;
pub use publish::stdout::StdoutPublisher;
pub use publish::{BatchId, MeasurementBatch, Publisher};
pub use state::{DispatchState, DispatchStats};
