pub mod assembler;
pub mod mock;
pub mod tcp;

use std::fmt;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use ulid::Ulid;

/// Identifies one edge link (a board connection or a simulated board).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct LinkId(pub Ulid);

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// One complete frame as received from a link, not yet decoded.
#[derive(Debug, Clone)]
pub struct EdgeFrame {
    pub link: LinkId,
    pub bytes: Box<[u8]>,
    pub received_at: jiff::Timestamp,
}

/// Trait for receiving frames from edge links.
///
/// Implementations of this trait spawn background tasks that send frames
/// to an mpsc channel. The receiver is returned from the `start` method.
#[async_trait]
pub trait EdgeReceiver: Send + Sync + 'static {
    /// Error type for this edge receiver implementation.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Start receiving frames.
    ///
    /// The background tasks will run until the cancellation token is cancelled.
    async fn start(
        &self,
        cancel: CancellationToken,
    ) -> Result<mpsc::Receiver<EdgeFrame>, Self::Error>;
}
