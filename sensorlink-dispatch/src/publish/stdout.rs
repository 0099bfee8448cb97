use async_trait::async_trait;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

use super::{MeasurementBatch, Publisher};

#[derive(Debug, thiserror::Error)]
pub enum StdoutPublisherError {
    #[error("failed to encode batch: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Writes each batch as one JSON line.
pub struct StdoutPublisher<W = tokio::io::Stdout> {
    out: Mutex<W>,
}

impl StdoutPublisher {
    pub fn new() -> Self {
        Self::with_writer(tokio::io::stdout())
    }
}

impl Default for StdoutPublisher {
    fn default() -> Self {
        Self::new()
    }
}

impl<W> StdoutPublisher<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    pub fn with_writer(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner()
    }
}

#[async_trait]
impl<W> Publisher for StdoutPublisher<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    type Error = StdoutPublisherError;

    async fn publish(&self, batch: &MeasurementBatch) -> Result<(), Self::Error> {
        let mut line = serde_json::to_vec(batch)?;
        line.push(b'\n');

        let mut out = self.out.lock().await;
        out.write_all(&line).await?;
        out.flush().await?;

        Ok(())
    }
}
