use async_trait::async_trait;
use std::{net::SocketAddr, time::Duration};
use tokio::{
    io::{self, AsyncReadExt},
    net::{TcpListener, TcpStream},
    sync::mpsc,
    time::sleep,
};
use tokio_util::sync::CancellationToken;
use tracing::{Span, debug, error, field, info, instrument, warn};
use ulid::Ulid;

use super::assembler::FrameAssembler;
use super::{EdgeFrame, EdgeReceiver, LinkId};
use crate::state::DispatchState;

#[derive(Debug, thiserror::Error)]
pub enum EdgeConnectionError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal frame channel closed")]
    ChannelClosed,
}

/// Accepts board connections and reassembles the frames they stream.
pub struct TcpEdgeReceiver {
    addr: SocketAddr,
    state: DispatchState,
}

impl TcpEdgeReceiver {
    pub fn new(addr: SocketAddr, state: DispatchState) -> Self {
        Self { addr, state }
    }
}

#[async_trait]
impl EdgeReceiver for TcpEdgeReceiver {
    type Error = io::Error;

    async fn start(
        &self,
        cancel: CancellationToken,
    ) -> Result<mpsc::Receiver<EdgeFrame>, Self::Error> {
        let (tx, rx) = mpsc::channel(100);

        let listener = TcpListener::bind(self.addr).await?;
        info!(addr = %self.addr, "TCP edge receiver started");

        tokio::spawn(run_server_loop(listener, tx, cancel, self.state.clone()));

        Ok(rx)
    }
}

#[instrument(name = "server_loop", skip_all)]
async fn run_server_loop(
    listener: TcpListener,
    tx: mpsc::Sender<EdgeFrame>,
    cancel: CancellationToken,
    state: DispatchState,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("Closing TCP edge receiver server");
                break;
            }
            client = listener.accept() => {
                match client {
                    Ok((stream, addr)) => {
                        info!(%addr, "Board connected");

                        let cancel = cancel.clone();
                        let tx = tx.clone();
                        let state = state.clone();

                        tokio::spawn(async move {
                            if let Err(e) = handle_link(stream, tx, cancel, state).await {
                                error!(error = %e, "Connection closed with error");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "Failed to accept connection");
                        if is_transient_error(&e) {
                            sleep(Duration::from_millis(100)).await;
                        } else {
                            break;
                        }
                    }
                }
            }
        }
    }
}

fn is_transient_error(e: &std::io::Error) -> bool {
    use std::io::ErrorKind::*;
    matches!(
        e.kind(),
        ConnectionRefused | ConnectionAborted | ConnectionReset | OutOfMemory | Other
    )
}

#[instrument(name = "edge_link", skip_all, fields(link = field::Empty))]
async fn handle_link(
    stream: TcpStream,
    tx: mpsc::Sender<EdgeFrame>,
    cancel: CancellationToken,
    state: DispatchState,
) -> Result<(), EdgeConnectionError> {
    let link = LinkId(Ulid::new());
    Span::current().record("link", field::display(link));

    state.link_connected(link).await;
    let result = read_frames(stream, link, &tx, &cancel, &state).await;
    state.link_disconnected(link).await;

    result
}

async fn read_frames(
    mut stream: TcpStream,
    link: LinkId,
    tx: &mpsc::Sender<EdgeFrame>,
    cancel: &CancellationToken,
    state: &DispatchState,
) -> Result<(), EdgeConnectionError> {
    let mut assembler = FrameAssembler::new();
    let mut tmp = [0u8; 512];

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("Shutdown signal received");
                return Ok(());
            }
            read = stream.read(&mut tmp) => {
                let n = read?;
                if n == 0 {
                    info!(
                        discarded = assembler.discarded(),
                        pending = assembler.pending(),
                        "Board closed connection"
                    );
                    return Ok(());
                }

                assembler.push(&tmp[..n]);

                while let Some(frame) = assembler.next_frame() {
                    match frame {
                        Ok(bytes) => {
                            let frame = EdgeFrame {
                                link,
                                bytes,
                                received_at: jiff::Timestamp::now(),
                            };
                            if tx.send(frame).await.is_err() {
                                error!("Internal frame channel closed");
                                return Err(EdgeConnectionError::ChannelClosed);
                            }
                        }
                        Err(e) => {
                            warn!(error = %e, "Dropping malformed frame, resyncing");
                            state.frame_rejected().await;
                        }
                    }
                }

                debug!(discarded = assembler.discarded(), "Read {n} bytes");
            }
        }
    }
}
