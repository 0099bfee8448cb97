use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use sensorlink_core::Decoder;
use sensorlink_dispatch::{
    Config, DispatchState, EdgeConfig, EdgeReceiver, MeasurementBuffer, MemoryPublisher,
    MockEdgeReceiver, PublishSchedule, Publisher, SinkConfig, StdoutPublisher, TcpEdgeReceiver,
    http, run_collector, run_publisher,
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "sensorlink-dispatch")]
#[command(about = "Sensor board frame decoder and measurement dispatcher")]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "sensorlink-dispatch.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "sensorlink_dispatch=info,sensorlink_core=info".to_owned());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_span_events(tracing_subscriber::fmt::format::FmtSpan::CLOSE)
        .init();

    let cli = Cli::parse();

    let config = if cli.config.exists() {
        info!(path = ?cli.config, "Loading configuration");
        Config::load(&cli.config)?
    } else {
        info!("No configuration file found, using defaults");
        Config::default()
    };

    let decoder = Arc::new(config.decoder.build()?);

    info!(
        node_id = %config.node.padded_id(),
        http_addr = %config.server.http_addr,
        sensors = decoder.specs().len(),
        "Starting sensorlink-dispatch"
    );

    match config.publish.sink {
        SinkConfig::Stdout => {
            info!("Publishing batches to stdout");
            run_dispatcher(config, decoder, StdoutPublisher::new()).await?;
        }
        SinkConfig::Memory => {
            info!("Keeping published batches in memory");
            let publisher = MemoryPublisher::default();
            run_dispatcher(config, decoder, publisher.clone()).await?;
            info!(
                measurements = publisher.measurement_count()?,
                "In-memory sink totals"
            );
        }
    }

    Ok(())
}

async fn run_dispatcher<P: Publisher>(
    config: Config,
    decoder: Arc<Decoder>,
    publisher: P,
) -> color_eyre::Result<()> {
    let state = DispatchState::new();

    match &config.edge {
        EdgeConfig::Mock {
            frame_interval_millis,
            board_count,
        } => {
            info!(
                frame_interval_millis,
                board_count, "Using mock edge receiver"
            );
            let receiver =
                MockEdgeReceiver::new(*frame_interval_millis, *board_count, state.clone());
            run_edge_receiver(receiver, decoder, publisher, config, state).await
        }
        EdgeConfig::Tcp { addr } => {
            info!(?addr, "Using TCP edge receiver");
            let receiver = TcpEdgeReceiver::new(*addr, state.clone());
            run_edge_receiver(receiver, decoder, publisher, config, state).await
        }
    }
}

async fn run_edge_receiver<E: EdgeReceiver, P: Publisher>(
    edge_receiver: E,
    decoder: Arc<Decoder>,
    publisher: P,
    config: Config,
    state: DispatchState,
) -> color_eyre::Result<()> {
    let cancel = CancellationToken::new();
    let buffer = MeasurementBuffer::default();

    let edge_rx = edge_receiver.start(cancel.clone()).await?;

    let collector_handle = tokio::spawn(run_collector(
        edge_rx,
        decoder,
        buffer.clone(),
        state.clone(),
        cancel.clone(),
    ));

    // cancelled once the collector has drained
    let publish_cancel = CancellationToken::new();
    let schedule = PublishSchedule::new(
        Duration::from_secs(config.publish.interval_secs),
        config.publish.max_batch,
    );
    let publisher_handle = tokio::spawn(run_publisher(
        buffer,
        publisher,
        config.node.padded_id(),
        schedule,
        state.clone(),
        publish_cancel.clone(),
    ));

    let http_addr = config.server.http_addr;
    let listener = TcpListener::bind(http_addr).await?;
    info!(%http_addr, "HTTP server listening");

    let cancel_for_http = cancel.clone();

    tokio::select! {
        result = axum::serve(listener, http::router(state)).with_graceful_shutdown(async move {
            cancel_for_http.cancelled().await;
        }) => {
            if let Err(e) = result {
                error!(error = ?e, "HTTP server error");
            }
            info!("HTTP server shut down");
            cancel.cancel();
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
            cancel.cancel();
        }
    }

    if let Err(e) = collector_handle.await {
        error!(error = ?e, "Collector task failed");
    }
    publish_cancel.cancel();
    if let Err(e) = publisher_handle.await {
        error!(error = ?e, "Publisher task failed");
    }

    info!("sensorlink-dispatch shut down complete");
    Ok(())
}
