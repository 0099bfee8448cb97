use std::sync::Arc;
use std::time::Duration;

use sensorlink_core::{Decoder, Packet, Reading, Subpacket, Value, checksum8};
use sensorlink_dispatch::{
    DispatchState, EdgeFrame, EdgeReceiver, LinkId, MeasurementBuffer, MeasurementRecord,
    MemoryPublisher, MockEdgeReceiver, PublishSchedule, TcpEdgeReceiver, http, run_collector,
    run_publisher,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use ulid::Ulid;

const WAIT: Duration = Duration::from_secs(5);

/// TMP112 reading 0x0C80 (25.0 C), checksum 0x63.
const TMP112_FRAME: [u8; 9] = [0xAA, 0x20, 0x04, 0x01, 0x82, 0x0C, 0x80, 0x63, 0x55];

fn frame(link: LinkId, bytes: &[u8]) -> EdgeFrame {
    EdgeFrame {
        link,
        bytes: bytes.into(),
        received_at: jiff::Timestamp::now(),
    }
}

fn raw_frame(version: u8, body: &[u8]) -> Vec<u8> {
    let mut bytes = vec![0xAA, version << 4, body.len() as u8];
    bytes.extend_from_slice(body);
    bytes.push(checksum8(body, 0));
    bytes.push(0x55);
    bytes
}

async fn wait_until<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    tokio::time::timeout(WAIT, async {
        while !check().await {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

fn fill(buffer: &MeasurementBuffer, names: &[&str]) {
    for name in names {
        buffer
            .add(MeasurementRecord {
                link: LinkId(Ulid::nil()),
                sensor_id: 1,
                valid: true,
                name: (*name).into(),
                reading: Reading::Raw(Value::Int(0)),
                timestamp: jiff::Timestamp::UNIX_EPOCH,
            })
            .unwrap();
    }
}

fn cancelled() -> CancellationToken {
    let cancel = CancellationToken::new();
    cancel.cancel();
    cancel
}

fn free_port() -> std::net::SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap()
}

#[tokio::test]
async fn collector_buffers_good_frames_and_counts_bad_ones() {
    let decoder = Arc::new(Decoder::builtin().unwrap());
    let buffer = MeasurementBuffer::default();
    let state = DispatchState::new();
    let (tx, rx) = mpsc::channel(8);

    let link = LinkId(Ulid::new());
    // Checksum passes but the subpacket claims 5 bytes and carries 1.
    let truncated = raw_frame(2, &[0x01, 0x85, 0x0C]);

    tx.send(frame(link, &TMP112_FRAME)).await.unwrap();
    tx.send(frame(link, &truncated)).await.unwrap();
    tx.send(frame(link, &[0xAA, 0x20])).await.unwrap();
    drop(tx);

    run_collector(
        rx,
        decoder,
        buffer.clone(),
        state.clone(),
        CancellationToken::new(),
    )
    .await;

    let records = buffer.take(10).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(&*records[0].name, "metsense_tmp112");
    assert_eq!(records[0].link, link);
    assert!(records[0].valid);
    let measurement = records[0].reading.measurement().unwrap();
    assert_eq!(measurement.value.as_f64(), Some(25.0));

    let stats = state.snapshot().await;
    assert_eq!(stats.frames_accepted, 1);
    assert_eq!(stats.frames_rejected, 2);
    assert_eq!(stats.measurements_buffered, 1);
}

#[tokio::test]
async fn unknown_sensor_is_buffered_raw_and_flagged() {
    let decoder = Arc::new(Decoder::builtin().unwrap());
    let buffer = MeasurementBuffer::default();
    let state = DispatchState::new();
    let (tx, rx) = mpsc::channel(8);

    let packet = Packet::new(
        2,
        vec![
            Subpacket::new(0x01, true, &[0x0C, 0x80]).unwrap(),
            Subpacket::new(0xFE, true, &[0xDE, 0xAD]).unwrap(),
        ],
    )
    .unwrap();
    tx.send(frame(LinkId(Ulid::new()), &packet.to_bytes()))
        .await
        .unwrap();
    drop(tx);

    run_collector(rx, decoder, buffer.clone(), state.clone(), CancellationToken::new()).await;

    let records = buffer.take(10).unwrap();
    assert_eq!(records.len(), 2);

    let raw = &records[1];
    assert_eq!(&*raw.name, "sensor_254");
    assert!(!raw.valid);
    assert_eq!(
        raw.reading,
        Reading::Raw(Value::Bytes(Box::new([0xDE, 0xAD])))
    );

    let stats = state.snapshot().await;
    assert_eq!(stats.frames_accepted, 1);
    assert_eq!(stats.subpacket_errors, 1);
}

#[tokio::test]
async fn mock_boards_flow_through_to_publisher() {
    let decoder = Arc::new(Decoder::builtin().unwrap());
    let buffer = MeasurementBuffer::default();
    let state = DispatchState::new();
    let publisher = MemoryPublisher::default();
    let cancel = CancellationToken::new();

    let receiver = MockEdgeReceiver::new(10, 2, state.clone());
    let edge_rx = receiver.start(cancel.clone()).await.unwrap();

    let collector = tokio::spawn(run_collector(
        edge_rx,
        decoder,
        buffer.clone(),
        state.clone(),
        cancel.clone(),
    ));
    let publisher_task = tokio::spawn(run_publisher(
        buffer.clone(),
        publisher.clone(),
        "0000000000000042".to_owned(),
        PublishSchedule::new(Duration::from_millis(20), 1000),
        state.clone(),
        cancel.clone(),
    ));

    wait_until(|| {
        let publisher = publisher.clone();
        async move { publisher.measurement_count().unwrap() > 0 }
    })
    .await;

    cancel.cancel();
    collector.await.unwrap();
    publisher_task.await.unwrap();

    let batches = publisher.batches().unwrap();
    assert!(batches.iter().all(|b| &*b.sender_id == "0000000000000042"));

    let links = receiver.links();
    let records: Vec<&MeasurementRecord> =
        batches.iter().flat_map(|b| b.measurements.iter()).collect();
    assert!(records.iter().all(|r| links.contains(&r.link)));
    assert!(records.iter().any(|r| &*r.name == "chemsense_irr"));

    let stats = state.snapshot().await;
    assert!(stats.frames_accepted > 0);
    assert_eq!(stats.frames_rejected, 0);
    assert_eq!(stats.measurements_published as usize, records.len());
}

#[tokio::test]
async fn failed_publishes_are_retried_in_order() {
    let buffer = MeasurementBuffer::default();
    let state = DispatchState::new();
    let publisher = MemoryPublisher::default();
    let cancel = CancellationToken::new();

    let names = ["a", "b", "c", "d", "e"];
    fill(&buffer, &names);

    publisher.fail_next(2);
    let schedule = PublishSchedule {
        interval: Duration::from_millis(10),
        max_batch: 3,
        initial_backoff: Duration::from_millis(5),
        max_backoff: Duration::from_millis(20),
    };
    let task = tokio::spawn(run_publisher(
        buffer.clone(),
        publisher.clone(),
        "1".to_owned(),
        schedule,
        state.clone(),
        cancel.clone(),
    ));

    wait_until(|| {
        let publisher = publisher.clone();
        async move { publisher.measurement_count().unwrap() == 5 }
    })
    .await;
    cancel.cancel();
    task.await.unwrap();

    let batches = publisher.batches().unwrap();
    assert_eq!(batches.len(), 2);
    let published: Vec<&str> = batches
        .iter()
        .flat_map(|b| b.measurements.iter().map(|r| &*r.name))
        .collect();
    assert_eq!(published, names);

    let stats = state.snapshot().await;
    assert_eq!(stats.publish_failures, 2);
    assert_eq!(stats.batches_published, 2);
    assert!(buffer.is_empty().unwrap());
}

#[tokio::test]
async fn collector_drains_queued_frames_on_cancel() {
    let decoder = Arc::new(Decoder::builtin().unwrap());
    let buffer = MeasurementBuffer::default();
    let state = DispatchState::new();
    let (tx, rx) = mpsc::channel(8);

    let link = LinkId(Ulid::new());
    for _ in 0..3 {
        tx.send(frame(link, &TMP112_FRAME)).await.unwrap();
    }

    run_collector(rx, decoder, buffer.clone(), state.clone(), cancelled()).await;

    assert_eq!(buffer.len().unwrap(), 3);
    assert_eq!(state.snapshot().await.frames_accepted, 3);
    assert!(tx.is_closed());
}

#[tokio::test]
async fn shutdown_flushes_every_batch() {
    let buffer = MeasurementBuffer::default();
    let state = DispatchState::new();
    let publisher = MemoryPublisher::default();

    let names = ["a", "b", "c", "d", "e"];
    fill(&buffer, &names);

    run_publisher(
        buffer.clone(),
        publisher.clone(),
        "1".to_owned(),
        PublishSchedule::new(Duration::from_secs(60), 2),
        state.clone(),
        cancelled(),
    )
    .await;

    let batches = publisher.batches().unwrap();
    assert_eq!(batches.len(), 3);
    assert!(batches.iter().all(|b| b.len() <= 2));
    let published: Vec<&str> = batches
        .iter()
        .flat_map(|b| b.measurements.iter().map(|r| &*r.name))
        .collect();
    assert_eq!(published, names);
    assert!(buffer.is_empty().unwrap());
    assert_eq!(state.snapshot().await.measurements_published, 5);
}

#[tokio::test]
async fn shutdown_keeps_records_the_sink_rejects() {
    let buffer = MeasurementBuffer::default();
    let state = DispatchState::new();
    let publisher = MemoryPublisher::default();
    publisher.fail_next(10);

    fill(&buffer, &["a", "b", "c"]);

    run_publisher(
        buffer.clone(),
        publisher.clone(),
        "1".to_owned(),
        PublishSchedule::new(Duration::from_secs(60), 2),
        state.clone(),
        cancelled(),
    )
    .await;

    assert!(publisher.batches().unwrap().is_empty());
    let kept: Vec<String> = buffer
        .take(10)
        .unwrap()
        .into_iter()
        .map(|r| r.name.into())
        .collect();
    assert_eq!(kept, ["a", "b", "c"]);
    assert!(state.snapshot().await.publish_failures >= 1);
}

#[tokio::test]
async fn tcp_receiver_resyncs_after_noise() {
    let addr = free_port();
    let state = DispatchState::new();
    let cancel = CancellationToken::new();

    let receiver = TcpEdgeReceiver::new(addr, state.clone());
    let mut rx = receiver.start(cancel.clone()).await.unwrap();

    let mut corrupted = TMP112_FRAME;
    corrupted[7] = 0x00;

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(&[0x13, 0x37]).await.unwrap();
    stream.write_all(&corrupted).await.unwrap();
    // Split a good frame across writes.
    stream.write_all(&TMP112_FRAME[..4]).await.unwrap();
    stream.flush().await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    stream.write_all(&TMP112_FRAME[4..]).await.unwrap();

    let received = tokio::time::timeout(WAIT, rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(&*received.bytes, &TMP112_FRAME);
    assert_eq!(state.connected_count().await, 1);
    assert_eq!(state.snapshot().await.frames_rejected, 1);

    drop(stream);
    wait_until(|| {
        let state = state.clone();
        async move { state.connected_count().await == 0 }
    })
    .await;

    cancel.cancel();
}

async fn http_get(addr: std::net::SocketAddr, path: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let request = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n");
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();
    response
}

#[tokio::test]
async fn http_routes_serve_health_and_stats() {
    let state = DispatchState::new();
    state.frame_accepted(3, 1).await;
    state.frame_rejected().await;

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, http::router(state)).await });

    let health = http_get(addr, "/health").await;
    assert!(health.starts_with("HTTP/1.1 200"));
    assert!(health.ends_with("OK"));

    let stats = http_get(addr, "/stats").await;
    let body = stats.split("\r\n\r\n").nth(1).unwrap();
    let json: serde_json::Value = serde_json::from_str(body).unwrap();
    assert_eq!(json["frames_accepted"], 1);
    assert_eq!(json["frames_rejected"], 1);
    assert_eq!(json["subpacket_errors"], 1);
    assert_eq!(json["measurements_buffered"], 3);
}
