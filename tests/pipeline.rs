//! End-to-end tests: raw bytes in through the link reader, files and
//! position updates out of the decoder.

use std::sync::Arc;
use std::time::Duration;

use dsc_capture::link::{LinkEvent, spawn_reader};
use dsc_capture::{
    Decoder, DecoderStats, EventBus, PositionTrack, PositionUpdate, RecordStore, SharedBuffer,
    TrailingPolicy,
};
use tempfile::TempDir;
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, watch};

const TICK: Duration = Duration::from_millis(5);

async fn settle() {
    tokio::time::sleep(TICK * 10).await;
}

#[tokio::test]
async fn test_serial_bytes_to_call_files() {
    let tmp = TempDir::new().unwrap();
    let store = RecordStore::open(tmp.path()).unwrap();
    let bus = EventBus::new(16);
    let mut positions = bus.subscribe();
    let stats = Arc::new(DecoderStats::new());
    let buffer = SharedBuffer::new(TrailingPolicy::Discard);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (events_tx, mut events_rx) = mpsc::channel(4);

    let decoder = Decoder::new(store, bus, "COM3").with_stats(Arc::clone(&stats));
    let decoder_task = tokio::spawn(decoder.run(buffer.clone(), TICK, shutdown_rx.clone()));

    let (mut radio, port) = tokio::io::duplex(256);
    let reader_task = spawn_reader(
        port,
        buffer.clone(),
        Arc::clone(&stats),
        shutdown_rx,
        events_tx,
    );

    // First call arrives in pieces, split mid-field
    radio.write_all(b"\r\nIncoming Dis").await.unwrap();
    settle().await;
    radio.write_all(b"tress\r\nNature=112\r\nPos=5325.71N,").await.unwrap();
    settle().await;
    radio.write_all(b"01433.82E\r\n> ?").await.unwrap();
    settle().await;

    // Second call
    radio
        .write_all(b"Incoming Urgency\r\nCat=110\r\nEos=117\r\n> ?")
        .await
        .unwrap();
    settle().await;

    drop(radio);
    assert_eq!(
        events_rx.recv().await,
        Some(LinkEvent::Closed("End of stream".to_string()))
    );
    reader_task.await.unwrap();

    shutdown_tx.send(true).unwrap();
    let decoder = decoder_task.await.unwrap();

    let files = decoder.store().list_records().unwrap();
    assert_eq!(files.len(), 2);
    let distress = files.iter().find(|f| f.starts_with("Distress ")).unwrap();
    let urgency = files.iter().find(|f| f.starts_with("Urgency ")).unwrap();
    assert!(distress.ends_with(".txt"));

    assert_eq!(
        decoder.store().read_record(distress).unwrap(),
        "Type: Distress\nNature: EPIRB emision\nPos: 5325.71N,01433.82E\n"
    );
    assert_eq!(
        decoder.store().read_record(urgency).unwrap(),
        "Type: Urgency\nCat: Urgency\nEos: RQ Acknowledge required\n"
    );

    let display = decoder.display().contents();
    assert_eq!(display.matches("------------------------------\n").count(), 2);
    assert!(display.find("Type: Distress").unwrap() < display.find("Type: Urgency").unwrap());

    assert_eq!(
        positions.recv().await.unwrap(),
        PositionUpdate {
            source: "COM3".to_string(),
            raw_lat: "5325.71N".to_string(),
            raw_long: "01433.82E".to_string(),
        }
    );

    let summary = stats.summary();
    assert_eq!(summary.frames_decoded, 2);
    assert_eq!(summary.files_written, 2);
    assert_eq!(summary.positions_published, 1);
    assert!(summary.bytes_received > 0);
}

#[tokio::test]
async fn test_frame_completed_at_shutdown_is_not_lost() {
    let tmp = TempDir::new().unwrap();
    let buffer = SharedBuffer::new(TrailingPolicy::Discard);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let decoder = Decoder::new(RecordStore::open(tmp.path()).unwrap(), EventBus::default(), "t");
    // Long tick so only the final drain can pick the frame up
    let decoder_task = tokio::spawn(decoder.run(
        buffer.clone(),
        Duration::from_secs(3600),
        shutdown_rx,
    ));
    tokio::task::yield_now().await;

    buffer.append("Incoming Safety\r\nCat=108\r\n> ?");
    shutdown_tx.send(true).unwrap();

    let decoder = decoder_task.await.unwrap();
    assert_eq!(decoder.store().list_records().unwrap().len(), 1);
    assert!(decoder.display().contents().contains("Cat: Safety"));
}

#[tokio::test]
async fn test_position_track_follows_bus() {
    let tmp = TempDir::new().unwrap();
    let bus = EventBus::new(8);
    let track = Arc::new(PositionTrack::new());
    let follower = {
        let track = Arc::clone(&track);
        let rx = bus.subscribe();
        tokio::spawn(async move { track.follow(rx).await })
    };

    let decoder = Decoder::new(RecordStore::open(tmp.path()).unwrap(), bus, "COM3");
    let buffer = SharedBuffer::new(TrailingPolicy::Discard);
    buffer.append("Incoming Distress\r\nPos=5325.71N,01433.82W\r\n> ?");
    assert_eq!(decoder.decode_pending(&buffer), 1);

    // Dropping the decoder drops the last sender and ends the follower
    drop(decoder);
    follower.await.unwrap();

    let latest = track.latest().unwrap();
    assert_eq!(latest.source, "COM3");
    assert!((latest.position.latitude_degrees - (53.0 + 25.71 / 60.0)).abs() < 1e-9);
    assert!((latest.position.longitude_degrees + (14.0 + 33.82 / 60.0)).abs() < 1e-9);
}
