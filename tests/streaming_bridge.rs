//! End-to-end streaming tests: StreamingBridge over the local-file
//! transport, with a real consumer thread pulling against backpressure.

use bytes::BytesMut;
use mountstream::stream::{FileTransferConnector, StreamingBridge};
use mountstream::{Error, StreamTuning};
use std::io::Write;
use std::sync::Arc;
use std::thread;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

/// Deterministic non-trivial payload
fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

fn write_temp_file(bytes: &[u8]) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(bytes).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn test_file_stream_round_trip_with_backpressure() -> anyhow::Result<()> {
    init_tracing();

    let data = payload(200_000);
    let file = write_temp_file(&data);

    // Small high-water mark so the worker gets suspended and resumed many
    // times while the consumer drains
    let tuning = StreamTuning {
        preread_high_water: 8 * 1024,
        min_read: 512,
        max_read: 16 * 1024,
    };
    let bridge = Arc::new(StreamingBridge::new(
        Arc::new(FileTransferConnector::new(4096)),
        tuning,
    ));
    bridge.open(&format!("file://{}", file.path().display()))?;

    let consumer = {
        let bridge = Arc::clone(&bridge);
        thread::spawn(move || {
            let mut collected = BytesMut::new();
            loop {
                match bridge.read(16 * 1024) {
                    Ok(bytes) => collected.extend_from_slice(&bytes),
                    Err(Error::EndOfStream) => break,
                    Err(e) => panic!("stream failed: {:?}", e),
                }
            }
            collected.freeze()
        })
    };

    let collected = consumer.join().unwrap();
    assert_eq!(collected.len(), data.len());
    assert_eq!(&collected[..], &data[..]);
    assert_eq!(bridge.current_position(), data.len() as u64);
    assert_eq!(bridge.total_size(), data.len() as i64);
    Ok(())
}

#[test]
fn test_missing_file_surfaces_as_failed_read() -> anyhow::Result<()> {
    init_tracing();

    let bridge = StreamingBridge::new(
        Arc::new(FileTransferConnector::default()),
        StreamTuning::default(),
    );
    // The worker thread reports the open failure asynchronously; the read
    // must observe it instead of hanging
    bridge.open("/definitely/not/here.mp3")?;
    match bridge.read(4096) {
        Err(Error::Transfer(message)) => assert!(message.contains("not/here.mp3")),
        other => panic!("unexpected read result: {:?}", other),
    }
    Ok(())
}

#[test]
fn test_unsupported_scheme_rejected_at_open() {
    init_tracing();

    let bridge = StreamingBridge::new(
        Arc::new(FileTransferConnector::default()),
        StreamTuning::default(),
    );
    assert!(matches!(
        bridge.open("http://example.com/stream.mp3"),
        Err(Error::Transfer(_))
    ));
    assert!(!bridge.is_open());
}

#[test]
fn test_close_mid_stream_then_reopen() -> anyhow::Result<()> {
    init_tracing();

    let data = payload(100_000);
    let file = write_temp_file(&data);
    let url = format!("file://{}", file.path().display());

    let bridge = StreamingBridge::new(
        Arc::new(FileTransferConnector::new(4096)),
        StreamTuning::default(),
    );

    bridge.open(&url)?;
    let first = bridge.read(8 * 1024)?;
    assert!(!first.is_empty());
    bridge.close();
    assert!(!bridge.is_open());
    assert!(matches!(bridge.read(4096), Err(Error::NotOpen)));

    // A fresh transfer starts over from the beginning
    bridge.open(&url)?;
    let again = bridge.read(8 * 1024)?;
    assert_eq!(&again[..], &data[..again.len()]);
    assert_eq!(bridge.current_position(), again.len() as u64);
    Ok(())
}
