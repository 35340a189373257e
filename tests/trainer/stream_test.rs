//! Tests for the stream reader feeding the progress store.

use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tracing::Level;
use tracing_subscriber::prelude::*;
use trainwatch::render::{trainer_output_targets, LogTail, TailLayer};
use trainwatch::supervisor::{ProgressSample, ProgressStore};
use trainwatch::trainer::{DecodedEvent, StreamReader};

fn samples(pairs: &[(u64, f64)]) -> Vec<ProgressSample> {
    pairs
        .iter()
        .map(|&(e, m)| ProgressSample::new(e, m))
        .collect()
}

#[tokio::test]
async fn scenario_metrics_then_done() {
    let store = ProgressStore::new();
    let source = tokio_test::io::Builder::new()
        .read(b"LOSS:0,0.5\nLOSS:1,0.25\nTRAINING_DONE\n")
        .build();

    let summary = StreamReader::new(store.clone()).run(source).await;

    let snapshot = store.snapshot();
    assert_eq!(snapshot.samples, samples(&[(0, 0.5), (1, 0.25)]));
    assert!(snapshot.finished);
    assert_eq!(summary.samples, 2);
    assert_eq!(summary.completions, 1);
    assert_eq!(summary.lines, 3);
}

#[tokio::test]
async fn scenario_bad_lines_are_skipped() {
    let store = ProgressStore::new();
    let source = tokio_test::io::Builder::new()
        .read(b"garbage\nLOSS:1,notanumber\nLOSS:2,0.1\n")
        .build();

    let summary = StreamReader::new(store.clone()).run(source).await;

    let snapshot = store.snapshot();
    assert_eq!(snapshot.samples, samples(&[(2, 0.1)]));
    assert!(!snapshot.finished);
    assert_eq!(summary.malformed, 1);
    assert_eq!(summary.unrecognized, 1);
    assert_eq!(summary.diagnostics(), 2);
}

#[tokio::test]
async fn scenario_done_without_samples() {
    let store = ProgressStore::new();
    let source = tokio_test::io::Builder::new().read(b"TRAINING_DONE\n").build();

    StreamReader::new(store.clone()).run(source).await;

    let snapshot = store.snapshot();
    assert!(snapshot.samples.is_empty());
    assert!(snapshot.finished);
}

#[tokio::test]
async fn scenario_stream_closes_without_done() {
    let store = ProgressStore::new();
    let source = tokio_test::io::Builder::new()
        .read(b"LOSS:1,0.3\nLOSS:2,0.2\n")
        .build();

    let summary = StreamReader::new(store.clone()).run(source).await;

    assert_eq!(store.len(), 2);
    assert!(!store.is_finished());
    assert_eq!(summary.completions, 0);
    assert!(summary.io_error.is_none());
}

#[tokio::test]
async fn lines_split_across_reads_are_joined() {
    let store = ProgressStore::new();
    let source = tokio_test::io::Builder::new()
        .read(b"LOSS:1")
        .read(b"2,0.0")
        .read(b"5\nTRAINING_")
        .read(b"DONE")
        .build();

    StreamReader::new(store.clone()).run(source).await;

    assert_eq!(store.snapshot().samples, samples(&[(12, 0.05)]));
    assert!(store.is_finished());
}

#[tokio::test]
async fn crlf_terminated_lines() {
    let store = ProgressStore::new();
    let source = tokio_test::io::Builder::new()
        .read(b"LOSS:1,0.5\r\nTRAINING_DONE\r\n")
        .build();

    StreamReader::new(store.clone()).run(source).await;

    assert_eq!(store.snapshot().samples, samples(&[(1, 0.5)]));
    assert!(store.is_finished());
}

#[tokio::test]
async fn invalid_utf8_does_not_stop_reader() {
    let store = ProgressStore::new();
    let source = tokio_test::io::Builder::new()
        .read(b"\xff\xfe binary noise\nLOSS:3,0.75\n")
        .build();

    let summary = StreamReader::new(store.clone()).run(source).await;

    assert_eq!(summary.unrecognized, 1);
    assert_eq!(store.snapshot().samples, samples(&[(3, 0.75)]));
}

#[tokio::test]
async fn read_error_ends_stream() {
    let store = ProgressStore::new();
    let source = tokio_test::io::Builder::new()
        .read(b"LOSS:1,0.5\n")
        .read_error(std::io::Error::new(std::io::ErrorKind::Other, "pipe broke"))
        .build();

    let summary = StreamReader::new(store.clone()).run(source).await;

    assert_eq!(store.len(), 1);
    assert!(summary.io_error.unwrap().contains("pipe broke"));
}

#[tokio::test]
async fn out_of_order_epochs_are_kept_in_arrival_order() {
    let store = ProgressStore::new();
    let source = tokio_test::io::Builder::new()
        .read(b"LOSS:5,0.1\nLOSS:2,0.4\nLOSS:5,0.09\n")
        .build();

    StreamReader::new(store.clone()).run(source).await;

    assert_eq!(
        store.snapshot().samples,
        samples(&[(5, 0.1), (2, 0.4), (5, 0.09)])
    );
}

#[tokio::test]
async fn repeated_done_keeps_samples() {
    let store = ProgressStore::new();
    let source = tokio_test::io::Builder::new()
        .read(b"LOSS:1,0.5\nTRAINING_DONE\nTRAINING_DONE\n")
        .build();

    let summary = StreamReader::new(store.clone()).run(source).await;

    assert_eq!(summary.completions, 2);
    assert!(store.is_finished());
    assert_eq!(store.len(), 1);
}

#[test]
fn handle_line_malformed_leaves_store_untouched() {
    let store = ProgressStore::new();
    let mut reader = StreamReader::new(store.clone());

    let event = reader.handle_line("LOSS:1,2,3");

    assert!(matches!(event, DecodedEvent::Malformed { .. }));
    assert!(store.is_empty());
    assert_eq!(reader.summary().malformed, 1);
}

#[test]
fn handle_line_unrecognized_leaves_store_untouched() {
    let store = ProgressStore::new();
    let mut reader = StreamReader::new(store.clone());

    reader.handle_line("Epoch   1/100  -  Loss (MSE): 0.9");

    assert_eq!(store.snapshot(), Default::default());
}

#[tokio::test]
async fn spawned_reader_sees_writes_as_they_arrive() {
    let store = ProgressStore::new();
    let (reader, mut writer) = tokio::io::duplex(64);
    let handle = StreamReader::new(store.clone()).spawn(reader);

    writer.write_all(b"LOSS:0,0.9\n").await.unwrap();
    tokio::time::timeout(Duration::from_secs(2), async {
        while store.is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("first sample never arrived");
    assert!(!store.is_finished());

    writer.write_all(b"TRAINING_DONE\n").await.unwrap();
    drop(writer);

    let summary = handle.await.unwrap();
    assert_eq!(summary.samples, 1);
    assert!(store.is_finished());
}

#[test]
fn scenario_bad_lines_emit_two_diagnostics() {
    let tail = LogTail::default();
    let subscriber = tracing_subscriber::registry()
        .with(TailLayer::new(tail.clone()).with_filter(trainer_output_targets()));
    let store = ProgressStore::new();

    tracing::subscriber::with_default(subscriber, || {
        let mut reader = StreamReader::new(store.clone());
        for line in ["garbage", "LOSS:1,notanumber", "LOSS:2,0.1"] {
            reader.handle_line(line);
        }
    });

    let entries = tail.recent(10);
    let diagnostics: Vec<&str> = entries
        .iter()
        .filter(|e| !e.text.starts_with("Parsed metric update"))
        .map(|e| e.text.as_str())
        .collect();
    assert_eq!(diagnostics.len(), 2);
    assert!(diagnostics[0].contains("line=garbage"));
    assert!(diagnostics[1].contains("invalid metric"));
    assert!(diagnostics[1].contains("line=LOSS:1,notanumber"));

    let update = entries.last().unwrap();
    assert_eq!(update.level, Level::INFO);
    assert!(update.text.contains("mse=0.100000000"));
    assert_eq!(store.snapshot().samples, samples(&[(2, 0.1)]));
}
