//! Pipeline behavior against a scripted in-memory server.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use qdt_client::pipeline::{CommandOutcome, Pipeline, TransferOptions};
use qdt_core::Error;
use qdt_core::progress::{ProgressEvent, ReporterOutcome};
use qdt_core::protocol::Command;
use qdt_core::rate::RateLimit;
use qdt_test_utils::{
    FailingReader, FailingWriter, RecordingCallback, ServerScript, StalledWriter, mock_stream_pair,
};

fn pipeline(limit: RateLimit, recorder: &RecordingCallback) -> Pipeline {
    let options = TransferOptions {
        limit,
        ..TransferOptions::default()
    };
    Pipeline::new(options).with_callback(Arc::new(recorder.clone()))
}

fn assert_non_decreasing(values: &[f64]) {
    for pair in values.windows(2) {
        assert!(pair[0] <= pair[1], "percent went backwards: {:?}", values);
    }
}

#[tokio::test]
async fn test_unlimited_download_of_ten_mebibytes() {
    let body: Vec<u8> = (0..10 * 1024 * 1024).map(|i| (i % 251) as u8).collect();
    let (mut send, recv, server) = mock_stream_pair(ServerScript::file(body.clone()));
    let recorder = RecordingCallback::new();

    let mut dest = Vec::new();
    let result = pipeline(RateLimit::UNLIMITED, &recorder)
        .download(&mut send, recv, "big.bin", &mut dest)
        .await
        .unwrap();

    assert_eq!(server.await.unwrap(), "get big.bin");
    assert_eq!(result.bytes, 10_485_760);
    assert_eq!(dest.len(), 10_485_760);
    assert!(dest == body);
    assert_eq!(result.reporter, ReporterOutcome::Completed);

    let percentages = recorder.percentages();
    assert_non_decreasing(&percentages);
    assert_eq!(percentages.last(), Some(&100.0));
    assert_eq!(recorder.completions(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_limited_download_takes_at_least_declared_over_limit() {
    let (mut send, recv, _server) = mock_stream_pair(ServerScript::file(vec![9u8; 5120]));
    let recorder = RecordingCallback::new();

    let start = Instant::now();
    let mut dest = Vec::new();
    let result = pipeline(RateLimit::bytes_per_second(1024), &recorder)
        .download(&mut send, recv, "slow.bin", &mut dest)
        .await
        .unwrap();

    assert!(start.elapsed() >= Duration::from_secs(5));
    assert_eq!(result.bytes, 5120);
    assert!(result.average_rate() <= 1024.0);

    // Roughly one sample per second before completion.
    let progress = recorder
        .events()
        .iter()
        .filter(|e| matches!(e, ProgressEvent::Progress(_)))
        .count();
    assert!((3..=5).contains(&progress), "{} progress events", progress);

    let percentages = recorder.percentages();
    assert_non_decreasing(&percentages);
    assert_eq!(recorder.completions(), 1);
}

#[tokio::test]
async fn test_listing_preserves_server_order() {
    let (mut send, recv, server) = mock_stream_pair(ServerScript::listing(["a.txt", "b.txt"]));

    let mut out = Vec::new();
    let entries = Pipeline::new(TransferOptions::default())
        .list(&mut send, recv, &mut out)
        .await
        .unwrap();

    assert_eq!(server.await.unwrap(), "ls");
    assert_eq!(entries, 2);
    assert_eq!(String::from_utf8(out).unwrap(), "a.txt\nb.txt\n");
}

#[tokio::test]
async fn test_empty_listing() {
    let (mut send, recv, _server) = mock_stream_pair(ServerScript::Listing(Vec::new()));

    let mut out = Vec::new();
    let entries = Pipeline::new(TransferOptions::default())
        .list(&mut send, recv, &mut out)
        .await
        .unwrap();

    assert_eq!(entries, 0);
    assert!(out.is_empty());
}

#[tokio::test]
async fn test_listing_relays_non_utf8_entries() {
    let raw = b"a.txt\ncaf\xe9.txt\nz.txt\n".to_vec();
    let (mut send, recv, _server) = mock_stream_pair(ServerScript::Raw(raw.clone()));

    let mut out = Vec::new();
    let entries = Pipeline::new(TransferOptions::default())
        .list(&mut send, recv, &mut out)
        .await
        .unwrap();

    assert_eq!(entries, 3);
    assert_eq!(out, raw);
}

#[tokio::test]
async fn test_listing_stream_error_keeps_relayed_entries() {
    let mut send = Vec::new();
    let mut out = Vec::new();
    let err = Pipeline::new(TransferOptions::default())
        .list(&mut send, FailingReader::new(&b"a.txt\nb.txt\n"[..]), &mut out)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Stream { .. }), "{:?}", err);
    assert_ne!(err.exit_code(), 0);
    assert_eq!(out, b"a.txt\nb.txt\n");
}

#[tokio::test]
async fn test_destination_write_failure_is_local_io() {
    let (mut send, recv, _server) = mock_stream_pair(ServerScript::file(vec![7u8; 100]));
    let recorder = RecordingCallback::new();

    let err = pipeline(RateLimit::UNLIMITED, &recorder)
        .download(&mut send, recv, "full.bin", &mut FailingWriter)
        .await
        .unwrap_err();

    match &err {
        Error::LocalIo { source, .. } => assert_eq!(source.to_string(), "disk full"),
        other => panic!("expected local io error, got {:?}", other),
    }
    assert_ne!(err.exit_code(), 0);
    // Every byte was read, but none reached the destination.
    assert!(recorder.events().contains(&ProgressEvent::Aborted {
        bytes: 100,
        total: 100
    }));
    assert_eq!(recorder.completions(), 0);
}

#[tokio::test]
async fn test_short_payload_is_truncation() {
    let script = ServerScript::Payload {
        declared: 100,
        body: vec![1u8; 90],
    };
    let (mut send, recv, _server) = mock_stream_pair(script);
    let recorder = RecordingCallback::new();

    let mut dest = Vec::new();
    let err = pipeline(RateLimit::UNLIMITED, &recorder)
        .download(&mut send, recv, "report.bin", &mut dest)
        .await
        .unwrap_err();

    match &err {
        Error::TruncatedTransfer { expected, received } => {
            assert_eq!(*expected, 100);
            assert_eq!(*received, 90);
        }
        other => panic!("expected truncation, got {:?}", other),
    }
    assert_ne!(err.exit_code(), 0);
    assert_eq!(dest.len(), 90);
    assert!(recorder.aborted());
    assert_eq!(recorder.completions(), 0);
}

#[tokio::test]
async fn test_empty_file_completes_immediately() {
    let (mut send, recv, _server) = mock_stream_pair(ServerScript::file(Vec::new()));
    let recorder = RecordingCallback::new();

    let mut dest = Vec::new();
    let result = pipeline(RateLimit::UNLIMITED, &recorder)
        .download(&mut send, recv, "empty.bin", &mut dest)
        .await
        .unwrap();

    assert_eq!(result.bytes, 0);
    assert!(dest.is_empty());
    assert_eq!(result.reporter, ReporterOutcome::Completed);

    let events = recorder.events();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0], ProgressEvent::Started { total: 0 });
    assert!(matches!(events[1], ProgressEvent::Completed { total: 0, .. }));
}

#[tokio::test]
async fn test_extra_bytes_beyond_declared_are_not_written() {
    let script = ServerScript::Payload {
        declared: 4,
        body: b"abcdefgh".to_vec(),
    };
    let (mut send, recv, _server) = mock_stream_pair(script);

    let mut dest = Vec::new();
    let result = Pipeline::new(TransferOptions::default())
        .download(&mut send, recv, "f", &mut dest)
        .await
        .unwrap();

    assert_eq!(result.bytes, 4);
    assert_eq!(dest, b"abcd");
}

#[tokio::test]
async fn test_unparseable_size_line_is_protocol_error() {
    let (mut send, recv, _server) = mock_stream_pair(ServerScript::Raw(b"lots\npayload".to_vec()));

    let mut dest = Vec::new();
    let err = Pipeline::new(TransferOptions::default())
        .download(&mut send, recv, "f", &mut dest)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Protocol { .. }), "{:?}", err);
    assert!(dest.is_empty());
}

#[tokio::test]
async fn test_missing_size_line_is_protocol_error() {
    let (mut send, recv, _server) = mock_stream_pair(ServerScript::Raw(Vec::new()));

    let mut dest = Vec::new();
    let err = Pipeline::new(TransferOptions::default())
        .download(&mut send, recv, "f", &mut dest)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Protocol { .. }), "{:?}", err);
}

#[tokio::test]
async fn test_cancellation_unblocks_stalled_download() {
    let script = ServerScript::Stall {
        declared: 1000,
        body: vec![0u8; 10],
    };
    let (mut send, recv, server) = mock_stream_pair(script);
    let recorder = RecordingCallback::new();
    let pipeline = pipeline(RateLimit::UNLIMITED, &recorder);

    let cancel = pipeline.cancel_token();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
    });

    let mut dest = Vec::new();
    let err = pipeline
        .download(&mut send, recv, "stuck.bin", &mut dest)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Cancelled));
    assert_eq!(err.exit_code(), 130);
    assert_eq!(dest.len(), 10);
    assert!(recorder.aborted());

    // Releasing the client side lets the server finish.
    drop(send);
    assert_eq!(server.await.unwrap(), "get stuck.bin");
}

#[tokio::test]
async fn test_cancellation_after_last_read_aborts_progress() {
    let (mut send, recv, _server) = mock_stream_pair(ServerScript::file(vec![3u8; 100]));
    let recorder = RecordingCallback::new();
    let pipeline = pipeline(RateLimit::UNLIMITED, &recorder);

    let cancel = pipeline.cancel_token();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
    });

    let err = pipeline
        .download(&mut send, recv, "held.bin", &mut StalledWriter)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Cancelled));
    assert!(recorder.aborted());
    assert_eq!(recorder.completions(), 0);
}

#[tokio::test]
async fn test_cancellation_unblocks_stalled_command_write() {
    let recorder = RecordingCallback::new();
    let pipeline = pipeline(RateLimit::UNLIMITED, &recorder);

    let cancel = pipeline.cancel_token();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
    });

    let mut out = Vec::new();
    let err = pipeline
        .list(&mut StalledWriter, &b"a.txt\n"[..], &mut out)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Cancelled));
    assert!(out.is_empty());
    assert!(recorder.events().is_empty());
}

#[tokio::test]
async fn test_execute_dispatches_by_verb() {
    let (mut send, recv, _server) = mock_stream_pair(ServerScript::file(b"xyz".to_vec()));
    let command = Command::get("x").unwrap();

    let mut dest = Vec::new();
    let outcome = Pipeline::new(TransferOptions::default())
        .execute(&command, &mut send, recv, &mut dest)
        .await
        .unwrap();

    match outcome {
        CommandOutcome::Downloaded(result) => assert_eq!(result.bytes, 3),
        other => panic!("expected download, got {:?}", other),
    }

    let (mut send, recv, _server) = mock_stream_pair(ServerScript::listing(["only"]));
    let mut out = Vec::new();
    let outcome = Pipeline::new(TransferOptions::default())
        .execute(&Command::list(), &mut send, recv, &mut out)
        .await
        .unwrap();
    assert_eq!(outcome, CommandOutcome::Listed { entries: 1 });
    assert_eq!(out, b"only\n");
}
