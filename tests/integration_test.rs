mod common;

use common::{DropRule, RangeServer, ServerOptions, payload};
use splitfetch::{
    DownloadError, DownloadOutcome, DownloadTask, Downloader, Phase, RetryPolicy, WorkerStatus,
};
use std::time::Duration;
use tempfile::tempdir;
use tokio_util::sync::CancellationToken;

fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        initial_backoff: Duration::from_millis(5),
        max_backoff: Duration::from_millis(20),
    }
}

fn downloader(max_attempts: u32) -> Downloader {
    Downloader::new(reqwest::Client::new()).with_retry_policy(fast_retry(max_attempts))
}

#[tokio::test]
async fn test_end_to_end_four_workers() {
    let body = payload(1000);
    let server = RangeServer::start(body.clone(), ServerOptions::default()).await;
    let dir = tempdir().unwrap();

    let task = DownloadTask::new(server.url("/data/sample.bin"))
        .with_destination(dir.path())
        .with_workers(4);
    let downloader = downloader(3);
    let phases = downloader.subscribe();

    let outcome = downloader.run(&task, CancellationToken::new()).await;

    let (path, bytes_written) = match outcome {
        DownloadOutcome::Completed {
            path,
            bytes_written,
            ..
        } => (path, bytes_written),
        other => panic!("download did not complete: {other:?}"),
    };
    assert_eq!(bytes_written, 1000);
    assert_eq!(path, dir.path().join("sample.bin"));
    assert_eq!(std::fs::read(&path).unwrap(), body);

    assert_eq!(
        server.ranged_gets(),
        vec![(0, 249), (250, 499), (500, 749), (750, 999)]
    );
    assert_eq!(*phases.borrow(), Phase::Completed);

    let snapshot = downloader.progress().snapshot();
    assert_eq!(snapshot.len(), 4);
    assert!(
        snapshot
            .iter()
            .all(|w| w.status == WorkerStatus::Completed && w.percent == 100)
    );
}

#[tokio::test]
async fn test_dropped_stream_resumes_from_last_written_byte() {
    let body = payload(1000);
    // Worker 2 owns [500, 750); its first response dies halfway through.
    let server = RangeServer::start(
        body.clone(),
        ServerOptions {
            drop: Some(DropRule {
                starts: vec![500],
                after: 125,
                times: 1,
            }),
            ..ServerOptions::default()
        },
    )
    .await;
    let dir = tempdir().unwrap();

    let task = DownloadTask::new(server.url("/resume.bin"))
        .with_destination(dir.path())
        .with_workers(4);
    let outcome = downloader(3).run(&task, CancellationToken::new()).await;

    assert!(outcome.is_success(), "{outcome:?}");
    assert_eq!(
        server.ranged_gets(),
        vec![(0, 249), (250, 499), (500, 749), (625, 749), (750, 999)]
    );

    // No duplicated or skipped bytes anywhere in the file.
    let written = std::fs::read(dir.path().join("resume.bin")).unwrap();
    assert_eq!(written.len(), body.len());
    assert_eq!(written, body);
}

#[tokio::test]
async fn test_exhausted_worker_fails_but_siblings_finish() {
    let body = payload(1000);
    let server = RangeServer::start(
        body.clone(),
        ServerOptions {
            drop: Some(DropRule {
                starts: vec![500],
                after: 0,
                times: usize::MAX,
            }),
            ..ServerOptions::default()
        },
    )
    .await;
    let dir = tempdir().unwrap();

    let task = DownloadTask::new(server.url("/broken.bin"))
        .with_destination(dir.path())
        .with_workers(4);
    let downloader = downloader(3);
    let outcome = downloader.run(&task, CancellationToken::new()).await;

    match outcome {
        DownloadOutcome::Failed {
            worker: Some(2),
            error:
                DownloadError::WorkerFailed {
                    index: 2,
                    attempts: 3,
                    ..
                },
            ..
        } => {}
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(downloader.phase(), Phase::Failed);

    // The partial file stays, with every other range intact.
    let written = std::fs::read(dir.path().join("broken.bin")).unwrap();
    assert_eq!(written.len(), 1000);
    assert_eq!(written[..500], body[..500]);
    assert_eq!(written[750..], body[750..]);

    let statuses: Vec<_> = downloader
        .progress()
        .snapshot()
        .into_iter()
        .map(|w| w.status)
        .collect();
    assert_eq!(
        statuses,
        vec![
            WorkerStatus::Completed,
            WorkerStatus::Completed,
            WorkerStatus::Failed,
            WorkerStatus::Completed
        ]
    );
}

#[tokio::test]
async fn test_lowest_failed_worker_is_reported() {
    let body = payload(1000);
    // Workers 3 and 1 both lose every connection.
    let server = RangeServer::start(
        body.clone(),
        ServerOptions {
            drop: Some(DropRule {
                starts: vec![750, 250],
                after: 0,
                times: usize::MAX,
            }),
            ..ServerOptions::default()
        },
    )
    .await;
    let dir = tempdir().unwrap();

    let task = DownloadTask::new(server.url("/twice.bin"))
        .with_destination(dir.path())
        .with_workers(4);
    let downloader = downloader(2);
    let outcome = downloader.run(&task, CancellationToken::new()).await;

    match outcome {
        DownloadOutcome::Failed {
            worker: Some(1),
            error:
                DownloadError::WorkerFailed {
                    index: 1,
                    attempts: 2,
                    ..
                },
            ..
        } => {}
        other => panic!("unexpected outcome: {other:?}"),
    }

    let statuses: Vec<_> = downloader
        .progress()
        .snapshot()
        .into_iter()
        .map(|w| w.status)
        .collect();
    assert_eq!(
        statuses,
        vec![
            WorkerStatus::Completed,
            WorkerStatus::Failed,
            WorkerStatus::Completed,
            WorkerStatus::Failed
        ]
    );

    let written = std::fs::read(dir.path().join("twice.bin")).unwrap();
    assert_eq!(written[..250], body[..250]);
    assert_eq!(written[500..750], body[500..750]);
}

#[tokio::test]
async fn test_missing_accept_ranges_creates_no_file() {
    let server = RangeServer::start(
        payload(100),
        ServerOptions {
            omit_accept_ranges: true,
            ..ServerOptions::default()
        },
    )
    .await;
    let dir = tempdir().unwrap();

    let task = DownloadTask::new(server.url("/plain.bin")).with_destination(dir.path());
    let outcome = downloader(3).run(&task, CancellationToken::new()).await;

    assert!(matches!(
        outcome,
        DownloadOutcome::Failed {
            worker: None,
            error: DownloadError::UnsupportedRange(_),
            ..
        }
    ));
    assert!(!dir.path().join("plain.bin").exists());
    assert!(server.ranged_gets().is_empty());
}

#[tokio::test]
async fn test_more_workers_than_bytes() {
    let body = payload(5);
    let server = RangeServer::start(body.clone(), ServerOptions::default()).await;
    let dir = tempdir().unwrap();

    let task = DownloadTask::new(server.url("/tiny.bin"))
        .with_destination(dir.path())
        .with_workers(7);
    let downloader = downloader(3);
    let outcome = downloader.run(&task, CancellationToken::new()).await;

    assert!(outcome.is_success(), "{outcome:?}");
    // Only the last worker has anything to fetch.
    assert_eq!(server.ranged_gets(), vec![(0, 4)]);
    assert_eq!(std::fs::read(dir.path().join("tiny.bin")).unwrap(), body);
    assert!(downloader.progress().snapshot().iter().all(|w| w.percent == 100));
}

#[tokio::test]
async fn test_empty_resource_yields_empty_file() {
    let server = RangeServer::start(Vec::new(), ServerOptions::default()).await;
    let dir = tempdir().unwrap();

    let task = DownloadTask::new(server.url("/empty.bin")).with_destination(dir.path());
    let outcome = downloader(3).run(&task, CancellationToken::new()).await;

    match outcome {
        DownloadOutcome::Completed { bytes_written, .. } => assert_eq!(bytes_written, 0),
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(
        std::fs::metadata(dir.path().join("empty.bin")).unwrap().len(),
        0
    );
    assert!(server.ranged_gets().is_empty());
}

#[tokio::test]
async fn test_file_name_override_and_nested_destination() {
    let body = payload(300);
    let server = RangeServer::start(body.clone(), ServerOptions::default()).await;
    let dir = tempdir().unwrap();
    let nested = dir.path().join("a").join("b");

    let task = DownloadTask::new(server.url("/original.bin"))
        .with_destination(&nested)
        .with_file_name("renamed.bin")
        .with_workers(3);
    let outcome = downloader(3).run(&task, CancellationToken::new()).await;

    assert!(outcome.is_success(), "{outcome:?}");
    assert_eq!(std::fs::read(nested.join("renamed.bin")).unwrap(), body);
    assert!(!nested.join("original.bin").exists());
}

#[tokio::test]
async fn test_cancellation_stops_all_workers() {
    let body = payload(256 * 1024);
    let server = RangeServer::start(
        body,
        ServerOptions {
            throttle: Some(Duration::from_millis(20)),
            ..ServerOptions::default()
        },
    )
    .await;
    let dir = tempdir().unwrap();

    let task = DownloadTask::new(server.url("/slow.bin"))
        .with_destination(dir.path())
        .with_workers(4);
    let downloader = downloader(3);
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        trigger.cancel();
    });

    let outcome = tokio::time::timeout(Duration::from_secs(5), downloader.run(&task, cancel))
        .await
        .expect("workers did not stop after cancellation");

    assert!(
        matches!(outcome, DownloadOutcome::Cancelled { .. }),
        "{outcome:?}"
    );
    assert_eq!(downloader.phase(), Phase::Cancelled);

    let tracker = downloader.progress();
    assert!(tracker.all_settled());
    assert!(
        tracker
            .snapshot()
            .iter()
            .all(|w| w.status == WorkerStatus::Cancelled)
    );
    assert!(tracker.total_written() < tracker.total_expected());

    // Every worker's connection was dropped rather than left streaming.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
    while server.aborted_connections() < 4 && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(server.aborted_connections() >= 4);

    // The partial file is still there and can be removed.
    std::fs::remove_file(dir.path().join("slow.bin")).unwrap();
}
