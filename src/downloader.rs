use crate::error::DownloadError;
use crate::planner;
use crate::probe;
use crate::progress::ProgressTracker;
use crate::state::{DownloadOutcome, DownloadTask};
use crate::utils;
use crate::worker::{RetryPolicy, WorkerContext, download_chunk};
use crate::writer::DestinationWriter;
use futures_util::future::join_all;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Where a run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Probing,
    Planning,
    Writing,
    Finalizing,
    Completed,
    Failed,
    Cancelled,
}

/// Drives one download from probe to closed file.
///
/// A `Downloader` runs one task at a time; its progress tracker and phase
/// channel describe the most recent run.
pub struct Downloader {
    client: reqwest::Client,
    retry: RetryPolicy,
    tracker: Arc<ProgressTracker>,
    phase: watch::Sender<Phase>,
}

impl Downloader {
    pub fn new(client: reqwest::Client) -> Self {
        let (phase, _) = watch::channel(Phase::Idle);
        Self {
            client,
            retry: RetryPolicy::default(),
            tracker: Arc::new(ProgressTracker::new()),
            phase,
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Live per-worker progress of the current run.
    pub fn progress(&self) -> Arc<ProgressTracker> {
        Arc::clone(&self.tracker)
    }

    pub fn subscribe(&self) -> watch::Receiver<Phase> {
        self.phase.subscribe()
    }

    pub fn phase(&self) -> Phase {
        *self.phase.borrow()
    }

    fn enter(&self, phase: Phase) {
        debug!(?phase, "entering phase");
        self.phase.send_replace(phase);
    }

    /// Runs `task` to completion and reports exactly one outcome.
    ///
    /// Every launched worker is joined before this returns, even after a failure
    /// or a cancellation. A partially written file is left on disk.
    pub async fn run(&self, task: &DownloadTask, cancel: CancellationToken) -> DownloadOutcome {
        let started = Instant::now();

        let outcome = match self.execute(task, &cancel, started).await {
            Ok(outcome) => outcome,
            Err(DownloadError::Cancelled) => DownloadOutcome::Cancelled {
                elapsed: started.elapsed(),
            },
            // Anything that stops a run before workers exist.
            Err(error) => DownloadOutcome::Failed {
                worker: None,
                error,
                elapsed: started.elapsed(),
            },
        };

        match &outcome {
            DownloadOutcome::Completed {
                path,
                bytes_written,
                elapsed,
            } => {
                info!(
                    path = %path.display(),
                    bytes = bytes_written,
                    "download completed in {:?}",
                    utils::round_millis(*elapsed)
                );
                self.enter(Phase::Completed);
            }
            DownloadOutcome::Failed { worker, error, .. } => {
                warn!(worker = ?worker, kind = error.kind(), error = %error, "download failed");
                self.enter(Phase::Failed);
            }
            DownloadOutcome::Cancelled { .. } => {
                info!("download cancelled");
                self.enter(Phase::Cancelled);
            }
        }

        outcome
    }

    async fn execute(
        &self,
        task: &DownloadTask,
        cancel: &CancellationToken,
        started: Instant,
    ) -> Result<DownloadOutcome, DownloadError> {
        task.validate()?;

        self.enter(Phase::Probing);
        info!(url = %task.url, "probing source");
        let meta = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(DownloadError::Cancelled),
            res = probe::probe(&self.client, &task.url) => res?,
        };
        info!(
            size = meta.total_size,
            name = %meta.file_name,
            "source supports ranges ({})",
            utils::format_bytes(meta.total_size)
        );

        self.enter(Phase::Planning);
        let path = task.output_path(&meta);
        let ranges = match planner::plan(meta.total_size, task.workers) {
            Ok(ranges) => ranges,
            // Nothing to split: the file is created empty and no worker runs.
            Err(DownloadError::InvalidPlan { total_size: 0, .. }) => Vec::new(),
            Err(e) => return Err(e),
        };

        if !task.dest_dir.as_os_str().is_empty() {
            tokio::fs::create_dir_all(&task.dest_dir).await?;
        }
        let writer = DestinationWriter::create(&path, meta.total_size).await?;

        let expected: Vec<u64> = ranges.iter().map(|r| r.len()).collect();
        let handles = self.tracker.reset(&expected);

        self.enter(Phase::Writing);
        info!(workers = ranges.len(), path = %path.display(), "download started");

        let ctx = WorkerContext {
            client: self.client.clone(),
            url: Arc::from(task.url.as_str()),
            writer: writer.clone(),
            retry: self.retry,
        };

        let tasks: Vec<_> = ranges
            .into_iter()
            .zip(handles)
            .map(|(range, progress)| {
                let ctx = ctx.clone();
                let token = cancel.clone();
                tokio::spawn(async move { download_chunk(&ctx, range, progress, &token).await })
            })
            .collect();
        drop(ctx);

        let results = join_all(tasks).await;

        self.enter(Phase::Finalizing);
        let closed = writer.close().await;

        Ok(self.settle(path, results, closed, meta.total_size, cancel, started))
    }

    /// Folds worker results into the run's outcome.
    fn settle(
        &self,
        path: PathBuf,
        results: Vec<Result<Result<u64, DownloadError>, tokio::task::JoinError>>,
        closed: std::io::Result<()>,
        total_size: u64,
        cancel: &CancellationToken,
        started: Instant,
    ) -> DownloadOutcome {
        let mut bytes_written = 0u64;
        let mut first_failure: Option<(usize, DownloadError)> = None;
        let mut cancelled = false;

        for (index, result) in results.into_iter().enumerate() {
            match result.map_err(DownloadError::from).and_then(|r| r) {
                Ok(n) => {
                    debug!(worker = index, bytes = n, "range written");
                    bytes_written += n;
                }
                Err(DownloadError::Cancelled) => cancelled = true,
                Err(e) => {
                    if first_failure.is_none() {
                        first_failure = Some((index, e));
                    }
                }
            }
        }

        let elapsed = started.elapsed();

        if cancelled || (first_failure.is_some() && cancel.is_cancelled()) {
            if let Err(e) = closed {
                warn!(error = %e, "failed to close partial file");
            }
            return DownloadOutcome::Cancelled { elapsed };
        }

        if let Some((index, error)) = first_failure {
            if let Err(e) = closed {
                warn!(error = %e, "failed to close partial file");
            }
            return DownloadOutcome::Failed {
                worker: Some(index),
                error,
                elapsed,
            };
        }

        if let Err(e) = closed {
            return DownloadOutcome::Failed {
                worker: None,
                error: DownloadError::Io(e),
                elapsed,
            };
        }

        debug_assert_eq!(bytes_written, total_size);
        DownloadOutcome::Completed {
            path,
            bytes_written,
            elapsed,
        }
    }
}
