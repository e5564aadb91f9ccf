use crate::error::DownloadError;
use crate::probe;
use crate::progress::WorkerProgress;
use crate::state::{ByteRange, WorkerStatus};
use crate::writer::DestinationWriter;
use reqwest::StatusCode;
use reqwest::header::RANGE;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// Largest slice handed to a single positional write.
pub const WRITE_CHUNK_SIZE: usize = 64 * 1024;

/// How often and how patiently a worker retries a transient failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per range, including the first one.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    /// Delay after the given failed attempt (1-based): doubles each time, capped.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// Everything a worker shares with its siblings.
#[derive(Clone)]
pub struct WorkerContext {
    pub client: reqwest::Client,
    pub url: Arc<str>,
    pub writer: DestinationWriter,
    pub retry: RetryPolicy,
}

/// Downloads one byte range into the shared output file.
///
/// The body is streamed and written at the worker's current offset as it
/// arrives. Transient failures resume from the first byte not yet written, so a
/// retry never rewrites or skips data. Returns the number of bytes written, which
/// always equals `range.len()` on success.
pub async fn download_chunk(
    ctx: &WorkerContext,
    range: ByteRange,
    progress: WorkerProgress,
    cancel: &CancellationToken,
) -> Result<u64, DownloadError> {
    let result = fetch_with_retries(ctx, range, &progress, cancel).await;

    progress.set_status(match &result {
        Ok(_) => WorkerStatus::Completed,
        Err(DownloadError::Cancelled) => WorkerStatus::Cancelled,
        Err(_) => WorkerStatus::Failed,
    });

    result
}

async fn fetch_with_retries(
    ctx: &WorkerContext,
    range: ByteRange,
    progress: &WorkerProgress,
    cancel: &CancellationToken,
) -> Result<u64, DownloadError> {
    if range.is_empty() {
        debug!(worker = range.index, "empty range, nothing to fetch");
        return Ok(0);
    }

    progress.set_status(WorkerStatus::Running);
    let mut written = 0u64;
    let mut attempt = 0u32;

    loop {
        if cancel.is_cancelled() {
            return Err(DownloadError::Cancelled);
        }
        attempt += 1;

        let err = match fetch_remaining(ctx, range, &mut written, progress, cancel).await {
            Ok(()) => {
                debug!(worker = range.index, bytes = written, attempt, "range complete");
                return Ok(written);
            }
            Err(e) => e,
        };

        if !err.is_retryable() {
            if !matches!(err, DownloadError::Cancelled) {
                error!(worker = range.index, error = %err, "range failed");
            }
            return Err(err);
        }

        if attempt >= ctx.retry.max_attempts {
            error!(worker = range.index, attempt, error = %err, "giving up on range");
            return Err(DownloadError::WorkerFailed {
                index: range.index,
                attempts: attempt,
                source: Box::new(err),
            });
        }

        let delay = ctx.retry.backoff(attempt);
        warn!(
            worker = range.index,
            attempt,
            resume_at = range.start + written,
            error = %err,
            "range interrupted, retrying in {:?}",
            delay
        );
        progress.set_status(WorkerStatus::Retrying);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(DownloadError::Cancelled),
            _ = sleep(delay) => {}
        }
        progress.set_status(WorkerStatus::Running);
    }
}

/// One ranged GET for the part of `range` not yet written.
///
/// `written` is advanced after every successful write, so on error it still
/// points at the first missing byte.
async fn fetch_remaining(
    ctx: &WorkerContext,
    range: ByteRange,
    written: &mut u64,
    progress: &WorkerProgress,
    cancel: &CancellationToken,
) -> Result<(), DownloadError> {
    let expected = range.len();
    let remaining = expected - *written;
    let range_header = range.header_from(*written);
    debug!(worker = range.index, range = %range_header, "requesting range");

    let request = ctx
        .client
        .get(&*ctx.url)
        .header(RANGE, range_header.as_str())
        .send();
    let mut response = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(DownloadError::Cancelled),
        res = request => res?,
    };

    if response.status() != StatusCode::PARTIAL_CONTENT {
        return Err(DownloadError::UnexpectedStatus {
            status: response.status(),
            range: range_header,
        });
    }

    let announced = probe::content_length(response.headers())?;
    if announced != remaining {
        return Err(DownloadError::LengthMismatch {
            range: range_header,
            expected: remaining,
            actual: announced,
        });
    }

    let mut received = 0u64;
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(DownloadError::Cancelled),
            next = response.chunk() => next?,
        };
        let Some(mut bytes) = next else { break };

        received += bytes.len() as u64;
        if received > remaining {
            // Never write past the end of our own range.
            return Err(DownloadError::LengthMismatch {
                range: range_header,
                expected: remaining,
                actual: received,
            });
        }

        while !bytes.is_empty() {
            let piece = bytes.split_to(bytes.len().min(WRITE_CHUNK_SIZE));
            let n = ctx.writer.write_at(range.start + *written, piece).await?;
            *written += n as u64;
            progress.set_written(*written);
        }
    }

    if *written < expected {
        return Err(DownloadError::ShortRead {
            received: *written,
            expected,
        });
    }

    Ok(())
}
