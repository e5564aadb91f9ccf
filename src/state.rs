//! Data model for a single download run.
//!
//! Nothing in this module is persisted: a task is described, probed, split into
//! ranges and reported on, and all of it is dropped when the run ends.
use crate::error::DownloadError;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Worker count used when the caller does not pick one.
pub const DEFAULT_WORKERS: usize = 10;

/// The resolved, immutable configuration of one download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadTask {
    /// Source URL of the remote file.
    pub url: String,
    /// Directory the output file is written into.
    pub dest_dir: PathBuf,
    /// Explicit output name. When absent the probed name is used.
    pub file_name: Option<String>,
    /// Number of concurrent range workers (at least 1).
    pub workers: usize,
}

impl DownloadTask {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            dest_dir: PathBuf::from("."),
            file_name: None,
            workers: DEFAULT_WORKERS,
        }
    }

    pub fn with_destination(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dest_dir = dir.into();
        self
    }

    /// Overrides the output name. Empty names are ignored.
    pub fn with_file_name(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.file_name = (!name.trim().is_empty()).then_some(name);
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Checks the task before anything touches the network.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::InvalidTask`] if the URL is empty, is not an
    /// absolute http(s) URL, or if the worker count is zero.
    pub fn validate(&self) -> Result<(), DownloadError> {
        if self.url.trim().is_empty() {
            return Err(DownloadError::InvalidTask("URL should not be empty".into()));
        }
        let parsed = url::Url::parse(&self.url)
            .map_err(|e| DownloadError::InvalidTask(format!("invalid URL {}: {}", self.url, e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(DownloadError::InvalidTask(format!(
                "unsupported scheme {}",
                parsed.scheme()
            )));
        }
        if self.workers == 0 {
            return Err(DownloadError::InvalidTask(
                "worker count must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Final output name: the explicit override wins over the probed one.
    pub fn resolve_file_name(&self, meta: &ResourceMetadata) -> String {
        self.file_name
            .clone()
            .unwrap_or_else(|| meta.file_name.clone())
    }

    pub fn output_path(&self, meta: &ResourceMetadata) -> PathBuf {
        self.dest_dir.join(self.resolve_file_name(meta))
    }
}

/// Facts about the remote object, gathered once by the probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceMetadata {
    /// Total size in bytes. Assumed fixed for the duration of the run.
    pub total_size: u64,
    /// Whether the server advertised `Accept-Ranges: bytes`.
    pub accepts_ranges: bool,
    /// Name derived from the final URL path.
    pub file_name: String,
}

/// A half-open `[start, end)` slice of the target file assigned to one worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ByteRange {
    /// Ordinal of the worker that owns this range.
    pub index: usize,
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// `Range` header value covering this range from `offset` bytes in.
    ///
    /// HTTP ranges are inclusive, so the last byte is `end - 1`.
    pub fn header_from(&self, offset: u64) -> String {
        format!("bytes={}-{}", self.start + offset, self.end - 1)
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} [{}, {})", self.index, self.start, self.end)
    }
}

/// Lifecycle of a single fetch worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WorkerStatus {
    Pending = 0,
    Running = 1,
    Retrying = 2,
    Completed = 3,
    Failed = 4,
    Cancelled = 5,
}

impl WorkerStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    pub(crate) fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::Running,
            2 => Self::Retrying,
            3 => Self::Completed,
            4 => Self::Failed,
            5 => Self::Cancelled,
            _ => Self::Pending,
        }
    }
}

impl fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Retrying => "retrying",
            Self::Completed => "done",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(label)
    }
}

/// The single terminal result handed back to the caller of a run.
#[derive(Debug)]
pub enum DownloadOutcome {
    Completed {
        path: PathBuf,
        bytes_written: u64,
        elapsed: Duration,
    },
    /// `worker` is set when the failure came from a specific range worker.
    /// Any partially written file is left on disk.
    Failed {
        worker: Option<usize>,
        error: DownloadError,
        elapsed: Duration,
    },
    Cancelled {
        elapsed: Duration,
    },
}

impl DownloadOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }

    pub fn elapsed(&self) -> Duration {
        match self {
            Self::Completed { elapsed, .. }
            | Self::Failed { elapsed, .. }
            | Self::Cancelled { elapsed } => *elapsed,
        }
    }
}
