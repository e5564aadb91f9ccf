//! Error taxonomy shared by every stage of a download.
use reqwest::StatusCode;
use thiserror::Error;

/// Everything that can go wrong between probing the source and closing the output file.
#[derive(Error, Debug)]
pub enum DownloadError {
    /// The caller-supplied task is unusable (empty URL, zero workers, ...).
    #[error("invalid download task: {0}")]
    InvalidTask(String),

    /// The planner was asked to split something it cannot split.
    #[error("cannot plan ranges for {total_size} bytes across {workers} workers")]
    InvalidPlan { total_size: u64, workers: usize },

    #[error("network request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("server does not support byte-range requests (Accept-Ranges: {0})")]
    UnsupportedRange(String),

    #[error("invalid resource metadata: {0}")]
    Metadata(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unexpected status {status} for range {range}")]
    UnexpectedStatus { status: StatusCode, range: String },

    /// The server disagrees with the planner about how long a range is.
    #[error("range {range}: expected {expected} bytes, server reported {actual}")]
    LengthMismatch {
        range: String,
        expected: u64,
        actual: u64,
    },

    #[error("stream ended after {received} of {expected} bytes")]
    ShortRead { received: u64, expected: u64 },

    #[error("worker {index} gave up after {attempts} attempts: {source}")]
    WorkerFailed {
        index: usize,
        attempts: u32,
        #[source]
        source: Box<DownloadError>,
    },

    #[error("download cancelled")]
    Cancelled,

    #[error("worker task aborted: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl DownloadError {
    /// Transient failures a worker retries locally before giving up.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) | Self::ShortRead { .. } => true,
            Self::UnexpectedStatus { status, .. } => status.is_server_error(),
            _ => false,
        }
    }

    /// Short machine-friendly name of the error kind, used in user-facing reports.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidTask(_) => "invalid-task",
            Self::InvalidPlan { .. } => "invalid-plan",
            Self::Network(_) => "network",
            Self::UnsupportedRange(_) => "unsupported-range",
            Self::Metadata(_) => "metadata",
            Self::Io(_) => "io",
            Self::UnexpectedStatus { .. } => "unexpected-status",
            Self::LengthMismatch { .. } => "length-mismatch",
            Self::ShortRead { .. } => "short-read",
            Self::WorkerFailed { .. } => "worker-failed",
            Self::Cancelled => "cancelled",
            Self::Join(_) => "join",
        }
    }
}
