//! # splitfetch
//!
//! `splitfetch` downloads a single large file by splitting it into contiguous
//! byte ranges and fetching them concurrently with HTTP range requests. Each
//! range worker streams its bytes straight into the output file at the right
//! offset, so nothing is reassembled afterwards.
//!
//! - Metadata probe with a single `HEAD` request
//! - Gapless range planning, one range per worker
//! - Lock-free positional writes into one shared file
//! - Bounded retries that resume a range where it stopped
//! - Cooperative cancellation that still joins every worker
//!
//! ## Example Usage
//!
//! ```no_run
//! use splitfetch::{DownloadTask, Downloader};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn demo() {
//! let task = DownloadTask::new("https://example.com/big.iso")
//!     .with_destination("/tmp")
//!     .with_workers(8);
//! let outcome = Downloader::new(reqwest::Client::new())
//!     .run(&task, CancellationToken::new())
//!     .await;
//! assert!(outcome.is_success());
//! # }
//! ```

pub mod args;
pub mod config;
pub mod downloader;
pub mod error;
pub mod observer;
pub mod planner;
pub mod probe;
pub mod progress;
pub mod state;
pub mod utils;
pub mod worker;
pub mod writer;

pub use args::Args;
pub use downloader::{Downloader, Phase};
pub use error::DownloadError;
pub use progress::ProgressTracker;
pub use state::{ByteRange, DownloadOutcome, DownloadTask, ResourceMetadata, WorkerStatus};
pub use worker::{RetryPolicy, download_chunk};
