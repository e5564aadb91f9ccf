use crate::config::Settings;
use crate::state::{DEFAULT_WORKERS, DownloadTask};
use crate::worker::RetryPolicy;
use clap::Parser;
use std::path::PathBuf;

/// Download one large file over parallel HTTP range requests.
///
/// The file is split into one contiguous range per worker; every worker writes
/// its range straight into the output file at the right offset.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// The URL of the file to download.
    #[arg(short, long)]
    pub url: String,

    /// The directory to save the file in. Defaults to the current directory.
    #[arg(short, long)]
    pub dest: Option<PathBuf>,

    /// Custom name for the downloaded file. Defaults to the name in the URL.
    #[arg(short, long)]
    pub name: Option<String>,

    /// The number of concurrent range workers.
    #[arg(short, long, value_parser = clap::value_parser!(u64).range(1..))]
    pub workers: Option<u64>,

    /// Attempts per range before giving up.
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    pub retries: Option<u32>,

    /// Hide the per-worker progress bars.
    #[arg(long)]
    pub no_progress: bool,

    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Args {
    /// Resolves flags over `settings` into a task.
    pub fn to_task(&self, settings: &Settings) -> DownloadTask {
        let workers = self
            .workers
            .map(|w| w as usize)
            .or(settings.workers)
            .unwrap_or(DEFAULT_WORKERS);
        let dest = self
            .dest
            .clone()
            .or_else(|| settings.dir.clone())
            .unwrap_or_else(|| PathBuf::from("."));

        let mut task = DownloadTask::new(self.url.clone())
            .with_destination(dest)
            .with_workers(workers);
        if let Some(name) = &self.name {
            task = task.with_file_name(name.clone());
        }
        task
    }

    pub fn retry_policy(&self, settings: &Settings) -> RetryPolicy {
        let mut policy = settings.retry_policy();
        if let Some(retries) = self.retries {
            policy.max_attempts = retries;
        }
        policy
    }
}
