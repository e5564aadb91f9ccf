use anyhow::Result;
use clap::Parser;
use indicatif::{MultiProgress, ProgressDrawTarget};
use splitfetch::config::Settings;
use splitfetch::observer::{ConsoleObserver, LogWriter};
use splitfetch::utils;
use splitfetch::{Args, DownloadOutcome, Downloader};
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use tracing_subscriber::EnvFilter;

/// Exit code for an interrupted run, as a shell would report SIGINT.
const EXIT_CANCELLED: u8 = 130;

fn init_tracing(verbose: u8, multi: MultiProgress) {
    let default_level = match verbose {
        0 => "splitfetch=info",
        1 => "splitfetch=debug",
        _ => "splitfetch=trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(LogWriter::new(multi))
        .try_init();
}

async fn run(args: Args) -> Result<ExitCode> {
    let multi = if args.no_progress {
        MultiProgress::with_draw_target(ProgressDrawTarget::hidden())
    } else {
        MultiProgress::new()
    };
    init_tracing(args.verbose, multi.clone());

    let settings = Settings::load().unwrap_or_else(|e| {
        warn!("ignoring settings: {:#}", e);
        Settings::default()
    });

    let task = args.to_task(&settings);
    let downloader = Downloader::new(settings.http_client()?)
        .with_retry_policy(args.retry_policy(&settings));

    let cancel_token = CancellationToken::new();
    let signal_token = cancel_token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("received Ctrl+C, stopping workers");
            signal_token.cancel();
        }
    });

    let render_stop = CancellationToken::new();
    let renderer = (!args.no_progress).then(|| {
        ConsoleObserver::new(multi.clone()).spawn(downloader.progress(), render_stop.clone())
    });

    let outcome = downloader.run(&task, cancel_token).await;

    render_stop.cancel();
    if let Some(renderer) = renderer {
        let _ = renderer.await;
    }

    let code = match outcome {
        DownloadOutcome::Completed {
            path,
            bytes_written,
            elapsed,
        } => {
            println!(
                "✅ Download completed: {} ({}) in {:?}",
                path.display(),
                utils::format_bytes(bytes_written),
                utils::round_millis(elapsed)
            );
            ExitCode::SUCCESS
        }
        DownloadOutcome::Failed { worker, error, .. } => {
            match worker {
                Some(index) => eprintln!("❌ [{}] worker {}: {}", error.kind(), index, error),
                None => eprintln!("❌ [{}] {}", error.kind(), error),
            }
            ExitCode::FAILURE
        }
        DownloadOutcome::Cancelled { elapsed } => {
            eprintln!(
                "🛑 Download cancelled after {:?}",
                utils::round_millis(elapsed)
            );
            ExitCode::from(EXIT_CANCELLED)
        }
    };

    Ok(code)
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    match run(args).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("❌ {:#}", e);
            ExitCode::FAILURE
        }
    }
}
