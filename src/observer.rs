//! Terminal rendering of download progress.
//!
//! Workers never talk to the terminal. [`ConsoleObserver`] polls the
//! [`ProgressTracker`] on its own schedule and mirrors each worker onto an
//! indicatif bar, so a slow terminal can never stall a write.
use crate::progress::{ProgressTracker, WorkerSnapshot};
use crate::utils;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::fmt::MakeWriter;

const REFRESH_INTERVAL: Duration = Duration::from_millis(150);

/// One progress bar per worker, rebuilt whenever the worker set changes.
pub struct ConsoleObserver {
    multi: MultiProgress,
    style: ProgressStyle,
    bars: Vec<ProgressBar>,
}

impl ConsoleObserver {
    pub fn new(multi: MultiProgress) -> Self {
        let style = ProgressStyle::with_template(
            "{msg} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=>-");

        Self {
            multi,
            style,
            bars: Vec::new(),
        }
    }

    /// Applies one snapshot to the bars.
    pub fn refresh(&mut self, snapshot: &[WorkerSnapshot]) {
        if self.bars.len() != snapshot.len() {
            for pb in self.bars.drain(..) {
                self.multi.remove(&pb);
            }
            for worker in snapshot {
                let pb = self.multi.add(ProgressBar::new(worker.expected));
                pb.set_style(self.style.clone());
                self.bars.push(pb);
            }
        }

        for (pb, worker) in self.bars.iter().zip(snapshot) {
            if pb.is_finished() {
                continue;
            }
            pb.set_length(worker.expected);
            pb.set_position(worker.bytes_written);
            let msg = format!(
                "Part {:>2} {:>3}% {:>12} {:<9}",
                worker.index + 1,
                worker.percent,
                utils::format_rate(worker.bytes_per_sec),
                worker.status
            );
            if worker.status.is_terminal() {
                pb.finish_with_message(msg);
            } else {
                pb.set_message(msg);
            }
        }
    }

    pub fn bars(&self) -> &[ProgressBar] {
        &self.bars
    }

    /// Polls `tracker` until `stop` fires, then draws a final frame.
    pub fn spawn(
        mut self,
        tracker: Arc<ProgressTracker>,
        stop: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(REFRESH_INTERVAL);
            loop {
                tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = ticker.tick() => self.refresh(&tracker.snapshot()),
                }
            }
            self.refresh(&tracker.snapshot());
            for pb in &self.bars {
                if !pb.is_finished() {
                    pb.abandon();
                }
            }
        })
    }
}

/// `tracing` writer that hides the progress bars while a log line is printed.
#[derive(Clone)]
pub struct LogWriter {
    multi: MultiProgress,
}

impl LogWriter {
    pub fn new(multi: MultiProgress) -> Self {
        Self { multi }
    }
}

impl Write for LogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.multi.suspend(|| io::stderr().write_all(buf))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()
    }
}

impl<'a> MakeWriter<'a> for LogWriter {
    type Writer = LogWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
