//! 🧵 Workers: the backbone of kvbulk, the unsung heroes, the ones who actually
//! do the work while the Supervisor takes all the credit in the sprint retro.
//!
//! 🚀 One feeder reads lines into a bounded queue. N bulk workers pull from it,
//! batch, and ship. Everyone shares one error channel and one shutdown button.
//!
//! ```text
//!  LineFeeder ──▶ [ bounded queue ] ──▶ BulkWorker × N ──▶ Sink
//!   (blocking)                              │
//!                                           └──▶ error channel ──▶ PoolReport
//! ```
//!
//! ⚠️ "If you're reading this, the code review went poorly." 🦆

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

mod bulk_worker;
mod line_feeder;

use bulk_worker::BulkWorker;
use line_feeder::LineFeeder;

use crate::app_config::RuntimeConfig;
use crate::backends::SinkBackend;
use crate::backends::file::BoxedLineSource;
use crate::errors::LoadError;
use crate::progress::ProgressMetrics;
use crate::shutdown::Shutdown;
use crate::transforms::BulkRequestBuilder;

/// ⏳ After a cancel, how long we wait for the feeder before leaving it behind.
/// A feeder parked on an interactive stdin will never come back on its own.
const FEEDER_GRACE: Duration = Duration::from_secs(1);

/// 🏗️ A background worker, that does work. duh.
///
/// "What's the DEAL with lifetime annotations? You borrow something,
///  you give it back. It's not that hard, Jerry!" — Seinfeld, on Rust
pub(crate) trait Worker {
    type Output;
    /// 🚀 Start the worker. Returns a JoinHandle because we trust but verify.
    fn start(self) -> JoinHandle<Result<Self::Output>>;
}

/// 📊 One bulk worker's tally.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerStats {
    /// 📥 Lines taken off the queue.
    pub lines: u64,
    /// 📡 Flush attempts, full batches and the final partial one alike.
    pub flushes: u64,
    pub batches_sent: u64,
    pub batches_failed: u64,
    pub docs_indexed: u64,
    pub cancelled: bool,
}

/// 📊 The feeder's tally.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedStats {
    pub lines_queued: u64,
    pub lines_skipped: u64,
    pub bytes_read: u64,
    pub cancelled: bool,
}

/// 📋 Everything the pool learned while it ran.
#[derive(Debug, Default)]
pub struct PoolReport {
    pub feed: FeedStats,
    pub workers: Vec<WorkerStats>,
    /// 💀 One entry per failed flush, in the order they were reported.
    pub errors: Vec<LoadError>,
}

impl PoolReport {
    pub fn batches_sent(&self) -> u64 {
        self.workers.iter().map(|w| w.batches_sent).sum()
    }

    pub fn batches_failed(&self) -> u64 {
        self.workers.iter().map(|w| w.batches_failed).sum()
    }

    pub fn docs_indexed(&self) -> u64 {
        self.workers.iter().map(|w| w.docs_indexed).sum()
    }

    pub fn cancelled(&self) -> bool {
        self.feed.cancelled || self.workers.iter().any(|w| w.cancelled)
    }
}

/// 🏊 The pool: how many swimmers, how big a batch, how deep the queue.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    workers: usize,
    batch_size: usize,
    queue_capacity: usize,
    verbose: bool,
}

impl WorkerPool {
    pub fn new(runtime: &RuntimeConfig) -> Self {
        Self {
            workers: runtime.workers.max(1),
            batch_size: runtime.batch_size.max(1),
            queue_capacity: runtime.effective_queue_capacity(),
            verbose: runtime.verbose,
        }
    }

    /// 🚀 Feed every line through the workers and wait for all of them.
    ///
    /// Failed flushes do not stop the pool; they come back in `PoolReport::errors`.
    ///
    /// # Errors
    /// 💀 The input could not be read, a task panicked, or a sink refused to close.
    pub async fn run(
        &self,
        source: BoxedLineSource,
        progress: ProgressMetrics,
        sink: SinkBackend,
        builder: BulkRequestBuilder,
        shutdown: Shutdown,
    ) -> Result<PoolReport> {
        let (tx, rx) = async_channel::bounded::<String>(self.queue_capacity);
        let (err_tx, mut err_rx) = mpsc::unbounded_channel::<LoadError>();
        let the_builder = Arc::new(builder);

        let the_crew: Vec<JoinHandle<Result<WorkerStats>>> = (0..self.workers)
            .map(|id| {
                BulkWorker::new(
                    format!("worker-{id}"),
                    rx.clone(),
                    sink.clone(),
                    Arc::clone(&the_builder),
                    self.batch_size,
                    self.verbose,
                    err_tx.clone(),
                    shutdown.clone(),
                )
                .start()
            })
            .collect();
        // only the workers hold these now
        drop(rx);
        drop(err_tx);
        if self.verbose {
            info!("🧵 started {} workers", self.workers);
        }

        let the_feeder = LineFeeder::new(source, tx, progress, shutdown.clone()).start();

        let mut report = PoolReport::default();
        for joined in futures::future::join_all(the_crew).await {
            let the_stats = joined.context("💀 A bulk worker panicked. The queue misses them already.")??;
            report.workers.push(the_stats);
        }

        report.feed = if shutdown.is_cancelled() {
            match tokio::time::timeout(FEEDER_GRACE, the_feeder).await {
                Ok(joined) => joined.context("💀 The line feeder panicked.")??,
                Err(_) => {
                    warn!("🛑 the feeder is still waiting on its input, leaving it behind");
                    FeedStats {
                        cancelled: true,
                        ..FeedStats::default()
                    }
                }
            }
        } else {
            the_feeder
                .await
                .context("💀 The line feeder panicked.")?
                .context("💀 Reading the input failed partway through.")?
        };

        while let Ok(the_error) = err_rx.try_recv() {
            report.errors.push(the_error);
        }
        Ok(report)
    }
}
