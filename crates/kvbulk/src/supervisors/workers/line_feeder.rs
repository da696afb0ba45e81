// human
// The feeder: reads the input on a blocking thread and pushes lines into the queue.
// send_blocking waits while the queue is full, so a slow cluster slows the reader down.
// If every worker is gone the send fails and we stop reading.
use anyhow::Result;
use async_channel::Sender;
use tokio::task::JoinHandle;
use tracing::debug;

use super::{FeedStats, Worker};
use crate::backends::file::BoxedLineSource;
use crate::progress::ProgressMetrics;
use crate::shutdown::Shutdown;

// how often the progress table gets redrawn, in lines
const PROGRESS_EVERY: u64 = 1000;

pub(crate) struct LineFeeder {
    source: BoxedLineSource,
    tx: Sender<String>,
    progress: ProgressMetrics,
    shutdown: Shutdown,
}

impl LineFeeder {
    pub(crate) fn new(
        source: BoxedLineSource,
        tx: Sender<String>,
        progress: ProgressMetrics,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            source,
            tx,
            progress,
            shutdown,
        }
    }

    fn feed(mut self) -> Result<FeedStats> {
        let mut stats = FeedStats::default();
        loop {
            if self.shutdown.is_cancelled() {
                stats.cancelled = true;
                break;
            }
            let Some(line) = self.source.next_line()? else {
                break;
            };
            if self.tx.send_blocking(line).is_err() {
                debug!("📪 every worker has left, the feeder stops reading");
                break;
            }
            stats.lines_queued += 1;
            if stats.lines_queued % PROGRESS_EVERY == 0 {
                self.progress.update(
                    self.source.bytes_read(),
                    stats.lines_queued,
                    self.source.lines_skipped(),
                );
            }
        }
        // closing the queue is what tells the workers to do their final flush
        self.tx.close();

        stats.bytes_read = self.source.bytes_read();
        stats.lines_skipped = self.source.lines_skipped();
        self.progress
            .update(stats.bytes_read, stats.lines_queued, stats.lines_skipped);
        self.progress.finish();
        Ok(stats)
    }
}

impl Worker for LineFeeder {
    type Output = FeedStats;

    fn start(self) -> JoinHandle<Result<FeedStats>> {
        tokio::task::spawn_blocking(move || self.feed())
    }
}
