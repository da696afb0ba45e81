//! 🎬 *[a queue fills with lines. somewhere, a worker waits.]*
//! *[the clock on the wall reads 2:47am.]*
//! *[nobody asked for ten million documents. and yet, here they are.]*
//!
//! 🗑️ The BulkWorker — patient, tireless, and deeply unbothered by the chaos
//! happening upstream. It takes lines off the shared queue, piles them into a batch,
//! and when the batch hits `batch_size` it builds one bulk request and ships it.
//!
//! ## Knowledge Graph 🧠
//! - Every full batch is flushed. A partial batch is flushed once the queue closes.
//! - The batch is moved into the flush (`mem::take`), so the next batch starts empty.
//! - A failed flush is reported on the error channel and the worker keeps going.
//! - The shutdown button is checked at every wait: for a line, and for the cluster.
//!   Once pressed, the pending batch is abandoned and the worker leaves.
//!
//! 🦆 (the duck has no comment at this time)

use std::sync::Arc;

use anyhow::{Context, Result};
use async_channel::Receiver;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use super::{Worker, WorkerStats};
use crate::backends::{Sink, SinkBackend};
use crate::errors::LoadError;
use crate::shutdown::Shutdown;
use crate::transforms::BulkRequestBuilder;

/// 🚦 What the queue handed us this time.
enum Next {
    Line(String),
    Closed,
    Cancelled,
}

/// 🗑️ One member of the pool. Owns its own batch, its own sink clone, its own counters.
#[derive(Debug)]
pub(crate) struct BulkWorker {
    name: String,
    rx: Receiver<String>,
    sink: SinkBackend,
    builder: Arc<BulkRequestBuilder>,
    batch_size: usize,
    verbose: bool,
    errors: UnboundedSender<LoadError>,
    shutdown: Shutdown,
}

impl BulkWorker {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        name: String,
        rx: Receiver<String>,
        sink: SinkBackend,
        builder: Arc<BulkRequestBuilder>,
        batch_size: usize,
        verbose: bool,
        errors: UnboundedSender<LoadError>,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            name,
            rx,
            sink,
            builder,
            batch_size: batch_size.max(1),
            verbose,
            errors,
            shutdown,
        }
    }

    async fn next_line(&mut self) -> Next {
        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => Next::Cancelled,
            received = self.rx.recv() => match received {
                Ok(line) => Next::Line(line),
                Err(_) => Next::Closed,
            },
        }
    }

    /// 📡 Ship one batch. Returns `false` if the shutdown button beat the cluster to it.
    async fn flush(&mut self, docs: Vec<String>, stats: &mut WorkerStats) -> bool {
        let Self {
            shutdown,
            sink,
            builder,
            ..
        } = &mut *self;
        let the_outcome = tokio::select! {
            biased;
            _ = shutdown.cancelled() => None,
            result = dispatch_batch(sink, builder, &docs) => Some(result),
        };

        match the_outcome {
            None => {
                debug!("🛑 [{}] abandoning an in-flight batch of {}", self.name, docs.len());
                false
            }
            Some(Ok(indexed)) => {
                stats.flushes += 1;
                if indexed > 0 {
                    stats.batches_sent += 1;
                    stats.docs_indexed += indexed as u64;
                }
                if self.verbose {
                    debug!("[{}] @{}", self.name, stats.lines);
                }
                true
            }
            Some(Err(err)) => {
                stats.flushes += 1;
                stats.batches_failed += 1;
                error!("💀 [{}] bulk flush failed: {err:#}", self.name);
                // the receiver only disappears once the pool is done collecting
                let _ = self.errors.send(LoadError::WorkerBulkIndex {
                    worker: self.name.clone(),
                    detail: format!("{err:#}"),
                });
                true
            }
        }
    }
}

/// 🏗️ Build and send. Blank-only batches build to nothing and are not sent.
async fn dispatch_batch(
    sink: &mut SinkBackend,
    builder: &BulkRequestBuilder,
    docs: &[String],
) -> Result<usize> {
    let the_request = builder.build(docs)?;
    if the_request.is_empty() {
        return Ok(0);
    }
    let the_count = the_request.doc_count;
    sink.send(the_request).await?;
    Ok(the_count)
}

impl Worker for BulkWorker {
    type Output = WorkerStats;

    fn start(mut self) -> JoinHandle<Result<WorkerStats>> {
        tokio::spawn(async move {
            let mut stats = WorkerStats::default();
            if self.shutdown.is_cancelled() {
                stats.cancelled = true;
                return Ok(stats);
            }

            debug!("📥 [{}] started draining the queue", self.name);
            let mut batch: Vec<String> = Vec::with_capacity(self.batch_size);
            loop {
                match self.next_line().await {
                    Next::Line(line) => {
                        batch.push(line);
                        stats.lines += 1;
                        if batch.len() == self.batch_size {
                            let the_full_batch = std::mem::take(&mut batch);
                            if !self.flush(the_full_batch, &mut stats).await {
                                stats.cancelled = true;
                                return Ok(stats);
                            }
                            batch.reserve(self.batch_size);
                        }
                    }
                    Next::Cancelled => {
                        debug!("🛑 [{}] dropping {} pending lines", self.name, batch.len());
                        stats.cancelled = true;
                        return Ok(stats);
                    }
                    Next::Closed => break,
                }
            }

            if !batch.is_empty() && !self.flush(batch, &mut stats).await {
                stats.cancelled = true;
                return Ok(stats);
            }
            self.sink
                .close()
                .await
                .with_context(|| format!("💀 [{}] failed to close its sink", self.name))?;
            debug!("🏁 [{}] queue closed, {} lines handled", self.name, stats.lines);
            Ok(stats)
        })
    }
}
