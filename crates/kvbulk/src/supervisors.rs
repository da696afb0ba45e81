//! 🎬 *[camera pans across a dimly lit server room]*
//! 🎬 *[dramatic orchestral music swells]*
//! 🎬 "In a world where workers toil endlessly..."
//! 🎬 "One supervisor dared to manage them all."
//! 🎬 *[record scratch]* 🦆
//!
//! 📦 The Supervisor module — part middle manager, part helicopter parent,
//! part the person who turns the office lights back on after everyone leaves.
//!
//! One run, start to finish:
//! 1. validate the config (no network yet)
//! 2. purge the index and wait for the dust to settle, if asked
//! 3. create the index, apply the mapping
//! 4. fast-ingest mode on (`FastIngestGuard::acquire`)
//! 5. the worker pool eats the input
//! 6. fast-ingest mode off (`FastIngestGuard::release`), no matter how 4 or 5 went
//!
//! ⚠️ DO NOT MAKE THE WORKERS PUB EVER
//! 🔒 Like Fight Club, but for async tasks. First rule: you don't pub the workers.

mod workers;
// 🔧 the lifecycle is fair game, library callers may want to drive an index by hand
pub mod lifecycle;

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::app_config::AppConfig;
use crate::backends::file::BoxedLineSource;
use crate::backends::{ElasticsearchSink, EsTransport, SinkBackend};
use crate::errors::LoadError;
use crate::progress::{ProgressMetrics, RunSummary};
use crate::shutdown::Shutdown;
use crate::transforms::BulkRequestBuilder;
use lifecycle::{FastIngestGuard, IndexAdmin, resolve_body};
use workers::{PoolReport, WorkerPool};

/// 📦 The Supervisor: because even async tasks need someone hovering over them
/// asking "is it done yet?" every 5 milliseconds.
pub(crate) struct Supervisor {
    /// 🔧 The sacred scrolls of configuration, passed down from main()
    /// through the ancient ritual of .clone()
    app_config: AppConfig,
}

impl Supervisor {
    pub(crate) fn new(app_config: AppConfig) -> Self {
        Self { app_config }
    }

    /// 🧾 The summary of a run that never started.
    fn cancelled_summary(&self) -> RunSummary {
        RunSummary {
            workers: self.app_config.runtime.workers,
            cancelled: true,
            ..RunSummary::default()
        }
    }

    /// 🚀 One full run over `source`.
    ///
    /// # Errors
    /// 💀 A configuration error (before any I/O), a failed setup step, a failed
    /// restoration, or `LoadError::RunFailed` when any batch did not make it.
    /// Restoration runs before any of the last three is returned.
    pub(crate) async fn run(
        &self,
        source: BoxedLineSource,
        progress: ProgressMetrics,
        mut shutdown: Shutdown,
    ) -> Result<RunSummary> {
        let the_config = &self.app_config;
        the_config.validate()?;
        if shutdown.is_cancelled() {
            info!("🛑 cancelled before the first request, nothing to do");
            return Ok(self.cancelled_summary());
        }

        let the_verbose = the_config.runtime.verbose;
        let the_transport = EsTransport::new(&the_config.sink)?;
        let the_admin = IndexAdmin::new(the_transport.clone(), &the_config.sink, the_verbose);
        if the_verbose {
            info!("📡 using {} server(s)", the_admin.servers().len());
        }

        if the_config.lifecycle.purge {
            the_admin.delete_index().await?;
            let the_pause = Duration::from_millis(the_config.lifecycle.purge_pause_ms);
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    info!("🛑 cancelled while the purge was settling");
                    return Ok(self.cancelled_summary());
                }
                _ = tokio::time::sleep(the_pause) => {}
            }
        }

        let the_settings = match the_config.lifecycle.settings.as_deref() {
            Some(raw) => Some(resolve_body(raw).await?),
            None => None,
        };
        the_admin.create_index(the_settings).await?;
        if let Some(raw) = the_config.lifecycle.mapping.as_deref() {
            the_admin.put_mapping(resolve_body(raw).await?).await?;
        }

        let the_builder = BulkRequestBuilder::new(the_admin.index())
            .with_doc_type(the_config.sink.doc_type.clone())
            .with_op_type(the_config.sink.op_type)
            .with_id_field(the_config.sink.id_field.as_deref())
            .with_pipeline(the_config.sink.pipeline.clone());
        let the_sink = SinkBackend::Elasticsearch(ElasticsearchSink::new(the_transport, the_verbose));

        let mut the_guard = FastIngestGuard::new(&the_config.lifecycle);
        let the_start = Instant::now();
        let the_outcome = match the_guard.acquire(&the_admin).await {
            Ok(()) => {
                WorkerPool::new(&the_config.runtime)
                    .run(source, progress, the_sink, the_builder, shutdown.clone())
                    .await
            }
            Err(err) => Err(err),
        };
        let the_elapsed = the_start.elapsed();

        // 🧹 always, whatever happened above
        let the_restored = the_guard
            .release(&the_admin)
            .await
            .context("💀 Restoring the index settings failed. Check refresh_interval and number_of_replicas by hand.");

        let the_report = match the_outcome {
            Ok(report) => report,
            Err(err) => {
                if let Err(restore_err) = the_restored {
                    warn!("{restore_err:#}");
                }
                return Err(err);
            }
        };
        the_restored?;

        let the_summary = summarize(&the_report, the_config.runtime.workers, the_elapsed, &shutdown);
        info!("🏁 {}", the_summary.stats_line());
        for the_error in &the_report.errors {
            warn!("💀 {the_error}");
        }
        if the_summary.batches_failed > 0 {
            return Err(LoadError::RunFailed {
                failed_batches: the_summary.batches_failed as usize,
            }
            .into());
        }
        Ok(the_summary)
    }
}

fn summarize(report: &PoolReport, workers: usize, elapsed: Duration, shutdown: &Shutdown) -> RunSummary {
    RunSummary {
        docs_queued: report.feed.lines_queued,
        lines_skipped: report.feed.lines_skipped,
        docs_indexed: report.docs_indexed(),
        batches_sent: report.batches_sent(),
        batches_failed: report.batches_failed(),
        workers,
        elapsed,
        cancelled: report.cancelled() || shutdown.is_cancelled(),
    }
}
