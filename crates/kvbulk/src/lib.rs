//! 🚀 kvbulk — newline-delimited JSON in, Elasticsearch `_bulk` requests out.
//!
//! 🎬 *[narrator voice]* "It started with one file. Ten million lines. A cluster
//! that refreshed every second whether anyone asked it to or not."
//!
//! ```text
//!  file / stdin ──▶ LineSource ──▶ WorkerPool ──▶ BulkRequestBuilder ──▶ POST /_bulk
//!   (gzip ok)                          │
//!                                      └── FastIngestGuard: refresh off before, back on after
//! ```
//!
//! Library callers build an [`app_config::AppConfig`] (or load one with
//! [`app_config::load_config`]) and hand it to [`run`] together with a
//! [`shutdown::Shutdown`] listener. 🦆

pub mod app_config;
pub mod backends;
pub mod errors;
pub mod progress;
pub mod shutdown;
mod supervisors;
pub mod transforms;

pub use supervisors::lifecycle;

use anyhow::{Context, Result};
use tracing::warn;

use crate::app_config::AppConfig;
use crate::backends::file::{BoxedLineSource, OpenedInput};
use crate::progress::{ProgressMetrics, RunSummary};
use crate::shutdown::Shutdown;
use crate::supervisors::Supervisor;

/// 🚀 Load the configured input into the configured index.
///
/// The config is validated before the input is opened, and the input is opened
/// before the first request goes out.
///
/// # Errors
/// 💀 Configuration errors, an unreadable input, a failed index setup or
/// restoration, or `LoadError::RunFailed` when any batch did not make it.
pub async fn run(app_config: AppConfig, shutdown: Shutdown) -> Result<RunSummary> {
    let the_source_config = app_config.source.clone();
    let the_verbose = app_config.runtime.verbose;
    run_with_opener(app_config, shutdown, move || {
        BoxedLineSource::open(&the_source_config, the_verbose)
    })
    .await
}

/// 🚪 `run`, with the input opened by `opener` on the blocking pool.
///
/// A cancel while `opener` is still blocked (stdin with nothing on it yet) leaves
/// the opener behind and returns a cancelled summary.
async fn run_with_opener<F>(
    app_config: AppConfig,
    mut shutdown: Shutdown,
    opener: F,
) -> Result<RunSummary>
where
    F: FnOnce() -> Result<(BoxedLineSource, OpenedInput)> + Send + 'static,
{
    app_config.validate()?;
    if shutdown.is_cancelled() {
        // 🛑 not even the input gets opened
        return run_cancelled(app_config, shutdown).await;
    }

    // 🐢 sniffing the gzip magic may block on stdin
    let the_opening = tokio::task::spawn_blocking(opener);
    let the_opened = tokio::select! {
        biased;
        _ = shutdown.cancelled() => None,
        opened = the_opening => Some(opened),
    };
    let Some(opened) = the_opened else {
        warn!("🛑 cancelled while the input was still opening, leaving it behind");
        return run_cancelled(app_config, shutdown).await;
    };
    let (the_source, the_input) = opened.context("💀 Opening the input panicked")??;

    // the compressed size says nothing about how far into the decompressed stream we are
    let the_total = if the_input.gzipped { 0 } else { the_input.size_hint };
    let the_progress = ProgressMetrics::new(the_input.name, the_total, app_config.runtime.progress);

    Supervisor::new(app_config)
        .run(the_source, the_progress, shutdown)
        .await
}

/// 🛑 A run that never touches the input: the supervisor sees the cancel and bows out.
async fn run_cancelled(app_config: AppConfig, shutdown: Shutdown) -> Result<RunSummary> {
    let the_nothing: BoxedLineSource = BoxedLineSource::new(Box::new(std::io::empty()));
    Supervisor::new(app_config)
        .run(the_nothing, ProgressMetrics::new("-", 0, false), shutdown)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shutdown::ShutdownTrigger;
    use std::sync::mpsc;
    use std::time::Duration;

    fn config_for(server: &str) -> Result<AppConfig> {
        let mut the_config: AppConfig = serde_json::from_value(serde_json::json!({
            "sink": {"index": "abc", "servers": [server]},
        }))?;
        the_config.sink.retry.max_retries = 0;
        Ok(the_config)
    }

    #[tokio::test]
    async fn the_one_where_ctrl_c_beats_a_silent_stdin() -> Result<()> {
        let the_server = wiremock::MockServer::start().await;
        let (the_button, the_listener) = ShutdownTrigger::new();
        let (the_gate, the_wait) = mpsc::channel::<()>();

        let the_run = tokio::spawn(run_with_opener(
            config_for(&the_server.uri())?,
            the_listener,
            move || {
                // 🐢 blocks until the test lets go
                let _ = the_wait.recv();
                anyhow::bail!("💀 the input never said anything")
            },
        ));
        tokio::time::sleep(Duration::from_millis(50)).await;
        the_button.trigger();

        let the_summary = tokio::time::timeout(Duration::from_secs(5), the_run)
            .await
            .context("💀 run ignored the cancel")???;
        assert!(the_summary.cancelled);
        assert!(the_server.received_requests().await.unwrap_or_default().is_empty());
        drop(the_gate);
        Ok(())
    }
}
