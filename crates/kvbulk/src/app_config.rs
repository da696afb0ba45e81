//! 🔧 App Configuration — the sacred TOML-to-struct pipeline.
//!
//! 📡 "Config not found: We looked everywhere. Under the couch. Behind the fridge.
//! In the junk drawer. Nothing." — every developer at 3am 🦆
//!
//! 🏗️ Powered by Figment, because manually parsing env vars is a form of
//! self-harm that even the borrow checker wouldn't approve of.
//!
//! 🧠 Knowledge graph:
//! - `[source]`    → `backends::file::FileSourceConfig` (where the lines come from)
//! - `[sink]`      → `backends::elasticsearch::ElasticsearchSinkConfig` (where they go)
//! - `[runtime]`   → `RuntimeConfig` (workers, batch size, queue, verbosity)
//! - `[lifecycle]` → `LifecycleConfig` (purge, create, mapping, refresh/replica dance)
//! - Env vars: `KVBULK_SINK__INDEX=abc` → `sink.index = "abc"`. Double underscore = nesting.

use std::path::Path;

use anyhow::Context;
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::Deserialize;
use tracing::info;

use crate::backends::elasticsearch::ElasticsearchSinkConfig;
use crate::backends::file::FileSourceConfig;
use crate::errors::LoadError;

/// 📦 The AppConfig: one struct to rule them all, one struct to find them,
/// one struct to bring them all, and in the Figment bind them.
///
/// Immutable once validated. Shared read-only by every worker.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    /// 📂 Where the NDJSON comes from. Defaults to stdin, uncompressed sniffing on.
    #[serde(default)]
    pub source: FileSourceConfig,
    /// 📡 Where the NDJSON goes. Without an index, `validate` will have words.
    #[serde(default)]
    pub sink: ElasticsearchSinkConfig,
    /// 🧵 How hard we push.
    #[serde(default, alias = "supervisor_config")]
    pub runtime: RuntimeConfig,
    /// 🔁 What we do to the index before and after.
    #[serde(default)]
    pub lifecycle: LifecycleConfig,
}

/// 🧵 Runtime knobs: how many workers, how big a batch, how deep the queue.
#[derive(Debug, Deserialize, Clone)]
pub struct RuntimeConfig {
    /// 🧵 Concurrent bulk workers. Zero is a configuration error.
    #[serde(default = "default_workers", alias = "num_workers")]
    pub workers: usize,
    /// 📦 Documents per bulk request. Zero is a configuration error, not an empty batch.
    #[serde(default = "default_batch_size", alias = "size")]
    pub batch_size: usize,
    /// 🚰 Bounded line queue between the reader and the workers. Defaults to 2 × workers.
    #[serde(default)]
    pub queue_capacity: Option<usize>,
    /// 📊 Draw the progress table while reading.
    #[serde(default)]
    pub progress: bool,
    /// 🔊 Log per-item bulk errors, flush checkpoints, applied settings, skipped lines.
    #[serde(default)]
    pub verbose: bool,
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

fn default_batch_size() -> usize {
    1000
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            batch_size: default_batch_size(),
            queue_capacity: None,
            progress: false,
            verbose: false,
        }
    }
}

impl RuntimeConfig {
    /// 🚰 The queue depth we actually use. Never zero: a zero-capacity bounded channel
    /// is not a rendezvous channel in async-channel, it's a panic.
    pub fn effective_queue_capacity(&self) -> usize {
        self.queue_capacity
            .unwrap_or(self.workers.saturating_mul(2))
            .max(1)
    }
}

/// 🔁 Index lifecycle knobs: the pre-run setup and the post-run cleanup.
#[derive(Debug, Deserialize, Clone)]
pub struct LifecycleConfig {
    /// 🗑️ Delete the index before loading. Irreversible. Ask twice.
    #[serde(default)]
    pub purge: bool,
    /// ⏱️ How long to let a delete settle before recreating.
    #[serde(default = "default_purge_pause_ms")]
    pub purge_pause_ms: u64,
    /// 🏗️ Create-index body: a file path if it exists on disk, inline JSON otherwise.
    #[serde(default)]
    pub settings: Option<String>,
    /// 🗺️ Mapping body: same path-or-inline rule.
    #[serde(default)]
    pub mapping: Option<String>,
    /// 🪞 Drop replicas to zero during the load.
    #[serde(default)]
    pub zero_replica: bool,
    /// ⏱️ The refresh interval restored after the load.
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval: String,
}

fn default_purge_pause_ms() -> u64 {
    1000
}

fn default_refresh_interval() -> String {
    "1s".to_string()
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            purge: false,
            purge_pause_ms: default_purge_pause_ms(),
            settings: None,
            mapping: None,
            zero_replica: false,
            refresh_interval: default_refresh_interval(),
        }
    }
}

impl AppConfig {
    /// 🚧 Catch the fatal stuff before any network activity.
    ///
    /// Checked in this order: workers, batch size, index name.
    pub fn validate(&self) -> Result<(), LoadError> {
        if self.runtime.workers == 0 {
            return Err(LoadError::NoWorkers);
        }
        if self.runtime.batch_size == 0 {
            return Err(LoadError::InvalidBatchSize);
        }
        if self.sink.index.trim().is_empty() {
            return Err(LoadError::IndexNameRequired);
        }
        Ok(())
    }
}

/// 🏗️ The layered figment: `KVBULK_*` env vars first, then the TOML file on top.
///
/// Exposed so the CLI can merge its flags last.
pub fn config_figment(config_file_name: Option<&Path>) -> Figment {
    let config = Figment::new().merge(Env::prefixed("KVBULK_").split("__"));
    match config_file_name {
        Some(file_name) => config.merge(Toml::file(file_name)),
        None => config,
    }
}

/// 🚀 Load the config — from a file, from env vars, or from the sheer power of hoping.
///
/// 📐 If `config_file_name` is None → env vars only. If Some → env vars + TOML, TOML wins.
///
/// 💀 Returns an error if config is unparseable. Validation is a separate step
/// (`AppConfig::validate`) so the error type stays matchable.
pub fn load_config(config_file_name: Option<&Path>) -> anyhow::Result<AppConfig> {
    info!(
        "🔧 Loading configuration: {:#?}",
        config_file_name.unwrap_or(Path::new(""))
    );
    extract_config(config_figment(config_file_name), config_file_name)
}

/// 📦 Extract an `AppConfig` from any figment, with a context message that names the file.
pub fn extract_config(
    figment: Figment,
    config_file_name: Option<&Path>,
) -> anyhow::Result<AppConfig> {
    let context_msg = match config_file_name {
        Some(path) => format!(
            "💀 Failed to parse configuration from file '{}' and environment variables (KVBULK_*). \
             The file exists in our hearts, but apparently not in a shape serde likes.",
            path.display()
        ),
        None => "💀 Failed to parse configuration from environment variables (KVBULK_*). \
                 No file was provided — this one's all on the environment. Classic."
            .to_string(),
    };
    figment.extract().context(context_msg)
}
