//! 🚀 kvbulk-cli — the front door, the bouncer, the maitre d' of kvbulk.
//!
//! 🎬 *[narrator voice]* "It all started with a simple main() function..."
//! 📦 This binary crate is the thin CLI wrapper: it parses flags, layers them on
//! top of the TOML file and `KVBULK_*` env vars, sets up logging, wires Ctrl-C to
//! the shutdown button, and then lets the real code do the heavy lifting.
//! Like a manager. 🦆

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Parser;
use figment::providers::Serialized;
use serde::Serialize;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// 🚩 Bulk load newline-delimited JSON into Elasticsearch.
#[derive(Parser, Debug)]
#[command(name = "kvbulk", version, about)]
struct Cli {
    /// 📄 Input file, `-` or nothing for stdin. Gzip is detected automatically.
    file: Option<String>,

    /// 🔧 TOML config file. Flags win over it, it wins over KVBULK_* env vars.
    #[arg(long)]
    config: Option<PathBuf>,

    /// 📦 Target index.
    #[arg(long)]
    index: Option<String>,

    /// 📡 Elasticsearch server, repeat for more than one.
    #[arg(long = "server")]
    servers: Vec<String>,

    /// 🧵 Number of parallel bulk workers.
    #[arg(short = 'w', long)]
    workers: Option<usize>,

    /// 📦 Documents per bulk request.
    #[arg(long)]
    size: Option<usize>,

    /// 📎 Identifier field(s): `user.id,tag`. Dots for nesting.
    #[arg(long)]
    id: Option<String>,

    /// 🎬 Bulk operation: index, create, update or delete.
    #[arg(long = "op-type")]
    op_type: Option<String>,

    /// 🏚️ Legacy document type.
    #[arg(long = "type")]
    doc_type: Option<String>,

    /// 🧪 Ingest pipeline.
    #[arg(long)]
    pipeline: Option<String>,

    /// 🔒 Basic auth as `user:password`.
    #[arg(long)]
    user: Option<String>,

    /// 🔓 Skip TLS certificate verification.
    #[arg(long)]
    insecure: bool,

    /// 🗜️ Treat the input as gzip no matter what its first bytes say.
    #[arg(short = 'z')]
    gzipped: bool,

    /// 🗑️ Delete the index before loading.
    #[arg(long)]
    purge: bool,

    /// ⏱️ Pause after a purge, like `1s` or `500ms`.
    #[arg(long = "purge-pause", value_parser = parse_pause_ms)]
    purge_pause_ms: Option<u64>,

    /// 🗺️ Mapping: a file path or inline JSON.
    #[arg(long)]
    mapping: Option<String>,

    /// 🏗️ Create-index settings: a file path or inline JSON.
    #[arg(long)]
    settings: Option<String>,

    /// 🪞 Drop replicas to zero during the load.
    #[arg(long = "zero-replica")]
    zero_replica: bool,

    /// ⏱️ Refresh interval to restore once the load is over.
    #[arg(long = "refresh-interval")]
    refresh_interval: Option<String>,

    /// 🩹 Skip lines that are not valid JSON.
    #[arg(long = "skip-broken")]
    skip_broken: bool,

    /// 🗣️ Say more.
    #[arg(short = 'v', long)]
    verbose: bool,

    /// 📊 Show a progress bar while reading.
    #[arg(long)]
    progress: bool,
}

/// ⏱️ `1s`, `250ms`, `2m`, or a bare number of milliseconds.
fn parse_pause_ms(raw: &str) -> Result<u64, String> {
    let the_raw = raw.trim();
    let (digits, scale) = if let Some(ms) = the_raw.strip_suffix("ms") {
        (ms, 1)
    } else if let Some(secs) = the_raw.strip_suffix('s') {
        (secs, 1000)
    } else if let Some(mins) = the_raw.strip_suffix('m') {
        (mins, 60_000)
    } else {
        (the_raw, 1)
    };
    digits
        .trim()
        .parse::<u64>()
        .map(|n| n.saturating_mul(scale))
        .map_err(|_| format!("'{raw}' is not a pause, try 1s or 500ms"))
}

/// 🧅 Flags that were actually given, shaped like `AppConfig` so figment can merge them.
#[derive(Debug, Default, Serialize)]
struct Overrides {
    source: SourceOverrides,
    sink: SinkOverrides,
    runtime: RuntimeOverrides,
    lifecycle: LifecycleOverrides,
}

#[derive(Debug, Default, Serialize)]
struct SourceOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    file_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    gzipped: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    skip_broken: Option<bool>,
}

#[derive(Debug, Default, Serialize)]
struct SinkOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    servers: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    index: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    doc_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    op_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    id_field: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pipeline: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    insecure_skip_verify: Option<bool>,
}

#[derive(Debug, Default, Serialize)]
struct RuntimeOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    workers: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    batch_size: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    progress: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    verbose: Option<bool>,
}

#[derive(Debug, Default, Serialize)]
struct LifecycleOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    purge: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    purge_pause_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    settings: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    mapping: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    zero_replica: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    refresh_interval: Option<String>,
}

impl Cli {
    /// 🧅 Switches only count when they are on, so a TOML `true` survives a missing flag.
    fn overrides(&self) -> Result<Overrides> {
        let on = |flag: bool| flag.then_some(true);
        let (username, password) = match self.user.as_deref() {
            Some(pair) => match pair.split_once(':') {
                Some((user, password)) => (Some(user.to_string()), Some(password.to_string())),
                None => bail!("💀 username and password must be separated by colon"),
            },
            None => (None, None),
        };

        Ok(Overrides {
            source: SourceOverrides {
                file_name: self.file.clone(),
                gzipped: on(self.gzipped),
                skip_broken: on(self.skip_broken),
            },
            sink: SinkOverrides {
                servers: (!self.servers.is_empty()).then(|| self.servers.clone()),
                index: self.index.clone(),
                doc_type: self.doc_type.clone(),
                op_type: self.op_type.clone(),
                id_field: self.id.clone(),
                pipeline: self.pipeline.clone(),
                username,
                password,
                insecure_skip_verify: on(self.insecure),
            },
            runtime: RuntimeOverrides {
                workers: self.workers,
                batch_size: self.size,
                progress: on(self.progress),
                verbose: on(self.verbose),
            },
            lifecycle: LifecycleOverrides {
                purge: on(self.purge),
                purge_pause_ms: self.purge_pause_ms,
                settings: self.settings.clone(),
                mapping: self.mapping.clone(),
                zero_replica: on(self.zero_replica),
                refresh_interval: self.refresh_interval.clone(),
            },
        })
    }
}

/// 🏗️ env vars, then the TOML file, then the flags. Last one wins.
fn load_app_config(cli: &Cli) -> Result<kvbulk::app_config::AppConfig> {
    if let Some(path) = &cli.config {
        let is_there = path.try_exists().with_context(|| {
            format!("💀 Could not even check whether '{}' exists", path.display())
        })?;
        if !is_there {
            bail!(
                "💀 Configuration file '{}' is not there. Relative paths are relative to where \
                 you ran this, not where you wish you ran it.",
                path.display()
            );
        }
    }
    let the_figment = kvbulk::app_config::config_figment(cli.config.as_deref())
        .merge(Serialized::defaults(cli.overrides()?));
    kvbulk::app_config::extract_config(the_figment, cli.config.as_deref())
}

/// 🧅 Peel the error onion and log every layer, with a hint if it smells like the network.
fn report_failure(err: &anyhow::Error) {
    error!("💀 error: {err}");
    let mut the_vibes_are_giving_connection_issues = false;
    for cause in err.chain().skip(1) {
        error!("⚠️  cause: {cause}");
        let cause_str = cause.to_string();
        if cause_str.contains("error sending request")
            || cause_str.contains("connection refused")
            || cause_str.contains("Connection refused")
            || cause_str.contains("tcp connect error")
            || cause_str.contains("dns error")
        {
            the_vibes_are_giving_connection_issues = true;
        }
    }
    let is_bad_config = err
        .downcast_ref::<kvbulk::errors::LoadError>()
        .is_some_and(kvbulk::errors::LoadError::is_configuration_error);
    if is_bad_config {
        error!("🔧 hint: nothing was sent. Fix the flags or the [sink]/[runtime] config and try again.");
    }
    if the_vibes_are_giving_connection_issues {
        error!(
            "🔧 hint: looks like Elasticsearch isn't reachable. Double-check --server and \
             that the cluster is actually running. If you're using Docker, `docker ps` is \
             your friend. Even clusters need a nudge sometimes. ☕"
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 📡 RUST_LOG wins when set; otherwise info, or debug with --verbose
    let the_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if cli.verbose { "debug" } else { "info" }));
    tracing_subscriber::fmt()
        .with_env_filter(the_filter)
        .with_writer(std::io::stderr)
        .init();

    let app_config = match load_app_config(&cli) {
        Ok(config) => config,
        Err(err) => {
            report_failure(&err);
            std::process::exit(1);
        }
    };

    // 🔴 Ctrl-C presses the button; restoration still runs before we leave
    let (the_button, the_listener) = kvbulk::shutdown::ShutdownTrigger::new();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("🛑 interrupt received, finishing up and restoring index settings");
            the_button.trigger();
        }
    });

    match kvbulk::run(app_config, the_listener).await {
        Ok(summary) => {
            println!("{}", summary.to_table());
            if summary.cancelled {
                info!("🛑 cancelled after {}", summary.stats_line());
                // a reader parked on stdin would keep the runtime alive forever
                std::process::exit(130);
            }
            Ok(())
        }
        Err(err) => {
            report_failure(&err);
            std::process::exit(1);
        }
    }
}
