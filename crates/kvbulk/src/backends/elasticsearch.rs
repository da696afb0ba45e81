//! # 📡 THE ELASTICSEARCH BACKEND
//!
//! 🎬 COLD OPEN — INT. SERVER ROOM — 3:47 AM
//!
//! The monitoring dashboard glows amber in the dark. One engineer, alone,
//! stares into a RED cluster. The cluster offers a 429. The engineer offers
//! a retry with exponential backoff. Nobody blinks.
//!
//! ## Knowledge Graph 🧠
//! - `ElasticsearchSinkConfig` — the `[sink]` table: servers, target index, op type,
//!   identifier fields, pipeline, auth, TLS, timeout, retry, server seed.
//! - `transport::EsTransport` — the shared client + `ServerPool` + retries. Also used by
//!   the lifecycle controller for index admin calls.
//! - `elasticsearch_sink::ElasticsearchSink` — the bulk dispatcher. One POST per batch,
//!   response parsed, item failures turned into a named error.
//!
//! 🦆 (mandatory duck, no context provided, none shall be requested)

pub(crate) mod elasticsearch_sink;
pub mod transport;

use serde::Deserialize;

use crate::transforms::OpType;

pub use elasticsearch_sink::{BulkItem, BulkItemOutcome, BulkResponse, ElasticsearchSink};
pub use transport::{EsTransport, Reply, RetryConfig, ServerPool};

/// 📡 Where the documents go and how they get there.
///
/// Servers without an `http`/`https` scheme get `http://` prepended. `localhost:9200`
/// is a server name, not a URL, and we're not going to argue about it.
#[derive(Debug, Deserialize, Clone)]
pub struct ElasticsearchSinkConfig {
    /// 📡 One or more servers. A random one per request.
    #[serde(default = "default_servers", alias = "server")]
    pub servers: Vec<String>,
    /// 📦 The target index. Empty is caught by `AppConfig::validate`.
    #[serde(default)]
    pub index: String,
    /// 🏚️ Legacy document type, for clusters that still remember them.
    #[serde(default, alias = "type")]
    pub doc_type: Option<String>,
    #[serde(default)]
    pub op_type: OpType,
    /// 📎 `user.id,tag` — comma or space separated, dots for nesting.
    #[serde(default, alias = "id")]
    pub id_field: Option<String>,
    /// 🧪 Ingest pipeline appended as `?pipeline=`.
    #[serde(default)]
    pub pipeline: Option<String>,
    /// 🔒 Username. Only used if the password shows up too.
    #[serde(default)]
    pub username: Option<String>,
    /// 🔒 Password. "password123" is not a password. It is a confession.
    #[serde(default)]
    pub password: Option<String>,
    /// 🔓 Skip TLS verification. For self-signed dev clusters and nothing else, please.
    #[serde(default)]
    pub insecure_skip_verify: bool,
    /// 🏚️ Add `include_type_name=true` to typed mapping requests.
    #[serde(default)]
    pub include_type_name: bool,
    /// ⏱️ Whole-request timeout, in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub retry: RetryConfig,
    /// 🎲 Seed for server selection. Unset means "ask the OS".
    #[serde(default)]
    pub server_seed: Option<u64>,
}

fn default_servers() -> Vec<String> {
    vec!["http://localhost:9200".to_string()]
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl Default for ElasticsearchSinkConfig {
    fn default() -> Self {
        Self {
            servers: default_servers(),
            index: String::new(),
            doc_type: None,
            op_type: OpType::default(),
            id_field: None,
            pipeline: None,
            username: None,
            password: None,
            insecure_skip_verify: false,
            include_type_name: false,
            request_timeout_secs: default_request_timeout_secs(),
            retry: RetryConfig::default(),
            server_seed: None,
        }
    }
}

impl ElasticsearchSinkConfig {
    /// 🔗 Servers with a scheme and without a trailing slash, blanks dropped.
    /// Falls back to the default server when nothing usable is left.
    pub fn normalized_servers(&self) -> Vec<String> {
        let the_servers: Vec<String> = self
            .servers
            .iter()
            .map(|server| server.trim())
            .filter(|server| !server.is_empty())
            .map(prepend_scheme)
            .collect();
        if the_servers.is_empty() {
            default_servers()
        } else {
            the_servers
        }
    }
}

/// 🔗 `localhost:9200` → `http://localhost:9200`. Schemes already present are left alone.
pub fn prepend_scheme(server: &str) -> String {
    let the_server = server.trim_end_matches('/');
    if the_server.starts_with("http") {
        the_server.to_string()
    } else {
        format!("http://{the_server}")
    }
}
