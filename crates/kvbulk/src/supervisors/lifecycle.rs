//! 🔁 The index lifecycle: everything that happens to the index before and after
//! the workers get their turn.
//!
//! 🎬 *[INT. CLUSTER — BEFORE THE LOAD]*
//! *[the index refreshes every second, like a nervous habit.]*
//! *[someone turns it off. the throughput doubles. nobody tells the index.]*
//!
//! ## Knowledge Graph 🧠
//! - `IndexAdmin` — the admin calls: delete, create-if-absent, put mapping, read
//!   `number_of_replicas`, put settings, flush. Delete/create/mapping go to a random
//!   server; settings and flush go to the server you name.
//! - `FastIngestGuard` — acquire: snapshot the replica count on every server, then
//!   disable refresh (and optionally drop replicas to zero) on every server. release:
//!   for every snapshotted server, last first, restore refresh, then replicas, then flush. The supervisor
//!   calls `release` on every exit path, including a failed `acquire`.
//! - `resolve_body` — a settings/mapping argument is a file path if that file exists,
//!   inline JSON otherwise.
//!
//! ⚠️ "Already exists" on index creation is recognized by exception name. That is a
//! string match against whatever the cluster version felt like calling it. 🦆

use std::path::Path;

use anyhow::{Context, Result, bail};
use reqwest::{Method, StatusCode};
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::app_config::LifecycleConfig;
use crate::backends::ElasticsearchSinkConfig;
use crate::backends::elasticsearch::{EsTransport, Reply};

/// 🏚️ What "already exists" is called, depending on which decade the cluster is from.
const ALREADY_EXISTS_MARKERS: [&str; 3] = [
    "IndexAlreadyExistsException",
    "index_already_exists_exception",
    "resource_already_exists_exception",
];

/// 📂 A settings or mapping argument: the contents of the file if the path exists,
/// the argument itself otherwise.
///
/// # Errors
/// 💀 The path exists but could not be read.
pub async fn resolve_body(raw: &str) -> Result<String> {
    let the_path = Path::new(raw);
    let is_a_file = tokio::fs::try_exists(the_path).await.unwrap_or(false);
    if !is_a_file {
        return Ok(raw.to_string());
    }
    tokio::fs::read_to_string(the_path)
        .await
        .with_context(|| format!("💀 '{raw}' exists, but reading it did not go well"))
}

/// 🔍 Does this 400 body say the index was already there?
fn says_already_exists(body: &str) -> bool {
    let the_error = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|doc| doc.get("error").cloned());
    let the_text = match the_error {
        Some(Value::String(text)) => text,
        Some(Value::Object(error)) => error
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        _ => body.to_string(),
    };
    ALREADY_EXISTS_MARKERS
        .iter()
        .any(|marker| the_text.contains(marker))
}

/// 🔧 Admin calls against one index.
#[derive(Debug, Clone)]
pub struct IndexAdmin {
    transport: EsTransport,
    index: String,
    doc_type: Option<String>,
    include_type_name: bool,
    verbose: bool,
}

impl IndexAdmin {
    pub fn new(transport: EsTransport, sink: &ElasticsearchSinkConfig, verbose: bool) -> Self {
        Self {
            transport,
            index: sink.index.trim().to_string(),
            doc_type: sink.doc_type.clone().filter(|t| !t.trim().is_empty()),
            include_type_name: sink.include_type_name,
            verbose,
        }
    }

    pub fn index(&self) -> &str {
        &self.index
    }

    /// 📡 Every configured server, normalized.
    pub fn servers(&self) -> Vec<String> {
        self.transport.pool().servers().to_vec()
    }

    /// 🗑️ Delete the index. A 404 is fine, there was nothing to purge.
    pub async fn delete_index(&self) -> Result<StatusCode> {
        let the_reply = self
            .transport
            .request_any(Method::DELETE, &self.index, &[], None)
            .await
            .context("💀 Purging the index went nowhere")?;
        info!("🗑️ purged index: {}", the_reply.status);
        Ok(the_reply.status)
    }

    /// 🏗️ Create the index unless it is already there.
    ///
    /// # Errors
    /// 💀 The create call failed with anything other than a legacy "already exists".
    pub async fn create_index(&self, body: Option<String>) -> Result<()> {
        let the_probe = self
            .transport
            .request_any(Method::GET, &self.index, &[], None)
            .await
            .context("💀 Could not check whether the index exists")?;
        if the_probe.status == StatusCode::OK {
            debug!("🏗️ index {} already exists", self.index);
            return Ok(());
        }

        let the_path = format!("{}/", self.index);
        let the_reply = self
            .transport
            .request_any(Method::PUT, &the_path, &[], Some(body.unwrap_or_default()))
            .await
            .context("💀 Creating the index went nowhere")?;
        if the_reply.status == StatusCode::BAD_REQUEST && says_already_exists(&the_reply.body) {
            debug!("🏗️ index {} showed up while we were asking", self.index);
            return Ok(());
        }
        if the_reply.status.as_u16() >= 400 {
            bail!(
                "💀 failed to create index with {}: {}",
                the_reply.status,
                the_reply.body
            );
        }
        if self.verbose {
            info!("🏗️ created index {}: {}", self.index, the_reply.status);
        }
        Ok(())
    }

    /// 🗺️ PUT a mapping. Typed mappings go to `_mapping/<type>`.
    ///
    /// # Errors
    /// 💀 Anything but a 200.
    pub async fn put_mapping(&self, body: String) -> Result<()> {
        let (the_path, the_query): (String, Vec<(&str, &str)>) = match &self.doc_type {
            Some(doc_type) if self.include_type_name => (
                format!("{}/_mapping/{doc_type}", self.index),
                vec![("include_type_name", "true")],
            ),
            Some(doc_type) => (format!("{}/_mapping/{doc_type}", self.index), Vec::new()),
            None => (format!("{}/_mapping", self.index), Vec::new()),
        };
        let the_reply = self
            .transport
            .request_any(Method::PUT, &the_path, &the_query, Some(body))
            .await
            .context("💀 Applying the mapping went nowhere")?;
        if the_reply.status != StatusCode::OK {
            bail!(
                "💀 failed to apply mapping with {}: {}",
                the_reply.status,
                the_reply.body
            );
        }
        if self.verbose {
            info!("🗺️ applied mapping: {}", the_reply.status);
        }
        Ok(())
    }

    /// 🪞 The current `number_of_replicas`, as the server spells it.
    ///
    /// # Errors
    /// 💀 A non-200, or a settings document without the value where it should be.
    pub async fn number_of_replicas(&self, server: &str) -> Result<String> {
        let the_path = format!("{}/_settings", self.index);
        let the_reply = self
            .transport
            .request(server, Method::GET, &the_path, &[], None)
            .await
            .with_context(|| format!("💀 could not get settings from {server}"))?;
        if the_reply.status != StatusCode::OK {
            bail!(
                "💀 could not get settings: {server}/{the_path} answered {}",
                the_reply.status
            );
        }
        let the_doc: Value = serde_json::from_str(&the_reply.body)
            .with_context(|| format!("💀 settings from {server} are not JSON"))?;
        let the_value = the_doc
            .get(&self.index)
            .and_then(|doc| doc.pointer("/settings/index/number_of_replicas"))
            .with_context(|| format!("💀 no number_of_replicas for {} on {server}", self.index))?;
        match the_value {
            Value::String(text) => Ok(text.clone()),
            Value::Number(number) => Ok(number.to_string()),
            other => bail!("💀 number_of_replicas on {server} is {other}, not a count"),
        }
    }

    /// ⚙️ PUT one `_settings` body on one server. The reply is returned as-is.
    pub async fn put_settings(&self, server: &str, body: &Value) -> Result<Reply> {
        let the_path = format!("{}/_settings", self.index);
        let the_body = body.to_string();
        let the_reply = self
            .transport
            .request(server, Method::PUT, &the_path, &[], Some(the_body.clone()))
            .await
            .with_context(|| format!("💀 applying {the_body} on {server} went nowhere"))?;
        if self.verbose {
            info!("⚙️ applied setting: {the_body} with status {}", the_reply.status);
        }
        Ok(the_reply)
    }

    /// 💾 Flush the index on one server.
    pub async fn flush(&self, server: &str) -> Result<()> {
        let the_path = format!("{}/_flush", self.index);
        let the_reply = self
            .transport
            .request(server, Method::POST, &the_path, &[], None)
            .await
            .with_context(|| format!("💀 flushing {} on {server} went nowhere", self.index))?;
        if the_reply.status.as_u16() >= 400 {
            bail!("💀 flush on {server} failed with {}: {}", the_reply.status, the_reply.body);
        }
        Ok(())
    }

    /// ⚙️ `put_settings`, with anything at or above 400 turned into an error.
    async fn put_settings_strict(&self, server: &str, body: &Value) -> Result<()> {
        let the_reply = self.put_settings(server, body).await?;
        if the_reply.status.as_u16() >= 400 {
            bail!("💀 got {}: {}", the_reply.status, the_reply.body);
        }
        Ok(())
    }
}

/// 📸 What one server looked like before we touched it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicaSnapshot {
    pub server: String,
    pub number_of_replicas: String,
}

/// 🏎️ Fast-ingest mode for the length of a run.
///
/// `acquire` records a snapshot of every server before changing any of them, so
/// `release` restores exactly the servers that were touched, even after a partial
/// `acquire`, and never restores a value this run wrote.
#[derive(Debug)]
pub struct FastIngestGuard {
    snapshots: Vec<ReplicaSnapshot>,
    refresh_interval: String,
    zero_replica: bool,
}

impl FastIngestGuard {
    pub fn new(lifecycle: &LifecycleConfig) -> Self {
        Self {
            snapshots: Vec::new(),
            refresh_interval: lifecycle.refresh_interval.clone(),
            zero_replica: lifecycle.zero_replica,
        }
    }

    pub fn snapshots(&self) -> &[ReplicaSnapshot] {
        &self.snapshots
    }

    /// 🏎️ Snapshot replicas on every server, then disable refresh (and optionally zero
    /// the replicas) on every server.
    ///
    /// Servers are usually nodes of one cluster, so every snapshot is read before
    /// the first change goes out.
    ///
    /// # Errors
    /// 💀 The first server that refused. Servers snapshotted before it stay snapshotted.
    pub async fn acquire(&mut self, admin: &IndexAdmin) -> Result<()> {
        for the_server in admin.servers() {
            let the_replicas = admin.number_of_replicas(&the_server).await?;
            if admin.verbose {
                info!("🪞 on shutdown, number_of_replicas will be set back to {the_replicas}");
                info!(
                    "⏱️ on shutdown, refresh_interval will be set back to {}",
                    self.refresh_interval
                );
            }
            self.snapshots.push(ReplicaSnapshot {
                server: the_server,
                number_of_replicas: the_replicas,
            });
        }

        for the_snapshot in &self.snapshots {
            let the_server = the_snapshot.server.as_str();
            admin
                .put_settings_strict(the_server, &json!({"index": {"refresh_interval": "-1"}}))
                .await
                .with_context(|| format!("💀 disabling refresh on {the_server} failed"))?;
            if self.zero_replica {
                admin
                    .put_settings_strict(the_server, &json!({"index": {"number_of_replicas": 0}}))
                    .await
                    .with_context(|| format!("💀 zeroing replicas on {the_server} failed"))?;
            }
        }
        Ok(())
    }

    /// 🧹 Restore refresh, then replicas, then flush, on every snapshotted server,
    /// last snapshot first.
    ///
    /// A failing server does not stop the others.
    ///
    /// # Errors
    /// 💀 The first failure, after every server has been tried.
    pub async fn release(self, admin: &IndexAdmin) -> Result<()> {
        let mut first_failure: Option<anyhow::Error> = None;
        for the_snapshot in self.snapshots.iter().rev() {
            if let Err(err) = self.restore_one(admin, the_snapshot).await {
                warn!("🧹 restoring {} failed: {err:#}", the_snapshot.server);
                first_failure.get_or_insert(err);
            }
        }
        match first_failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn restore_one(&self, admin: &IndexAdmin, snapshot: &ReplicaSnapshot) -> Result<()> {
        let the_server = snapshot.server.as_str();
        admin
            .put_settings_strict(
                the_server,
                &json!({"index": {"refresh_interval": self.refresh_interval}}),
            )
            .await
            .with_context(|| format!("💀 restoring refresh_interval on {the_server} failed"))?;
        admin
            .put_settings_strict(
                the_server,
                &json!({"index": {"number_of_replicas": snapshot.number_of_replicas}}),
            )
            .await
            .with_context(|| format!("💀 restoring number_of_replicas on {the_server} failed"))?;
        admin.flush(the_server).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::RetryConfig;
    use std::io::Write;
    use std::sync::{Arc, Mutex};
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

    fn admin_for(server: &MockServer, doc_type: Option<&str>, include_type_name: bool) -> Result<IndexAdmin> {
        let mut the_config: ElasticsearchSinkConfig = serde_json::from_str(r#"{"index":"abc"}"#)?;
        the_config.servers = vec![server.uri()];
        the_config.doc_type = doc_type.map(str::to_string);
        the_config.include_type_name = include_type_name;
        the_config.retry = RetryConfig {
            max_retries: 0,
            initial_backoff_ms: 1,
            max_backoff_ms: 1,
        };
        Ok(IndexAdmin::new(EsTransport::new(&the_config)?, &the_config, true))
    }

    fn settings_doc(replicas: &str) -> Value {
        json!({"abc": {"settings": {"index": {"number_of_replicas": replicas}}}})
    }

    #[test]
    fn the_one_where_every_era_of_already_exists_is_recognized() {
        assert!(says_already_exists(
            r#"{"error":"IndexAlreadyExistsException[[abc] already exists]","status":400}"#
        ));
        assert!(says_already_exists(
            r#"{"error":{"type":"resource_already_exists_exception","reason":"index [abc] already exists"},"status":400}"#
        ));
        assert!(!says_already_exists(
            r#"{"error":{"type":"mapper_parsing_exception"},"status":400}"#
        ));
    }

    #[tokio::test]
    async fn the_one_where_an_existing_index_is_left_alone() -> Result<()> {
        let the_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/abc"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
            .expect(1)
            .mount(&the_server)
            .await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&the_server)
            .await;

        admin_for(&the_server, None, false)?
            .create_index(Some(r#"{"settings":{}}"#.to_string()))
            .await?;
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_a_legacy_already_exists_400_is_forgiven() -> Result<()> {
        let the_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/abc"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&the_server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/abc/"))
            .and(body_json(json!({"settings": {"number_of_shards": 1}})))
            .respond_with(ResponseTemplate::new(400).set_body_string(
                r#"{"error":"IndexAlreadyExistsException[[abc] already exists]","status":400}"#,
            ))
            .expect(1)
            .mount(&the_server)
            .await;

        admin_for(&the_server, None, false)?
            .create_index(Some(r#"{"settings":{"number_of_shards":1}}"#.to_string()))
            .await?;
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_a_real_400_on_create_carries_its_body() -> Result<()> {
        let the_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&the_server)
            .await;
        Mock::given(method("PUT"))
            .respond_with(
                ResponseTemplate::new(400)
                    .set_body_string(r#"{"error":{"type":"mapper_parsing_exception"}}"#),
            )
            .mount(&the_server)
            .await;

        let the_error = admin_for(&the_server, None, false)?
            .create_index(None)
            .await
            .err()
            .expect("💀 a mapper_parsing_exception is not 'already exists'");
        let the_message = format!("{the_error:#}");
        assert!(the_message.contains("400"), "{the_message}");
        assert!(the_message.contains("mapper_parsing_exception"), "{the_message}");
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_typed_mappings_remember_include_type_name() -> Result<()> {
        let the_server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/abc/_mapping/doc"))
            .and(query_param("include_type_name", "true"))
            .and(body_json(json!({"properties": {"n": {"type": "long"}}})))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"acknowledged":true}"#))
            .expect(1)
            .mount(&the_server)
            .await;

        admin_for(&the_server, Some("doc"), true)?
            .put_mapping(r#"{"properties":{"n":{"type":"long"}}}"#.to_string())
            .await?;
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_a_rejected_mapping_is_an_error() -> Result<()> {
        let the_server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/abc/_mapping"))
            .respond_with(ResponseTemplate::new(400).set_body_string("no"))
            .mount(&the_server)
            .await;

        let the_result = admin_for(&the_server, None, false)?
            .put_mapping("{}".to_string())
            .await;
        assert!(format!("{:#}", the_result.err().expect("💀 should fail")).contains("failed to apply mapping"));
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_fast_ingest_comes_and_goes_in_order() -> Result<()> {
        let the_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/abc/_settings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(settings_doc("2")))
            .expect(1)
            .mount(&the_server)
            .await;
        for the_body in [
            json!({"index": {"refresh_interval": "-1"}}),
            json!({"index": {"number_of_replicas": 0}}),
            json!({"index": {"refresh_interval": "30s"}}),
            json!({"index": {"number_of_replicas": "2"}}),
        ] {
            Mock::given(method("PUT"))
                .and(path("/abc/_settings"))
                .and(body_json(the_body))
                .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"acknowledged":true}"#))
                .expect(1)
                .mount(&the_server)
                .await;
        }
        Mock::given(method("POST"))
            .and(path("/abc/_flush"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
            .expect(1)
            .mount(&the_server)
            .await;

        let the_admin = admin_for(&the_server, None, false)?;
        let mut the_guard = FastIngestGuard::new(&LifecycleConfig {
            zero_replica: true,
            refresh_interval: "30s".to_string(),
            ..LifecycleConfig::default()
        });
        the_guard.acquire(&the_admin).await?;
        assert_eq!(the_guard.snapshots().len(), 1);
        assert_eq!(the_guard.snapshots()[0].number_of_replicas, "2");
        the_guard.release(&the_admin).await?;

        // 🧾 refresh restored before replicas, flush last
        let the_log: Vec<String> = the_server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .map(|r| format!("{} {}", r.method, String::from_utf8_lossy(&r.body)))
            .collect();
        let the_refresh = the_log.iter().position(|l| l.contains("\"30s\""));
        let the_replicas = the_log.iter().position(|l| l.contains("\"2\""));
        let the_flush = the_log.iter().position(|l| l.starts_with("POST"));
        assert!(the_refresh.is_some() && the_flush.is_some(), "{the_log:?}");
        assert!(the_refresh < the_replicas && the_replicas < the_flush, "{the_log:?}");
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_a_failed_acquire_still_gets_cleaned_up() -> Result<()> {
        let the_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/abc/_settings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(settings_doc("1")))
            .mount(&the_server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/abc/_settings"))
            .and(body_json(json!({"index": {"refresh_interval": "-1"}})))
            .respond_with(ResponseTemplate::new(500).set_body_string("cluster says no"))
            .mount(&the_server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/abc/_settings"))
            .and(body_json(json!({"index": {"refresh_interval": "1s"}})))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&the_server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/abc/_settings"))
            .and(body_json(json!({"index": {"number_of_replicas": "1"}})))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&the_server)
            .await;
        Mock::given(method("POST"))
            .and(path("/abc/_flush"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&the_server)
            .await;

        let the_admin = admin_for(&the_server, None, false)?;
        let mut the_guard = FastIngestGuard::new(&LifecycleConfig::default());
        let the_acquired = the_guard.acquire(&the_admin).await;
        assert!(format!("{:#}", the_acquired.err().expect("💀 500 on refresh")).contains("cluster says no"));
        the_guard.release(&the_admin).await?;
        Ok(())
    }

    /// 🧪 One cluster's `_settings`, shared by every URL that points at it.
    #[derive(Clone)]
    struct SharedReplicas(Arc<Mutex<String>>);

    impl Respond for SharedReplicas {
        fn respond(&self, request: &Request) -> ResponseTemplate {
            let mut the_replicas = self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            if request.method == Method::PUT {
                let the_body: Value = serde_json::from_slice(&request.body).unwrap_or_default();
                match the_body.pointer("/index/number_of_replicas") {
                    Some(Value::String(text)) => *the_replicas = text.clone(),
                    Some(Value::Number(number)) => *the_replicas = number.to_string(),
                    _ => {}
                }
                return ResponseTemplate::new(200).set_body_string(r#"{"acknowledged":true}"#);
            }
            ResponseTemplate::new(200).set_body_json(settings_doc(&the_replicas))
        }
    }

    #[tokio::test]
    async fn the_one_where_two_doors_into_one_cluster_restore_the_real_count() -> Result<()> {
        let the_server = MockServer::start().await;
        let the_cluster = SharedReplicas(Arc::new(Mutex::new("2".to_string())));
        Mock::given(path("/abc/_settings"))
            .respond_with(the_cluster.clone())
            .mount(&the_server)
            .await;
        Mock::given(method("POST"))
            .and(path("/abc/_flush"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
            .expect(2)
            .mount(&the_server)
            .await;

        let the_port = the_server.address().port();
        let mut the_config: ElasticsearchSinkConfig = serde_json::from_str(r#"{"index":"abc"}"#)?;
        the_config.servers = vec![
            format!("http://127.0.0.1:{the_port}"),
            format!("http://localhost:{the_port}"),
        ];
        the_config.retry.max_retries = 0;
        let the_admin = IndexAdmin::new(EsTransport::new(&the_config)?, &the_config, false);

        let mut the_guard = FastIngestGuard::new(&LifecycleConfig {
            zero_replica: true,
            ..LifecycleConfig::default()
        });
        the_guard.acquire(&the_admin).await?;
        let the_seen: Vec<&str> = the_guard
            .snapshots()
            .iter()
            .map(|snapshot| snapshot.number_of_replicas.as_str())
            .collect();
        assert_eq!(the_seen, vec!["2", "2"]);
        assert_eq!(*the_cluster.0.lock().unwrap_or_else(|p| p.into_inner()), "0");

        the_guard.release(&the_admin).await?;
        assert_eq!(*the_cluster.0.lock().unwrap_or_else(|p| p.into_inner()), "2");
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_a_missing_replica_count_is_not_guessed() -> Result<()> {
        let the_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/abc/_settings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"abc": {"settings": {}}})))
            .mount(&the_server)
            .await;

        let the_admin = admin_for(&the_server, None, false)?;
        let mut the_guard = FastIngestGuard::new(&LifecycleConfig::default());
        assert!(the_guard.acquire(&the_admin).await.is_err());
        assert!(the_guard.snapshots().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_bodies_come_from_files_or_thin_air() -> Result<()> {
        let mut the_file = tempfile::NamedTempFile::new()?;
        the_file.write_all(br#"{"settings":{"number_of_shards":3}}"#)?;
        the_file.flush()?;

        let the_path = the_file.path().display().to_string();
        assert_eq!(
            resolve_body(&the_path).await?,
            r#"{"settings":{"number_of_shards":3}}"#
        );
        assert_eq!(resolve_body(r#"{"inline":true}"#).await?, r#"{"inline":true}"#);
        Ok(())
    }
}
