// ai
//! 📡 The bulk dispatcher — one batch in, one POST out, one verdict back.
//!
//! 🎬 *[a worker hands over a bulk body. it is exactly two lines per document.]*
//! *[the dispatcher rolls the dice, picks a server, and presses send.]*
//!
//! There are three ways this ends:
//! 1. The network eats the request. Retried, then reported.
//! 2. The server answers ≥ 400. Reported with status AND body, because the body is
//!    where Elasticsearch writes its poetry.
//! 3. The server answers 200 but `errors: true`. Some items failed. The whole batch
//!    is reported as failed (per-item details in the verbose log).
//!
//! ⚠️ A 504 from a proxy sometimes still carries a complete bulk response. If it parses,
//! it is not retried: we treat it like a 200 and judge the items. If it doesn't, it is
//! retried like any other throttling status, then reported as a status error.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, trace, warn};

use super::transport::{EsTransport, Reply};
use crate::backends::Sink;
use crate::errors::LoadError;
use crate::transforms::BulkRequest;

/// 📜 What `/_bulk` says back.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct BulkResponse {
    #[serde(default)]
    pub took: u64,
    #[serde(rename = "errors", default)]
    pub has_errors: bool,
    #[serde(default)]
    pub items: Vec<BulkItem>,
}

/// 📋 One item: a single-key object, keyed by the action (`index`, `create`, ...).
///
/// ⚠️ Transparent, not `flatten`: flattening buffers the numbers, and buffered
/// `arbitrary_precision` numbers refuse to become a `u16`.
#[derive(Debug, Deserialize, Clone)]
#[serde(transparent)]
pub struct BulkItem {
    actions: BTreeMap<String, BulkItemOutcome>,
}

/// 🧾 The interesting part of an item.
#[derive(Debug, Deserialize, Clone)]
pub struct BulkItemOutcome {
    #[serde(rename = "_index", default)]
    pub index: Option<String>,
    #[serde(rename = "_id", default)]
    pub id: Option<String>,
    #[serde(default)]
    pub status: u16,
    /// 💀 Object on modern clusters, plain string on ancient ones.
    #[serde(default)]
    pub error: Option<Value>,
}

impl BulkItem {
    /// 🎯 The action name and its outcome.
    pub fn outcome(&self) -> Option<(&str, &BulkItemOutcome)> {
        self.actions
            .iter()
            .next()
            .map(|(action, outcome)| (action.as_str(), outcome))
    }

    pub fn is_failure(&self) -> bool {
        self.outcome()
            .is_some_and(|(_, outcome)| outcome.error.is_some() || outcome.status >= 300)
    }
}

impl BulkResponse {
    pub fn failed_items(&self) -> impl Iterator<Item = &BulkItem> {
        self.items.iter().filter(|item| item.is_failure())
    }
}

/// 📡 The sink side of the Elasticsearch backend. Cheap to clone: one per worker.
#[derive(Debug, Clone)]
pub struct ElasticsearchSink {
    transport: EsTransport,
    verbose: bool,
}

impl ElasticsearchSink {
    pub fn new(transport: EsTransport, verbose: bool) -> Self {
        Self { transport, verbose }
    }

    /// 📡 POST one bulk body to `/_bulk` on a random server and judge the response.
    ///
    /// # Errors
    /// - transport failure after retries (with context)
    /// - [`LoadError::BulkHttpStatus`] on HTTP ≥ 400
    /// - [`LoadError::BulkItemFailures`] when the response says `errors: true`
    pub async fn dispatch(&self, request: &BulkRequest) -> Result<BulkResponse> {
        if self.verbose {
            debug!("📦 message content-length will be {}", request.body.len());
        }
        let the_query: Vec<(&str, &str)> = request
            .pipeline
            .as_deref()
            .map(|pipeline| ("pipeline", pipeline))
            .into_iter()
            .collect();

        let the_reply = self
            .transport
            .request_any_settled(
                Method::POST,
                "_bulk",
                &the_query,
                Some(request.body.clone()),
                carries_bulk_items,
            )
            .await
            .context("💀 The bulk request never made it to Elasticsearch. Check connectivity, check timeouts, check your feelings.")?;

        let the_verdict = judge_reply(the_reply)?;
        if the_verdict.has_errors {
            let failed = the_verdict.failed_items().count();
            if self.verbose {
                warn!("💀 error details:");
                for item in the_verdict.failed_items() {
                    if let Some((action, outcome)) = item.outcome() {
                        warn!(
                            "  {action} {} → {} {}",
                            outcome.id.as_deref().unwrap_or("-"),
                            outcome.status,
                            outcome.error.as_ref().map(serde_json::Value::to_string).unwrap_or_default()
                        );
                    }
                }
            }
            trace!("📜 request body: {}", request.body);
            return Err(LoadError::BulkItemFailures { failed }.into());
        }

        trace!("🚀 {} docs landed in {}ms", request.doc_count, the_verdict.took);
        Ok(the_verdict)
    }
}

/// 🧾 A 504 whose body is a bulk response with items. The batch already landed.
fn carries_bulk_items(reply: &Reply) -> bool {
    gateway_verdict(reply).is_some()
}

fn gateway_verdict(reply: &Reply) -> Option<BulkResponse> {
    if reply.status != StatusCode::GATEWAY_TIMEOUT {
        return None;
    }
    serde_json::from_str::<BulkResponse>(&reply.body)
        .ok()
        .filter(|the_response| !the_response.items.is_empty())
}

/// ⚖️ Status first, then body. A 504 gets one chance to prove it's really a 200.
fn judge_reply(reply: Reply) -> Result<BulkResponse> {
    if let Some(the_response) = gateway_verdict(&reply) {
        return Ok(the_response);
    }
    if reply.status.as_u16() >= 400 {
        return Err(LoadError::BulkHttpStatus {
            status: reply.status.as_u16(),
            body: reply.body,
        }
        .into());
    }
    serde_json::from_str(&reply.body).context(
        "💀 Elasticsearch said 200 and then sent something that isn't a bulk response. Mixed signals.",
    )
}

#[async_trait]
impl Sink for ElasticsearchSink {
    async fn send(&mut self, request: BulkRequest) -> Result<()> {
        self.dispatch(&request).await.map(|_| ())
    }

    /// 🗑️ Nothing buffered, nothing to flush. The connection pool says goodbye on drop.
    async fn close(&mut self) -> Result<()> {
        debug!("🗑️ Elasticsearch sink closing — no buffer to flush, just vibes to release");
        Ok(())
    }
}
