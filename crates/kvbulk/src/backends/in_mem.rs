//! # Previously, on kvbulk...
//!
//! 🎬 The cluster was not invited. It was a test, after all, and tests have no
//! patience for port 9200. Someone had to stand in. Someone had to nod politely,
//! accept every bulk request, and remember each one for the cross-examination.
//!
//! That someone was this module.
//!
//! [`InMemorySink`] collects every [`BulkRequest`] it receives behind an
//! `Arc<Mutex<...>>` so the test that handed it off can inspect what arrived later.
//! It can also be told to reject requests carrying a marker, or to take its time,
//! for tests about failure reporting and cancellation.
//!
//! ⚠️ This is NOT for production. This is for tests. If you're deploying this
//! to prod, please also deploy a therapist. 🦆

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::backends::Sink;
use crate::transforms::BulkRequest;

/// 📦 A sink that never forgets.
///
/// Clone-able because tests need to peek inside after handing a copy to every worker.
/// The `Arc` means everyone shares the same Vec.
#[derive(Debug, Default, Clone)]
pub struct InMemorySink {
    /// 🔒 The evidence locker. Every request that made it, in arrival order.
    received: Arc<Mutex<Vec<BulkRequest>>>,
    /// 🙅 Requests whose body contains this marker are rejected.
    reject_marker: Option<String>,
    /// 🐢 Artificial latency per send.
    latency: Option<Duration>,
}

impl InMemorySink {
    /// 🚀 An empty Vec, full of potential, unmarred by bulk requests.
    pub fn new() -> Self {
        Self::default()
    }

    /// 🙅 Reject any request whose body contains `marker`. Rejected requests are not recorded.
    pub fn rejecting(mut self, marker: impl Into<String>) -> Self {
        self.reject_marker = Some(marker.into());
        self
    }

    /// 🐢 Sleep this long inside every `send`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// 📋 A snapshot of everything received so far.
    pub async fn received(&self) -> Vec<BulkRequest> {
        self.received.lock().await.clone()
    }

    /// 🔢 Documents received so far, across every request.
    pub async fn doc_count(&self) -> usize {
        self.received.lock().await.iter().map(|r| r.doc_count).sum()
    }
}

#[async_trait]
impl Sink for InMemorySink {
    async fn send(&mut self, request: BulkRequest) -> Result<()> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if let Some(marker) = &self.reject_marker {
            if request.body.contains(marker.as_str()) {
                anyhow::bail!("💀 in-memory sink rejected a request carrying '{marker}'");
            }
        }
        self.received.lock().await.push(request);
        Ok(())
    }

    /// 🗑️ Nothing to clean up. We live in RAM.
    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transforms::BulkRequestBuilder;

    #[tokio::test]
    async fn the_one_where_clones_share_one_memory() -> Result<()> {
        let the_sink = InMemorySink::new();
        let mut the_clone = the_sink.clone();
        let the_request = BulkRequestBuilder::new("abc").build(&[r#"{"a":1}"#.to_string()])?;
        the_clone.send(the_request).await?;
        the_clone.close().await?;
        assert_eq!(the_sink.received().await.len(), 1);
        assert_eq!(the_sink.doc_count().await, 1);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_the_bouncer_checks_for_the_marker() -> Result<()> {
        let mut the_sink = InMemorySink::new().rejecting("poison");
        let the_builder = BulkRequestBuilder::new("abc");
        assert!(the_sink
            .send(the_builder.build(&[r#"{"poison":true}"#.to_string()])?)
            .await
            .is_err());
        the_sink
            .send(the_builder.build(&[r#"{"fine":true}"#.to_string()])?)
            .await?;
        assert_eq!(the_sink.received().await.len(), 1);
        Ok(())
    }
}
