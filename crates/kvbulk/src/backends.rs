//! 🔌 Backends — where the real I/O happens.
//!
//! 🚰 The file backend pours lines in, the sink backends slurp bulk requests up.
//! And in between, we panic! (kidding, we use anyhow)
//!
//! 🎭 This module is the casting agency. Need to POST to a cluster? Need to stash
//! requests in RAM so a test can stare at them? We've got a backend for that.
//!
//! 🦆 The duck is here because every file must have one. This is law. Do not question the duck.

use anyhow::Result;
use async_trait::async_trait;

use crate::transforms::BulkRequest;

pub mod elasticsearch;
pub mod file;
pub mod in_mem;

pub use elasticsearch::{ElasticsearchSink, ElasticsearchSinkConfig, EsTransport, RetryConfig};
pub use file::{FileSourceConfig, LineSource};
pub use in_mem::InMemorySink;

/// 🕳️ A sink that sends ready-made bulk requests — pure I/O, zero logic.
///
/// # Contract 📜
/// - `send` delivers one bulk request. An `Err` means the batch did not make it.
/// - `close` flushes, finalizes, and bids the data a fond farewell. MUST be called.
///   Skipping `close` is a bug. It is also considered rude.
/// - Batching and request building happen in the worker, NOT here.
///
/// Ancient proverb: "He who puts business logic in the Sink, debugs in production."
#[async_trait]
pub trait Sink: std::fmt::Debug + Send {
    /// 📡 Send one bulk request. I/O only. No questions asked.
    async fn send(&mut self, request: BulkRequest) -> Result<()>;
    /// 🗑️ Flush, finalize, and release. Call this. Always. No exceptions. Not even on Fridays.
    async fn close(&mut self) -> Result<()>;
}

/// 🎭 The many faces of a Sink — a polymorphic casting call for data destinations.
///
/// Each worker gets its own clone. The enum dispatches `send` and `close` to the
/// inner concrete type, keeping the workers blissfully ignorant of where data lands.
#[derive(Debug, Clone)]
pub enum SinkBackend {
    InMemory(InMemorySink),
    Elasticsearch(ElasticsearchSink),
}

#[async_trait]
impl Sink for SinkBackend {
    async fn send(&mut self, request: BulkRequest) -> Result<()> {
        match self {
            SinkBackend::InMemory(sink) => sink.send(request).await,
            SinkBackend::Elasticsearch(sink) => sink.send(request).await,
        }
    }

    async fn close(&mut self) -> Result<()> {
        match self {
            SinkBackend::InMemory(sink) => sink.close().await,
            SinkBackend::Elasticsearch(sink) => sink.close().await,
        }
    }
}
