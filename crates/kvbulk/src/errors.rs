//! 💀 Errors — the ones with names.
//!
//! Most of kvbulk speaks `anyhow` with a `.context(...)` chain that reads like a
//! 3am incident report. But some failures deserve a proper name tag, because
//! somebody (usually a test, occasionally the CLI) wants to point at them and say
//! "that one, specifically". Those live here.
//!
//! 🧠 Knowledge graph:
//! - Configuration errors are returned by `AppConfig::validate()` before a single
//!   byte hits the network.
//! - Identifier errors come out of `transforms::identifier` and fail the whole batch.
//! - Dispatch errors come out of `backends::elasticsearch`.
//! - Worker and run errors come out of `supervisors`.
//!
//! All of them get wrapped into `anyhow::Error` on the way up. Use
//! `err.downcast_ref::<LoadError>()` to get the name tag back. 🦆

use thiserror::Error;

/// 🏷️ Every failure in kvbulk that has earned a name.
#[derive(Debug, Error)]
pub enum LoadError {
    /// 🔧 Zero workers. A pool with no swimmers.
    #[error("no workers configured")]
    NoWorkers,

    /// 🔧 Zero batch size. Not an empty batch, an invalid one.
    #[error("cannot use zero batch size")]
    InvalidBatchSize,

    /// 🔧 Nowhere to put the documents.
    #[error("index name required")]
    IndexNameRequired,

    /// 📎 An identifier path did not resolve against the document.
    #[error("document has no ID field ({field}): {document}")]
    MissingIdField { field: String, document: String },

    /// 📎 The identifier resolved to something that is not a string or a number.
    #[error("cannot convert id value to string (field {field} holds {kind})")]
    UnconvertibleId { field: String, kind: &'static str },

    /// 📎 The document could not be decoded as a JSON object.
    #[error("failed to json decode doc: {reason}")]
    InvalidDocument { reason: String },

    /// 📡 The server answered, just not with good news.
    #[error("indexing failed with {status}: {body}")]
    BulkHttpStatus { status: u16, body: String },

    /// 📡 HTTP 200, but the bulk result says `errors: true`.
    #[error(
        "error during bulk operation ({failed} item(s) failed), check error details; \
         maybe try fewer workers or increase thread_pool.write.queue_size in your nodes"
    )]
    BulkItemFailures { failed: usize },

    /// 🧵 A worker could not get its batch indexed.
    #[error("worker {worker}: worker bulk index operation failed: {detail}")]
    WorkerBulkIndex { worker: String, detail: String },

    /// 🏁 The run finished, restoration ran, but some batches did not make it.
    #[error("{failed_batches} batch(es) failed during the run")]
    RunFailed { failed_batches: usize },
}

impl LoadError {
    /// ✅ Configuration errors are the ones we can catch before doing any I/O.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            LoadError::NoWorkers | LoadError::InvalidBatchSize | LoadError::IndexNameRequired
        )
    }
}
