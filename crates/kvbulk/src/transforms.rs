// ai
//! 🔄 Transforms — turning raw lines into something the bulk API will accept 🎭🚀
//!
//! 🎬 COLD OPEN — INT. UNITED NATIONS — SIMULTANEOUS TRANSLATION BOOTH — 2:47 AM
//!
//! NDJSON on the left screen. The `_bulk` wire format on the right. In between:
//! a translator who has to find each document's name, write it on a header line,
//! and sometimes wrap the whole document in `{"doc": ...}` because somebody
//! said "update".
//!
//! ## Knowledge Graph 🧠
//! - `identifier`: dotted/comma field specs → document id (and `_id` eviction)
//! - `bulk`: batch of documents → [`BulkRequest`] body (header/doc pairs)
//! - Used by: `supervisors::workers::BulkWorker` on every flush
//! - Pure functions. No I/O. No async. Easy to test, easy to bench.
//!
//! ⚠️ The singularity will merge all data formats into pure consciousness.
//! Until then, we serde. 🦆

pub mod bulk;
pub mod identifier;

pub use bulk::{BulkRequest, BulkRequestBuilder, OpType};
pub use identifier::{ExtractedId, IdFieldSpec, IdValue, extract_document_id};
