// ai
//! 📡 Bulk Request Builder — formatting batches for the bulk API's peculiar tastes 🚀🔄
//!
//! 🎬 COLD OPEN — INT. ELASTICSEARCH CLUSTER — BULK ENDPOINT — HIGH NOON
//!
//! The bulk API has rules. Unwritten rules. Well, written rules, but in a
//! documentation page with three contradictory examples in the same paragraph.
//!
//! Rule 1: Two lines per document. Action header, then document. Always.
//! Rule 2: Newline-delimited. Not comma-separated. Not XML. NEWLINES.
//! Rule 3: The body ends with a newline. It MATTERS.
//!
//! ## Knowledge Graph 🧠
//! - Input: a batch of raw document lines + the builder's target (index, type, op, id spec, pipeline)
//! - Header: `{"<op>":{"_index":"<index>"[,"_type":"<type>"][,"_id":"<id>"]}}`
//! - `update` wraps the body as `{"doc":<original>,"doc_as_upsert":true}`
//! - Blank / whitespace-only documents contribute nothing. Not a header, not a body. Nothing.
//! - `_id` extraction is delegated to `transforms::identifier`; any failure fails the batch.
//! - Output: [`BulkRequest`] — the body plus the pipeline the dispatcher appends to `/_bulk`.
//!
//! ⚠️ When the singularity happens, the bulk API will still require two lines
//! per document. Some things transcend consciousness. 🦆

use std::fmt;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::transforms::identifier::{IdFieldSpec, extract_document_id};

/// 🎬 The four verbs of the bulk API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpType {
    #[default]
    Index,
    Create,
    Update,
    Delete,
}

impl OpType {
    /// 📛 The exact key the action header uses.
    pub fn as_str(&self) -> &'static str {
        match self {
            OpType::Index => "index",
            OpType::Create => "create",
            OpType::Update => "update",
            OpType::Delete => "delete",
        }
    }
}

impl fmt::Display for OpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 📦 One ready-to-POST bulk request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkRequest {
    /// 📜 Alternating header/document lines, each `\n`-terminated.
    pub body: String,
    /// 🔢 How many documents made it into the body (blanks excluded).
    pub doc_count: usize,
    /// 🧪 Optional ingest pipeline, appended as `?pipeline=` by the dispatcher.
    pub pipeline: Option<String>,
}

impl BulkRequest {
    /// 🕳️ Nothing to send? Then don't.
    ///
    /// A batch of nothing but blank documents builds to an empty body with a
    /// `doc_count` of zero. Workers skip such requests instead of POSTing them.
    pub fn is_empty(&self) -> bool {
        self.doc_count == 0
    }
}

/// 🏗️ Builds bulk bodies for one target. Immutable after construction,
/// shared read-only across every worker.
#[derive(Debug, Clone)]
pub struct BulkRequestBuilder {
    index: String,
    doc_type: Option<String>,
    op_type: OpType,
    id_spec: Option<IdFieldSpec>,
    pipeline: Option<String>,
}

impl BulkRequestBuilder {
    /// 🚀 A builder that `index`es into `index`, no type, no ids, no pipeline.
    pub fn new(index: impl Into<String>) -> Self {
        Self {
            index: index.into(),
            doc_type: None,
            op_type: OpType::Index,
            id_spec: None,
            pipeline: None,
        }
    }

    /// 🏚️ Legacy document type. Empty strings mean "no type".
    pub fn with_doc_type(mut self, doc_type: Option<String>) -> Self {
        self.doc_type = doc_type.filter(|t| !t.is_empty());
        self
    }

    pub fn with_op_type(mut self, op_type: OpType) -> Self {
        self.op_type = op_type;
        self
    }

    /// 📎 Identifier field spec. Blank specs are ignored.
    pub fn with_id_field(mut self, id_field: Option<&str>) -> Self {
        self.id_spec = id_field.and_then(IdFieldSpec::parse);
        self
    }

    pub fn with_pipeline(mut self, pipeline: Option<String>) -> Self {
        self.pipeline = pipeline.filter(|p| !p.is_empty());
        self
    }

    pub fn op_type(&self) -> OpType {
        self.op_type
    }

    /// 🔄 Turn a batch into one bulk request.
    ///
    /// Produces `header\ndoc\n` per non-blank document, in batch order. Blank
    /// documents add nothing, so an all-blank batch yields an empty request
    /// (see [`BulkRequest::is_empty`]).
    ///
    /// # Errors
    /// 💀 Identifier extraction failures for any document fail the whole batch.
    pub fn build(&self, docs: &[String]) -> Result<BulkRequest> {
        // 🧮 vibes-based capacity estimate: doc + ~96 bytes of header
        let estimated_size: usize = docs.iter().map(|doc| doc.len() + 96).sum();
        let mut body = String::with_capacity(estimated_size);
        let mut doc_count = 0usize;

        for doc in docs {
            if doc.trim().is_empty() {
                continue;
            }

            let (id, rewritten) = match &self.id_spec {
                Some(spec) => {
                    let extracted = extract_document_id(doc, spec)
                        .context("💀 Could not work out a document's identity. The whole batch goes down with it.")?;
                    (Some(extracted.id), extracted.rewritten_document)
                }
                None => (None, None),
            };
            let the_document = rewritten.as_deref().unwrap_or(doc);

            body.push_str(&self.action_header(id)?);
            body.push('\n');
            if self.op_type == OpType::Update {
                body.push_str("{\"doc\":");
                body.push_str(the_document);
                body.push_str(",\"doc_as_upsert\":true}");
            } else {
                body.push_str(the_document);
            }
            body.push('\n');
            doc_count += 1;
        }

        Ok(BulkRequest {
            body,
            doc_count,
            pipeline: self.pipeline.clone(),
        })
    }

    /// 📋 `{"<op>":{"_index":...,"_type":...,"_id":...}}`, keys in that order.
    fn action_header(&self, id: Option<String>) -> Result<String> {
        let mut the_metadata = Map::new();
        the_metadata.insert("_index".to_string(), Value::String(self.index.clone()));
        if let Some(ref doc_type) = self.doc_type {
            the_metadata.insert("_type".to_string(), Value::String(doc_type.clone()));
        }
        if let Some(id) = id {
            the_metadata.insert("_id".to_string(), Value::String(id));
        }

        let mut the_action = Map::new();
        the_action.insert(self.op_type.as_str().to_string(), Value::Object(the_metadata));
        serde_json::to_string(&the_action).context(
            "💀 Failed to serialize bulk action metadata. \
             The JSON that describes JSON has failed to become JSON.",
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn docs(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|d| d.to_string()).collect()
    }

    #[test]
    fn the_one_where_every_doc_gets_a_header_and_a_trailing_newline() -> Result<()> {
        let the_builder = BulkRequestBuilder::new("abc");
        let the_request = the_builder.build(&docs(&[r#"{"a":1}"#, r#"{"a":2}"#]))?;
        assert_eq!(
            the_request.body,
            "{\"index\":{\"_index\":\"abc\"}}\n{\"a\":1}\n{\"index\":{\"_index\":\"abc\"}}\n{\"a\":2}\n"
        );
        assert_eq!(the_request.doc_count, 2);
        assert_eq!(the_request.pipeline, None);
        Ok(())
    }

    #[test]
    fn the_one_where_blank_docs_vanish_without_a_trace() -> Result<()> {
        let the_batch = docs(&[r#"{"a":1}"#, "", "   \t", r#"{"a":2}"#, " "]);
        let the_request = BulkRequestBuilder::new("abc").build(&the_batch)?;
        let the_lines: Vec<&str> = the_request.body.split('\n').collect();
        // 2 docs → 4 lines, plus the empty string after the final newline
        assert_eq!(the_lines.len(), 5);
        assert_eq!(the_lines[4], "");
        assert_eq!(the_request.doc_count, 2);
        for (i, line) in the_lines[..4].iter().enumerate() {
            let parsed: Value = serde_json::from_str(line)?;
            assert_eq!(parsed.get("index").is_some(), i % 2 == 0, "line {i} alternation broke");
        }
        Ok(())
    }

    #[test]
    fn the_one_where_an_all_blank_batch_is_empty() -> Result<()> {
        let the_request = BulkRequestBuilder::new("abc").build(&docs(&["", "  "]))?;
        assert!(the_request.is_empty());
        assert!(the_request.body.is_empty());
        Ok(())
    }

    #[test]
    fn the_one_where_type_and_id_join_the_header() -> Result<()> {
        let the_builder = BulkRequestBuilder::new("abc")
            .with_doc_type(Some("any".to_string()))
            .with_id_field(Some("user.id,tag"));
        let the_request =
            the_builder.build(&docs(&[r#"{"user": {"id": "42"}, "tag": "x"}"#]))?;
        let the_header = the_request.body.lines().next().unwrap_or_default();
        assert_eq!(the_header, r#"{"index":{"_index":"abc","_type":"any","_id":"42x"}}"#);
        Ok(())
    }

    #[test]
    fn the_one_where_underscore_id_moves_from_body_to_header() -> Result<()> {
        let the_builder = BulkRequestBuilder::new("abc").with_id_field(Some("_id"));
        let the_request = the_builder.build(&docs(&[r#"{"_id": "7", "v": 1}"#]))?;
        let the_lines: Vec<&str> = the_request.body.lines().collect();
        let the_header: Value = serde_json::from_str(the_lines[0])?;
        assert_eq!(the_header["index"]["_id"], "7");
        let the_body: Value = serde_json::from_str(the_lines[1])?;
        assert_eq!(the_body, serde_json::json!({"v": 1}));
        Ok(())
    }

    #[test]
    fn the_one_where_update_wraps_the_doc_as_an_upsert() -> Result<()> {
        let the_builder = BulkRequestBuilder::new("abc")
            .with_op_type(OpType::Update)
            .with_id_field(Some("id"));
        let the_request = the_builder.build(&docs(&[r#"{"id":"1","n":2}"#]))?;
        let the_lines: Vec<&str> = the_request.body.lines().collect();
        assert_eq!(the_lines[0], r#"{"update":{"_index":"abc","_id":"1"}}"#);
        let the_body: Value = serde_json::from_str(the_lines[1])?;
        assert_eq!(the_body["doc"]["n"], 2);
        assert_eq!(the_body["doc_as_upsert"], true);
        Ok(())
    }

    #[test]
    fn the_one_where_a_missing_id_sinks_the_whole_batch() {
        let the_builder = BulkRequestBuilder::new("abc").with_id_field(Some("id"));
        let the_result = the_builder.build(&docs(&[r#"{"id":"1"}"#, r#"{"nope":"2"}"#]));
        let the_error = the_result.unwrap_err();
        let the_cause = the_error
            .downcast_ref::<crate::errors::LoadError>()
            .expect("💀 LoadError should be in the chain");
        assert!(matches!(
            the_cause,
            crate::errors::LoadError::MissingIdField { .. }
        ));
    }

    #[test]
    fn the_one_where_the_pipeline_rides_along_and_blanks_are_ignored() -> Result<()> {
        let the_request = BulkRequestBuilder::new("abc")
            .with_pipeline(Some("geoip".to_string()))
            .with_id_field(Some(" "))
            .with_doc_type(Some(String::new()))
            .build(&docs(&[r#"{"a":1}"#]))?;
        assert_eq!(the_request.pipeline.as_deref(), Some("geoip"));
        assert!(the_request.body.starts_with(r#"{"index":{"_index":"abc"}}"#));
        Ok(())
    }

    #[test]
    fn the_one_where_op_types_speak_lowercase() -> Result<()> {
        let the_parsed: OpType = serde_json::from_str("\"create\"")?;
        assert_eq!(the_parsed, OpType::Create);
        assert_eq!(OpType::Delete.to_string(), "delete");
        assert_eq!(OpType::default(), OpType::Index);
        Ok(())
    }
}
