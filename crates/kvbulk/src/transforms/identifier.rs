//! 📎 Identifier extraction — peeking inside a document to find out who it is.
//!
//! 🎬 COLD OPEN — INT. DMV — WINDOW 3 — 10:14 AM
//!
//! "Name?" "It's in the document." "Which part of the document?" "`user.id`, then
//! `tag`, no separator." The clerk sighs, opens the JSON, walks into `user`, finds
//! `id`, then comes back out for `tag`, glues them together, and stamps the form.
//! The document now has an identity. It did not ask for one.
//!
//! ## Knowledge Graph 🧠
//! - Input: raw document text + an `IdFieldSpec` (comma/space separated field paths,
//!   dots for nesting: `"user.id,tag"`).
//! - Numbers are resolved as their exact textual token (serde_json `arbitrary_precision`),
//!   so `18446744073709551616` stays `18446744073709551616` and never becomes a float.
//! - Resolved values become an [`IdValue`]: text, numeric literal, or unsupported.
//! - If one of the paths is literally `_id`, that key is removed from the document
//!   and the rewritten text is handed back. Otherwise the original text is reused as-is.
//! - Used by: `transforms::bulk::BulkRequestBuilder`, once per document.
//!
//! ⚠️ Any failure here fails the whole batch, not just the document. 🦆

use serde_json::{Map, Value};

use crate::errors::LoadError;

/// 📎 The reserved metadata key that collides with the bulk action header.
const RESERVED_ID_FIELD: &str = "_id";

/// 🗺️ One dotted path, pre-split. `user.id` → `["user", "id"]`.
#[derive(Debug, Clone, PartialEq, Eq)]
struct FieldPath {
    raw: String,
    segments: Vec<String>,
}

/// 📋 A parsed identifier field specification.
///
/// `"user.id,tag"` and `"user.id tag"` both mean: resolve `user` → `id`, then `tag`,
/// and concatenate the results in that order with no separator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdFieldSpec {
    paths: Vec<FieldPath>,
}

impl IdFieldSpec {
    /// 🔧 Parse a spec. Returns `None` when the spec names no fields at all
    /// (empty, or nothing but commas and spaces).
    pub fn parse(spec: &str) -> Option<Self> {
        let paths: Vec<FieldPath> = spec
            .split([',', ' '])
            .filter(|field| !field.is_empty())
            .map(|field| FieldPath {
                raw: field.to_string(),
                segments: field.split('.').map(str::to_string).collect(),
            })
            .collect();
        if paths.is_empty() {
            None
        } else {
            Some(Self { paths })
        }
    }

    /// 🔎 Does any path name the reserved `_id` key, literally?
    pub fn names_reserved_id(&self) -> bool {
        self.paths.iter().any(|path| path.raw == RESERVED_ID_FIELD)
    }

    /// 📜 The field paths, as written.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.paths.iter().map(|path| path.raw.as_str())
    }
}

/// 🏷️ What a resolved identifier leaf turned out to be.
///
/// Strings pass through. Numbers keep their exact token. Everything else
/// (objects, arrays, booleans, null) is unsupported and names its kind for the error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdValue<'a> {
    Text(&'a str),
    Numeric(String),
    Unsupported(&'static str),
}

impl<'a> From<&'a Value> for IdValue<'a> {
    fn from(value: &'a Value) -> Self {
        match value {
            Value::String(text) => IdValue::Text(text),
            Value::Number(number) => IdValue::Numeric(number.to_string()),
            Value::Null => IdValue::Unsupported("null"),
            Value::Bool(_) => IdValue::Unsupported("boolean"),
            Value::Array(_) => IdValue::Unsupported("array"),
            Value::Object(_) => IdValue::Unsupported("object"),
        }
    }
}

/// ✅ The result of a successful extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedId {
    /// 📎 All resolved values, concatenated in spec order.
    pub id: String,
    /// ✂️ `Some` only when `_id` was requested and removed from the document.
    pub rewritten_document: Option<String>,
}

/// 📎 Resolve the identifier for one document.
///
/// # Errors
/// - [`LoadError::InvalidDocument`] if the text is not a JSON object
/// - [`LoadError::MissingIdField`] if a path does not resolve (names the path and the document)
/// - [`LoadError::UnconvertibleId`] if a path resolves to a non-string, non-number value
pub fn extract_document_id(document: &str, spec: &IdFieldSpec) -> Result<ExtractedId, LoadError> {
    let mut the_tree: Map<String, Value> =
        serde_json::from_str(document).map_err(|err| LoadError::InvalidDocument {
            reason: err.to_string(),
        })?;

    let mut id = String::new();
    for path in &spec.paths {
        let leaf = resolve_path(&the_tree, path).ok_or_else(|| LoadError::MissingIdField {
            field: path.raw.clone(),
            document: document.to_string(),
        })?;
        match IdValue::from(leaf) {
            IdValue::Text(text) => id.push_str(text),
            IdValue::Numeric(token) => id.push_str(&token),
            IdValue::Unsupported(kind) => {
                return Err(LoadError::UnconvertibleId {
                    field: path.raw.clone(),
                    kind,
                });
            }
        }
    }

    // ✂️ only touch the document if `_id` was asked for by name
    let rewritten_document = if spec.names_reserved_id() {
        the_tree.shift_remove(RESERVED_ID_FIELD);
        let rewritten = serde_json::to_string(&the_tree).map_err(|err| LoadError::InvalidDocument {
            reason: err.to_string(),
        })?;
        Some(rewritten)
    } else {
        None
    };

    Ok(ExtractedId {
        id,
        rewritten_document,
    })
}

/// 🗺️ Walk the tree one segment at a time. Every intermediate hop must be an object.
fn resolve_path<'a>(tree: &'a Map<String, Value>, path: &FieldPath) -> Option<&'a Value> {
    let (leaf_key, parents) = path.segments.split_last()?;
    let mut current = tree;
    for segment in parents {
        current = current.get(segment)?.as_object()?;
    }
    current.get(leaf_key)
}
