use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Metadata field carrying the caller-supplied document id.
pub const LONG_ID_FIELD: &str = "long_id";

/// Bounds for the number of matches a query may ask for.
pub const QUERY_LIMIT_MIN: usize = 1;
pub const QUERY_LIMIT_MAX: usize = 20;

/// A remote vector collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VectorCollection {
    pub id: String,
    pub name: String,
    #[serde(default, alias = "embedding_model", skip_serializing_if = "Option::is_none")]
    pub embedding_model: Option<String>,
}

/// A document to upload.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorDocument {
    pub content: String,
    pub metadata: Map<String, Value>,
    pub vector: Option<Vec<f32>>,
    pub long_id: Option<String>,
}

impl VectorDocument {
    #[must_use]
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            metadata: Map::new(),
            vector: None,
            long_id: None,
        }
    }

    #[must_use]
    pub fn with_long_id(mut self, long_id: impl Into<String>) -> Self {
        self.long_id = Some(long_id.into());
        self
    }

    #[must_use]
    pub fn with_vector(mut self, vector: Vec<f32>) -> Self {
        self.vector = Some(vector);
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// What to search a collection with.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryInput {
    /// Embedded remotely with the collection's model.
    Text(String),
    Vector(Vec<f32>),
}

/// One query hit.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryMatch {
    pub document_id: String,
    pub long_id: Option<String>,
    pub content: Option<String>,
    pub score: Option<f64>,
    pub metadata: Map<String, Value>,
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CreateCollectionBody<'a> {
    pub name: &'a str,
    pub embedding_model: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct UploadBody<'a> {
    pub documents: Vec<UploadDocument<'a>>,
}

#[derive(Debug, Serialize)]
pub(crate) struct UploadDocument<'a> {
    pub content: &'a str,
    pub metadata: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vector: Option<&'a [f32]>,
}

impl<'a> UploadDocument<'a> {
    /// Wire form of a document; the long id travels in metadata.
    pub(crate) fn from_document(document: &'a VectorDocument) -> Self {
        let mut metadata = document.metadata.clone();
        if let Some(long_id) = document.long_id.as_deref() {
            metadata.insert(LONG_ID_FIELD.to_string(), Value::String(long_id.to_string()));
        }
        Self {
            content: &document.content,
            metadata,
            vector: document.vector.as_deref(),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct QueryBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vector: Option<&'a [f32]>,
    pub limit: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,
}

#[derive(Debug, Serialize)]
pub(crate) struct DeleteByMetadataBody<'a> {
    pub field: &'a str,
    pub values: &'a [String],
}

#[derive(Debug, Serialize)]
pub(crate) struct PurgeBody {
    pub all: bool,
}

/// Clamp a requested match count into the supported range.
#[must_use]
pub fn clamp_query_limit(limit: usize) -> usize {
    limit.clamp(QUERY_LIMIT_MIN, QUERY_LIMIT_MAX)
}

/// Pull a list out of `{<key>: [...]}` for any of `keys`, or a bare array.
pub(crate) fn list_items<'a>(value: &'a Value, keys: &[&str]) -> &'a [Value] {
    if let Value::Array(items) = value {
        return items;
    }
    keys.iter()
        .find_map(|key| value.get(*key).and_then(Value::as_array))
        .map_or(&[][..], Vec::as_slice)
}

/// Parse one query hit. Hits without a document id are dropped.
pub(crate) fn parse_match(hit: &Value) -> Option<QueryMatch> {
    let document_id = hit
        .get("id")
        .or_else(|| hit.get("documentId"))
        .and_then(Value::as_str)?
        .to_string();
    let metadata = hit
        .get("metadata")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    let long_id = metadata
        .get(LONG_ID_FIELD)
        .and_then(Value::as_str)
        .map(str::to_string);
    Some(QueryMatch {
        document_id,
        long_id,
        content: hit.get("content").and_then(Value::as_str).map(str::to_string),
        score: hit
            .get("score")
            .or_else(|| hit.get("similarity"))
            .and_then(Value::as_f64),
        metadata,
    })
}
