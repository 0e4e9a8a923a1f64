//! Vector collection operations against the Dashboard vector database.
//!
//! Collections are addressed by name or by remote id. A name costs one list
//! call per operation; an id-shaped argument is used as is. The local id
//! mapping is always keyed by collection name, so operations that touch it
//! with an id-shaped argument first look the name up by id.

use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::error::ProviderError;
use crate::state::ProviderState;
use crate::vdb::types::{
    list_items, parse_match, CreateCollectionBody, DeleteByMetadataBody, PurgeBody, QueryBody,
    UploadBody, UploadDocument,
};
use crate::vdb::{
    clamp_query_limit, is_collection_id, QueryInput, QueryMatch, VectorCollection,
    VectorDocument, LONG_ID_FIELD,
};

const COLLECTION_LIST_KEYS: &[&str] = &["collections", "data"];
const DOCUMENT_LIST_KEYS: &[&str] = &["documents", "data"];
const MATCH_LIST_KEYS: &[&str] = &["results", "matches", "data"];

// ---------------------------------------------------------------------------
// Collections
// ---------------------------------------------------------------------------

/// Create a collection embedding with `embedding_model`.
///
/// # Errors
///
/// Returns [`ProviderError::InvalidRequest`] for an empty name and
/// [`ProviderError::Translation`] when the answer is not a collection.
pub async fn create_collection(
    state: &ProviderState,
    name: &str,
    embedding_model: &str,
) -> Result<VectorCollection, ProviderError> {
    if name.trim().is_empty() {
        return Err(ProviderError::InvalidRequest(
            "collection name cannot be empty".to_string(),
        ));
    }
    let token = state.bearer_token().await?;
    let raw = state
        .transport
        .post_json(
            state.endpoints.collections(),
            &token,
            &CreateCollectionBody {
                name,
                embedding_model,
            },
        )
        .await?;
    let collection = parse_collection(raw.get("collection").unwrap_or(&raw))?;
    tracing::info!(collection = %collection.name, id = %collection.id, "Vector collection created");
    Ok(collection)
}

/// All collections of the organisation.
///
/// # Errors
///
/// Returns auth/transport/upstream errors from the call.
pub async fn list_collections(state: &ProviderState) -> Result<Vec<VectorCollection>, ProviderError> {
    let token = state.bearer_token().await?;
    fetch_collections(state, &token).await
}

/// Look a collection up by name or id.
///
/// # Errors
///
/// Returns [`ProviderError::NotFound`] when no collection matches.
pub async fn get_collection(
    state: &ProviderState,
    name_or_id: &str,
) -> Result<VectorCollection, ProviderError> {
    let token = state.bearer_token().await?;
    if is_collection_id(name_or_id) {
        return lookup_collection(state, &token, name_or_id).await;
    }
    fetch_collections(state, &token)
        .await?
        .into_iter()
        .find(|collection| collection.name == name_or_id)
        .ok_or_else(|| collection_not_found(name_or_id))
}

/// Delete a collection and forget its id mapping.
///
/// # Errors
///
/// Returns [`ProviderError::NotFound`] for an unknown name, upstream errors
/// from the delete, and [`ProviderError::Storage`] when the mapping cannot be
/// cleared.
pub async fn delete_collection(state: &ProviderState, name_or_id: &str) -> Result<(), ProviderError> {
    let token = state.bearer_token().await?;
    let id = resolve_collection_id(state, &token, name_or_id).await?;
    let name = mapping_name(state, &token, name_or_id).await?;
    state
        .transport
        .delete(state.endpoints.collection(&id), &token)
        .await
        .map_err(|err| not_found_on_404(err, name_or_id))?;
    state.id_mappings().clear(&name)?;
    tracing::info!(collection = %name, id = %id, "Vector collection deleted");
    Ok(())
}

// ---------------------------------------------------------------------------
// Documents
// ---------------------------------------------------------------------------

/// Upload `documents` in one batch and record their long ids.
///
/// Returns the remote document ids in input order. The batch either lands
/// whole or fails whole; the mapping is only touched on success.
///
/// # Errors
///
/// Returns [`ProviderError::Translation`] when the answer does not carry one
/// id per document, plus resolution/auth/transport/upstream errors.
pub async fn upload_documents(
    state: &ProviderState,
    collection: &str,
    documents: &[VectorDocument],
) -> Result<Vec<String>, ProviderError> {
    if documents.is_empty() {
        return Ok(Vec::new());
    }
    let token = state.bearer_token().await?;
    let id = resolve_collection_id(state, &token, collection).await?;
    let name = if documents.iter().any(|document| document.long_id.is_some()) {
        Some(mapping_name(state, &token, collection).await?)
    } else {
        None
    };
    let body = UploadBody {
        documents: documents.iter().map(UploadDocument::from_document).collect(),
    };
    let raw = state
        .transport
        .post_json(state.endpoints.documents(&id), &token, &body)
        .await?;

    let document_ids = parse_document_ids(&raw);
    if document_ids.len() != documents.len() {
        return Err(ProviderError::Translation(format!(
            "uploaded {} documents but received {} ids",
            documents.len(),
            document_ids.len()
        )));
    }

    let pairs: Vec<(String, String)> = documents
        .iter()
        .zip(&document_ids)
        .filter_map(|(document, document_id)| {
            document
                .long_id
                .clone()
                .map(|long_id| (long_id, document_id.clone()))
        })
        .collect();
    if let Some(name) = name {
        state.id_mappings().insert_many(&name, pairs)?;
    }
    tracing::debug!(collection, count = document_ids.len(), "Vector documents uploaded");
    Ok(document_ids)
}

/// Nearest documents to `input`. `limit` is clamped to 1..=20.
///
/// # Errors
///
/// Returns [`ProviderError::NotFound`] for an unknown collection name, plus
/// auth/transport/upstream errors.
pub async fn query(
    state: &ProviderState,
    collection: &str,
    input: &QueryInput,
    limit: usize,
    threshold: Option<f64>,
) -> Result<Vec<QueryMatch>, ProviderError> {
    let token = state.bearer_token().await?;
    let id = resolve_collection_id(state, &token, collection).await?;
    let (text, vector) = match input {
        QueryInput::Text(text) => (Some(text.as_str()), None),
        QueryInput::Vector(vector) => (None, Some(vector.as_slice())),
    };
    let body = QueryBody {
        query: text,
        vector,
        limit: clamp_query_limit(limit),
        threshold,
    };
    let raw = state
        .transport
        .post_json(state.endpoints.query(&id), &token, &body)
        .await?;

    let mut matches: Vec<QueryMatch> = list_items(&raw, MATCH_LIST_KEYS)
        .iter()
        .filter_map(parse_match)
        .collect();
    if matches.iter().any(|hit| hit.long_id.is_none()) {
        let name = match mapping_name(state, &token, collection).await {
            Ok(name) => name,
            Err(err) => {
                tracing::warn!(collection, error = %err, "Cannot recover long ids for query matches");
                return Ok(matches);
            }
        };
        let reverse: FxHashMap<String, String> = state
            .id_mappings()
            .get(&name)
            .into_iter()
            .map(|(long_id, document_id)| (document_id, long_id))
            .collect();
        for hit in matches.iter_mut().filter(|hit| hit.long_id.is_none()) {
            hit.long_id = reverse.get(&hit.document_id).cloned();
        }
    }
    Ok(matches)
}

/// Delete every document whose metadata `field` is one of `values`.
///
/// Failures are logged and reported as `false`.
pub async fn delete_by_metadata(
    state: &ProviderState,
    collection: &str,
    field: &str,
    values: &[String],
) -> bool {
    if values.is_empty() {
        return true;
    }
    match try_delete_by_metadata(state, collection, field, values).await {
        Ok(()) => true,
        Err(err) => {
            tracing::warn!(collection, field, error = %err, "Vector document delete failed");
            false
        }
    }
}

async fn try_delete_by_metadata(
    state: &ProviderState,
    collection: &str,
    field: &str,
    values: &[String],
) -> Result<(), ProviderError> {
    let token = state.bearer_token().await?;
    let id = resolve_collection_id(state, &token, collection).await?;
    send_metadata_delete(state, &token, &id, field, values).await
}

async fn send_metadata_delete(
    state: &ProviderState,
    token: &str,
    id: &str,
    field: &str,
    values: &[String],
) -> Result<(), ProviderError> {
    state
        .transport
        .post_json(
            state.endpoints.documents_delete(id),
            token,
            &DeleteByMetadataBody { field, values },
        )
        .await?;
    Ok(())
}

/// Delete documents by the long ids they were uploaded with.
///
/// Failures are logged and reported as `false`.
pub async fn delete_documents(state: &ProviderState, collection: &str, long_ids: &[String]) -> bool {
    if long_ids.is_empty() {
        return true;
    }
    let result = async {
        let token = state.bearer_token().await?;
        let id = resolve_collection_id(state, &token, collection).await?;
        let name = mapping_name(state, &token, collection).await?;
        send_metadata_delete(state, &token, &id, LONG_ID_FIELD, long_ids).await?;
        state.id_mappings().remove_many(&name, long_ids)
    }
    .await;
    match result {
        Ok(()) => true,
        Err(err) => {
            tracing::warn!(collection, error = %err, "Vector document delete failed");
            false
        }
    }
}

/// Delete all documents of a collection, keeping the collection itself.
///
/// Failures are logged and reported as `false`.
pub async fn purge(state: &ProviderState, collection: &str) -> bool {
    let result = async {
        let token = state.bearer_token().await?;
        let id = resolve_collection_id(state, &token, collection).await?;
        let name = mapping_name(state, &token, collection).await?;
        state
            .transport
            .post_json(
                state.endpoints.documents_delete(&id),
                &token,
                &PurgeBody { all: true },
            )
            .await?;
        state.id_mappings().clear(&name)
    }
    .await;
    match result {
        Ok(()) => {
            tracing::info!(collection, "Vector collection purged");
            true
        }
        Err(err) => {
            tracing::warn!(collection, error = %err, "Vector collection purge failed");
            false
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Remote id for `name_or_id`: verbatim when id-shaped, otherwise one list
/// call and an exact name match.
///
/// # Errors
///
/// Returns [`ProviderError::NotFound`] when no collection has that name.
pub async fn resolve_collection_id(
    state: &ProviderState,
    token: &str,
    name_or_id: &str,
) -> Result<String, ProviderError> {
    if is_collection_id(name_or_id) {
        return Ok(name_or_id.to_string());
    }
    fetch_collections(state, token)
        .await?
        .into_iter()
        .find(|collection| collection.name == name_or_id)
        .map(|collection| collection.id)
        .ok_or_else(|| collection_not_found(name_or_id))
}

/// Name the id mapping is keyed by: the argument itself when it is a name,
/// otherwise looked up with one `GET` on the collection.
async fn mapping_name(
    state: &ProviderState,
    token: &str,
    name_or_id: &str,
) -> Result<String, ProviderError> {
    if !is_collection_id(name_or_id) {
        return Ok(name_or_id.to_string());
    }
    Ok(lookup_collection(state, token, name_or_id).await?.name)
}

async fn lookup_collection(
    state: &ProviderState,
    token: &str,
    id: &str,
) -> Result<VectorCollection, ProviderError> {
    let raw = state
        .transport
        .get_json(state.endpoints.collection(id), token)
        .await
        .map_err(|err| not_found_on_404(err, id))?;
    parse_collection(raw.get("collection").unwrap_or(&raw))
}

async fn fetch_collections(
    state: &ProviderState,
    token: &str,
) -> Result<Vec<VectorCollection>, ProviderError> {
    let raw = state
        .transport
        .get_json(state.endpoints.collections(), token)
        .await?;
    Ok(list_items(&raw, COLLECTION_LIST_KEYS)
        .iter()
        .filter_map(|item| match parse_collection(item) {
            Ok(collection) => Some(collection),
            Err(err) => {
                tracing::warn!(error = %err, "Skipping unreadable collection entry");
                None
            }
        })
        .collect())
}

fn parse_collection(value: &Value) -> Result<VectorCollection, ProviderError> {
    serde_json::from_value(value.clone())
        .map_err(|err| ProviderError::Translation(format!("invalid collection: {err}")))
}

/// Ids from `{documents: [{id}]}`, `{ids: [..]}` or a bare array of either.
fn parse_document_ids(raw: &Value) -> Vec<String> {
    let items = match raw.get("ids").and_then(Value::as_array) {
        Some(ids) => ids.as_slice(),
        None => list_items(raw, DOCUMENT_LIST_KEYS),
    };
    items
        .iter()
        .filter_map(|item| {
            item.as_str()
                .or_else(|| item.get("id").and_then(Value::as_str))
                .map(str::to_string)
        })
        .collect()
}

fn collection_not_found(name_or_id: &str) -> ProviderError {
    ProviderError::NotFound(format!("vector collection '{name_or_id}'"))
}

fn not_found_on_404(err: ProviderError, name_or_id: &str) -> ProviderError {
    match err {
        ProviderError::Upstream { status: 404, .. } => collection_not_found(name_or_id),
        other => other,
    }
}
