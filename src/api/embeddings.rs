use serde::Serialize;
use serde_json::Value;

use crate::error::ProviderError;
use crate::state::ProviderState;

#[derive(Debug, Serialize)]
struct EmbeddingsBody<'a> {
    model: &'a str,
    input: &'a [String],
}

/// Embed `inputs` with `model`, one vector per input in order.
///
/// # Errors
///
/// Returns [`ProviderError::Translation`] when the answer does not carry one
/// vector per input, plus auth/transport/upstream errors from the call.
pub async fn embeddings(
    state: &ProviderState,
    model: &str,
    inputs: &[String],
) -> Result<Vec<Vec<f32>>, ProviderError> {
    if inputs.is_empty() {
        return Ok(Vec::new());
    }
    let token = state.bearer_token().await?;
    let raw = state
        .transport
        .post_json(
            state.endpoints.embeddings(),
            &token,
            &EmbeddingsBody {
                model,
                input: inputs,
            },
        )
        .await?;
    let vectors = parse_embeddings(&raw)?;
    if vectors.len() != inputs.len() {
        return Err(ProviderError::Translation(format!(
            "expected {} embeddings, got {}",
            inputs.len(),
            vectors.len()
        )));
    }
    tracing::debug!(model, count = vectors.len(), "Dashboard embeddings completed");
    Ok(vectors)
}

/// Accepts `{embeddings: [[..]]}` and `{data: [{embedding: [..]}]}`.
fn parse_embeddings(raw: &Value) -> Result<Vec<Vec<f32>>, ProviderError> {
    if let Some(rows) = raw.get("embeddings").and_then(Value::as_array) {
        return rows.iter().map(parse_vector).collect();
    }
    if let Some(rows) = raw.get("data").and_then(Value::as_array) {
        return rows
            .iter()
            .map(|row| parse_vector(row.get("embedding").unwrap_or(&Value::Null)))
            .collect();
    }
    Err(ProviderError::Translation(
        "embeddings response carries neither `embeddings` nor `data`".to_string(),
    ))
}

#[allow(clippy::cast_possible_truncation)]
fn parse_vector(row: &Value) -> Result<Vec<f32>, ProviderError> {
    let Some(items) = row.as_array() else {
        return Err(ProviderError::Translation(
            "embedding is not an array".to_string(),
        ));
    };
    items
        .iter()
        .map(|item| {
            item.as_f64().map(|v| v as f32).ok_or_else(|| {
                ProviderError::Translation("embedding component is not a number".to_string())
            })
        })
        .collect()
}
