use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::protocol::canonical::{ModelCapability, ModelDescriptor};
use crate::protocol::mapping::{remote_capability_to_canonical, RemoteCapability};
use crate::store::Cache;

const CACHE_KEY_PREFIX: &str = "dashboard_ai.models";

/// Model catalog cached in the host's short-term cache, one entry per
/// capability filter.
pub(crate) struct ModelsCache {
    cache: Arc<dyn Cache>,
    ttl: Duration,
}

impl ModelsCache {
    #[must_use]
    pub(crate) fn new(cache: Arc<dyn Cache>, ttl_secs: u64) -> Self {
        Self {
            cache,
            ttl: Duration::from_secs(ttl_secs),
        }
    }

    /// Cached list for `filter`, if present and readable.
    #[must_use]
    pub(crate) fn get(&self, filter: &[ModelCapability]) -> Option<Vec<ModelDescriptor>> {
        let key = cache_key(filter);
        let value = self.cache.get(&key)?;
        match serde_json::from_value(value) {
            Ok(models) => Some(models),
            Err(err) => {
                tracing::warn!(key, error = %err, "Dropping unreadable cached model list");
                self.cache.invalidate(&key);
                None
            }
        }
    }

    pub(crate) fn store(&self, filter: &[ModelCapability], models: &[ModelDescriptor]) {
        if self.ttl.is_zero() {
            return;
        }
        match serde_json::to_value(models) {
            Ok(value) => self.cache.set(&cache_key(filter), value, self.ttl),
            Err(err) => tracing::warn!(error = %err, "Failed to encode model list for cache"),
        }
    }
}

/// Cache key for a capability filter. Order and duplicates in `filter` do
/// not change the key.
#[must_use]
pub(crate) fn cache_key(filter: &[ModelCapability]) -> String {
    let sorted: BTreeSet<ModelCapability> = filter.iter().copied().collect();
    let mut key = String::from(CACHE_KEY_PREFIX);
    if sorted.is_empty() {
        key.push_str(".all");
    }
    for capability in sorted {
        key.push('.');
        key.push_str(capability.as_str());
    }
    key
}

/// Models offered when the remote catalog cannot be reached.
#[must_use]
pub(crate) fn fallback_models() -> Vec<ModelDescriptor> {
    use ModelCapability as C;
    let entry = |id: &str, name: &str, provider: &str, window: u64, out: u64, caps: &[C]| {
        ModelDescriptor {
            id: id.to_string(),
            name: name.to_string(),
            provider: provider.to_string(),
            context_window: Some(window),
            max_output_tokens: Some(out),
            capabilities: caps.iter().copied().collect(),
        }
    };
    vec![
        entry(
            "anthropic.claude-3-5-sonnet",
            "Claude 3.5 Sonnet",
            "anthropic",
            200_000,
            8_192,
            &[
                C::Chat,
                C::ChatWithImageVision,
                C::ChatWithTools,
                C::ChatJsonOutput,
                C::ChatStructuredResponse,
                C::ChatSystemRole,
            ],
        ),
        entry(
            "amazon.nova-lite",
            "Nova Lite",
            "amazon",
            300_000,
            5_000,
            &[C::Chat, C::ChatWithImageVision, C::ChatWithTools, C::ChatSystemRole],
        ),
        entry(
            "amazon.titan-embed-text-v2",
            "Titan Text Embeddings V2",
            "amazon",
            8_192,
            0,
            &[C::Embeddings],
        ),
        entry(
            "amazon.titan-image-generator-v2",
            "Titan Image Generator V2",
            "amazon",
            512,
            0,
            &[C::TextToImage],
        ),
    ]
}

/// Parse the remote catalog: `{models: [...]}`, `{data: [...]}` or a bare array.
#[must_use]
pub(crate) fn parse_models_payload(payload: &Value) -> Vec<ModelDescriptor> {
    let items = match payload {
        Value::Array(items) => items.as_slice(),
        _ => payload
            .get("models")
            .or_else(|| payload.get("data"))
            .and_then(Value::as_array)
            .map_or(&[][..], Vec::as_slice),
    };
    items.iter().filter_map(parse_model_entry).collect()
}

fn parse_model_entry(item: &Value) -> Option<ModelDescriptor> {
    let id = item
        .get("id")
        .or_else(|| item.get("modelId"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|id| !id.is_empty())?
        .to_string();
    let name = item
        .get("name")
        .and_then(Value::as_str)
        .map_or_else(|| id.clone(), str::to_string);
    let provider = item
        .get("provider")
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| id.split_once('.').map(|(prefix, _)| prefix.to_string()))
        .unwrap_or_default();
    let number = |camel: &str, snake: &str| {
        item.get(camel)
            .or_else(|| item.get(snake))
            .and_then(Value::as_u64)
    };
    let capabilities = item
        .get("capabilities")
        .and_then(Value::as_array)
        .map(|flags| {
            flags
                .iter()
                .filter_map(|flag| serde_json::from_value::<RemoteCapability>(flag.clone()).ok())
                .filter_map(remote_capability_to_canonical)
                .collect()
        })
        .unwrap_or_default();
    Some(ModelDescriptor {
        context_window: number("contextWindow", "context_window"),
        max_output_tokens: number("maxOutputTokens", "max_output_tokens"),
        id,
        name,
        provider,
        capabilities,
    })
}
