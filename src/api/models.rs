use crate::error::ProviderError;
use crate::protocol::canonical::{ModelCapability, ModelDescriptor};
use crate::state::{fallback_models, parse_models_payload, ProviderState};

/// Used when a model publishes no context window.
pub const DEFAULT_MAX_INPUT_TOKENS: u64 = 8192;
/// Used when a model publishes no output limit.
pub const DEFAULT_MAX_OUTPUT_TOKENS: u64 = 4096;

/// Models offering every capability in `filter`.
///
/// Served from the cache within its TTL unless `bypass_cache` is set. Never
/// fails: when the catalog cannot be fetched the built-in list is filtered
/// and returned instead.
pub async fn get_models(
    state: &ProviderState,
    filter: &[ModelCapability],
    bypass_cache: bool,
) -> Vec<ModelDescriptor> {
    let cache = state.models_cache();
    if !bypass_cache {
        if let Some(models) = cache.get(filter) {
            return models;
        }
    }

    match fetch_catalog(state).await {
        Ok(catalog) => {
            let models: Vec<ModelDescriptor> = catalog
                .into_iter()
                .filter(|model| model.supports_all(filter))
                .collect();
            cache.store(filter, &models);
            models
        }
        Err(err) => {
            tracing::warn!(error = %err, "Model catalog unavailable, using built-in list");
            fallback_models()
                .into_iter()
                .filter(|model| model.supports_all(filter))
                .collect()
        }
    }
}

async fn fetch_catalog(state: &ProviderState) -> Result<Vec<ModelDescriptor>, ProviderError> {
    let token = state.bearer_token().await?;
    let raw = state
        .transport
        .get_json(state.endpoints.models(), &token)
        .await?;
    let models = parse_models_payload(&raw);
    if models.is_empty() {
        return Err(ProviderError::Translation(
            "model catalog is empty".to_string(),
        ));
    }
    Ok(models)
}

/// Descriptor for one model id, if the catalog knows it.
pub async fn get_model_details(state: &ProviderState, model_id: &str) -> Option<ModelDescriptor> {
    get_models(state, &[], false)
        .await
        .into_iter()
        .find(|model| model.id == model_id)
}

/// Context window of `model_id`, or [`DEFAULT_MAX_INPUT_TOKENS`].
pub async fn max_input_tokens(state: &ProviderState, model_id: &str) -> u64 {
    let limit = get_model_details(state, model_id)
        .await
        .and_then(|model| model.context_window)
        .filter(|&tokens| tokens > 0);
    limit.unwrap_or_else(|| {
        tracing::info!(model_id, "No context window published, using default");
        DEFAULT_MAX_INPUT_TOKENS
    })
}

/// Output limit of `model_id`, or [`DEFAULT_MAX_OUTPUT_TOKENS`].
pub async fn max_output_tokens(state: &ProviderState, model_id: &str) -> u64 {
    let limit = get_model_details(state, model_id)
        .await
        .and_then(|model| model.max_output_tokens)
        .filter(|&tokens| tokens > 0);
    limit.unwrap_or_else(|| {
        tracing::info!(model_id, "No output limit published, using default");
        DEFAULT_MAX_OUTPUT_TOKENS
    })
}
