mod models_cache;
mod request_id;

use std::sync::Arc;

use crate::auth::Authenticator;
use crate::config::validation::validate_config;
use crate::config::ProviderConfig;
use crate::error::ProviderError;
use crate::store::{Cache, SecretStore, StateStore};
use crate::transport::{Endpoints, HttpTransport};
use crate::vdb::IdMappingTable;

pub(crate) use models_cache::{fallback_models, parse_models_payload, ModelsCache};
use request_id::RequestIdGenerator;

/// Everything a provider operation needs: validated config, the HTTP
/// transport, credentials and the host collaborators.
pub struct ProviderState {
    pub config: ProviderConfig,
    pub endpoints: Endpoints,
    pub transport: HttpTransport,
    pub authenticator: Authenticator,
    caches: CacheState,
    infra: InfraState,
}

struct CacheState {
    models: ModelsCache,
    id_mappings: IdMappingTable,
}

struct InfraState {
    request_ids: RequestIdGenerator,
}

impl ProviderState {
    /// Validate `config` and wire up transport, auth and caches.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Config`] when the config is invalid or the
    /// HTTP client cannot be built.
    pub fn new(
        config: ProviderConfig,
        secrets: Arc<dyn SecretStore>,
        cache: Arc<dyn Cache>,
        state_store: Arc<dyn StateStore>,
    ) -> Result<Self, ProviderError> {
        validate_config(&config)?;
        let endpoints = Endpoints::new(&config.dashboard)?;
        let transport = HttpTransport::new(&config.http)?;
        let authenticator = Authenticator::new(config.auth.clone(), secrets);
        let models = ModelsCache::new(cache, config.cache.models_cache_ttl_secs);
        let id_mappings = IdMappingTable::new(state_store, config.vdb.namespace.clone());

        tracing::debug!(
            base_url = %config.dashboard.base_url,
            organisation_id = %config.dashboard.organisation_id,
            "Dashboard provider initialised"
        );

        Ok(Self {
            config,
            endpoints,
            transport,
            authenticator,
            caches: CacheState {
                models,
                id_mappings,
            },
            infra: InfraState {
                request_ids: RequestIdGenerator::new(),
            },
        })
    }

    /// Bearer token for the next Dashboard call.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Auth`] when no credential is available.
    pub async fn bearer_token(&self) -> Result<String, ProviderError> {
        self.authenticator
            .bearer_token(&self.transport, &self.endpoints)
            .await
    }

    #[must_use]
    pub fn id_mappings(&self) -> &IdMappingTable {
        &self.caches.id_mappings
    }

    pub(crate) fn models_cache(&self) -> &ModelsCache {
        &self.caches.models
    }

    pub(crate) fn next_request_id(&self) -> uuid::Uuid {
        self.infra.request_ids.next_id()
    }
}
