pub mod validation;

use serde::{Deserialize, Serialize};

use self::validation::validate_config;

/// Error type for configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Location of the Dashboard API and the organisation every call is scoped to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardConfig {
    pub base_url: String,
    #[serde(default)]
    pub organisation_id: String,
}

/// OAuth2 authorization-code client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthConfig {
    pub client_id: String,
    #[serde(default)]
    pub client_secret_key_id: Option<String>,
    pub redirect_uri: String,
    #[serde(default = "default_oauth_scope")]
    pub scope: String,
    /// Secret-store key under which the token set is persisted.
    #[serde(default = "default_token_key_id")]
    pub token_key_id: String,
}

fn default_oauth_scope() -> String {
    "ai".to_string()
}
fn default_token_key_id() -> String {
    "dashboard_oauth_tokens".to_string()
}

/// How requests authenticate against the Dashboard API.
///
/// A static API key (looked up in the secret store) wins over OAuth when both are set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub api_key_id: Option<String>,
    #[serde(default)]
    pub oauth: Option<OAuthConfig>,
}

/// HTTP client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_stream_timeout_secs")]
    pub stream_timeout_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_pool_max_idle_per_host")]
    pub pool_max_idle_per_host: usize,
    #[serde(default = "default_pool_idle_timeout_secs")]
    pub pool_idle_timeout_secs: u64,
    #[serde(default)]
    pub use_env_proxy: bool,
}

fn default_timeout_secs() -> u64 {
    60
}
fn default_stream_timeout_secs() -> u64 {
    300
}
fn default_connect_timeout_secs() -> u64 {
    5
}
fn default_pool_max_idle_per_host() -> usize {
    8
}
fn default_pool_idle_timeout_secs() -> u64 {
    15
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            stream_timeout_secs: default_stream_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            pool_max_idle_per_host: default_pool_max_idle_per_host(),
            pool_idle_timeout_secs: default_pool_idle_timeout_secs(),
            use_env_proxy: false,
        }
    }
}

/// Cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_models_cache_ttl_secs")]
    pub models_cache_ttl_secs: u64,
}

fn default_models_cache_ttl_secs() -> u64 {
    3600
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            models_cache_ttl_secs: default_models_cache_ttl_secs(),
        }
    }
}

/// Vector database settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VdbConfig {
    /// Prefix for id-mapping keys in the state store.
    #[serde(default = "default_namespace")]
    pub namespace: String,
}

fn default_namespace() -> String {
    "dashboard_ai".to_string()
}

impl Default for VdbConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
        }
    }
}

/// Feature flags and settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeaturesConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_true")]
    pub log_usage: bool,
}

fn default_true() -> bool {
    true
}
fn default_log_level() -> String {
    "INFO".to_string()
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_usage: true,
        }
    }
}

/// Top-level provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub dashboard: DashboardConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub vdb: VdbConfig,
    #[serde(default)]
    pub features: FeaturesConfig,
}

impl ProviderConfig {
    /// Minimal API-key configuration for the given Dashboard and organisation.
    #[must_use]
    pub fn new(
        base_url: impl Into<String>,
        organisation_id: impl Into<String>,
        api_key_id: impl Into<String>,
    ) -> Self {
        Self {
            dashboard: DashboardConfig {
                base_url: base_url.into(),
                organisation_id: organisation_id.into(),
            },
            auth: AuthConfig {
                api_key_id: Some(api_key_id.into()),
                oauth: None,
            },
            http: HttpConfig::default(),
            cache: CacheConfig::default(),
            vdb: VdbConfig::default(),
            features: FeaturesConfig::default(),
        }
    }
}

/// Load configuration from a YAML file and validate it.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] when reading the file fails, [`ConfigError::Yaml`]
/// when parsing fails, or [`ConfigError::Validation`] when semantic validation fails.
pub fn load_config(path: &str) -> Result<ProviderConfig, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    parse_config(&contents)
}

/// Parse and validate configuration from YAML text.
///
/// # Errors
///
/// Returns [`ConfigError::Yaml`] or [`ConfigError::Validation`].
pub fn parse_config(contents: &str) -> Result<ProviderConfig, ConfigError> {
    let config: ProviderConfig = serde_yaml::from_str(contents)?;
    validate_config(&config)?;
    Ok(config)
}
