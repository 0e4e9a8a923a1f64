use crate::config::ConfigError;

/// Error type shared by every provider operation.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("Config error: {0}")]
    Config(String),
    #[error("Auth error: {0}")]
    Auth(String),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Transport error: {context}: {source}")]
    Transport {
        context: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("Upstream error: status={status}, message={message}")]
    Upstream { status: u16, message: String },
    #[error("Protocol translation error: {0}")]
    Translation(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Storage error: {0}")]
    Storage(String),
}

/// Broad error category, mostly derived from upstream HTTP status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    InvalidRequest,
    Authentication,
    Permission,
    NotFound,
    RateLimit,
    ServerError,
    Unknown,
}

/// Map an upstream HTTP status code to an error category.
#[must_use]
pub fn category_from_upstream_status(status: u16) -> ErrorCategory {
    match status {
        400 | 422 => ErrorCategory::InvalidRequest,
        401 => ErrorCategory::Authentication,
        403 => ErrorCategory::Permission,
        404 => ErrorCategory::NotFound,
        429 => ErrorCategory::RateLimit,
        500..=599 => ErrorCategory::ServerError,
        _ => ErrorCategory::Unknown,
    }
}

impl ProviderError {
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            ProviderError::InvalidRequest(_) => ErrorCategory::InvalidRequest,
            ProviderError::Auth(_) => ErrorCategory::Authentication,
            ProviderError::NotFound(_) => ErrorCategory::NotFound,
            ProviderError::Config(_)
            | ProviderError::Transport { .. }
            | ProviderError::Translation(_)
            | ProviderError::Storage(_) => ErrorCategory::ServerError,
            ProviderError::Upstream { status, .. } => category_from_upstream_status(*status),
        }
    }

    /// Wrap a reqwest failure, keeping it as the error source.
    pub(crate) fn transport(context: impl Into<String>, source: reqwest::Error) -> Self {
        ProviderError::Transport {
            context: context.into(),
            source,
        }
    }

    /// True for failures that happened before anything was sent upstream.
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(self, ProviderError::Config(_))
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        ProviderError::transport("reading upstream body", err)
    }
}

impl From<ConfigError> for ProviderError {
    fn from(err: ConfigError) -> Self {
        ProviderError::Config(err.to_string())
    }
}
