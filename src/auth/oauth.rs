//! OAuth2 authorization-code flow against the Dashboard identity endpoints.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::config::OAuthConfig;
use crate::error::ProviderError;
use crate::store::SecretStore;
use crate::transport::{Endpoints, HttpTransport};
use crate::util::unix_now_secs;

/// Tokens are treated as expired this long before the server says so.
pub const EXPIRY_BUFFER_SECS: u64 = 60;

const DEFAULT_EXPIRES_IN_SECS: u64 = 3600;

/// Persisted OAuth token set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthTokens {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Unix seconds at which the access token stops being valid.
    pub expires_at: u64,
    #[serde(default = "default_token_type")]
    pub token_type: String,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl OAuthTokens {
    /// True when the access token expires within the refresh buffer.
    #[must_use]
    pub fn is_expiring(&self, now: u64) -> bool {
        self.expires_at <= now.saturating_add(EXPIRY_BUFFER_SECS)
    }
}

/// Token endpoint answer.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<u64>,
    #[serde(default)]
    token_type: Option<String>,
}

impl TokenResponse {
    fn into_tokens(self, now: u64, previous_refresh: Option<&str>) -> OAuthTokens {
        OAuthTokens {
            access_token: self.access_token,
            refresh_token: self
                .refresh_token
                .or_else(|| previous_refresh.map(str::to_string)),
            expires_at: now.saturating_add(self.expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS)),
            token_type: self.token_type.unwrap_or_else(default_token_type),
        }
    }
}

/// Build the URL the user is sent to for consent.
#[must_use]
pub fn authorize_url(endpoints: &Endpoints, config: &OAuthConfig, state: &str) -> Url {
    let mut url = endpoints.oauth_authorize();
    url.query_pairs_mut()
        .append_pair("response_type", "code")
        .append_pair("client_id", &config.client_id)
        .append_pair("redirect_uri", &config.redirect_uri)
        .append_pair("state", state)
        .append_pair("scope", &config.scope);
    url
}

/// Trade an authorization code for tokens.
///
/// # Errors
///
/// Returns [`ProviderError::Auth`] when the token endpoint rejects the code
/// or answers with something that is not a token set.
pub async fn exchange_code(
    transport: &HttpTransport,
    endpoints: &Endpoints,
    config: &OAuthConfig,
    client_secret: Option<&str>,
    code: &str,
) -> Result<OAuthTokens, ProviderError> {
    let mut form = vec![
        ("grant_type", "authorization_code"),
        ("code", code),
        ("redirect_uri", config.redirect_uri.as_str()),
        ("client_id", config.client_id.as_str()),
    ];
    if let Some(secret) = client_secret {
        form.push(("client_secret", secret));
    }
    let body = request_tokens(transport, endpoints, &form).await?;
    tracing::info!(client_id = %config.client_id, "OAuth authorization code exchanged");
    Ok(body.into_tokens(unix_now_secs(), None))
}

/// Obtain a fresh access token with a refresh token.
///
/// # Errors
///
/// Returns [`ProviderError::Auth`] when the refresh is rejected.
pub async fn refresh_tokens(
    transport: &HttpTransport,
    endpoints: &Endpoints,
    config: &OAuthConfig,
    client_secret: Option<&str>,
    refresh_token: &str,
) -> Result<OAuthTokens, ProviderError> {
    let mut form = vec![
        ("grant_type", "refresh_token"),
        ("refresh_token", refresh_token),
        ("client_id", config.client_id.as_str()),
    ];
    if let Some(secret) = client_secret {
        form.push(("client_secret", secret));
    }
    let body = request_tokens(transport, endpoints, &form).await?;
    tracing::debug!(client_id = %config.client_id, "OAuth access token refreshed");
    Ok(body.into_tokens(unix_now_secs(), Some(refresh_token)))
}

async fn request_tokens(
    transport: &HttpTransport,
    endpoints: &Endpoints,
    form: &[(&str, &str)],
) -> Result<TokenResponse, ProviderError> {
    let value = transport
        .post_form(endpoints.oauth_token(), form)
        .await
        .map_err(|err| match err {
            ProviderError::Upstream { status, message } => {
                ProviderError::Auth(format!("token endpoint rejected the grant ({status}): {message}"))
            }
            other => other,
        })?;
    parse_token_response(value)
}

fn parse_token_response(value: Value) -> Result<TokenResponse, ProviderError> {
    serde_json::from_value(value)
        .map_err(|err| ProviderError::Auth(format!("Malformed token response: {err}")))
}

/// Read the persisted token set. Unreadable entries count as absent.
#[must_use]
pub fn load_tokens(secrets: &dyn SecretStore, key_id: &str) -> Option<OAuthTokens> {
    let raw = secrets.get_value(key_id)?;
    match serde_json::from_str(&raw) {
        Ok(tokens) => Some(tokens),
        Err(err) => {
            tracing::warn!(key_id, error = %err, "Ignoring unreadable OAuth token entry");
            None
        }
    }
}

/// Persist a token set as JSON.
///
/// # Errors
///
/// Returns [`ProviderError::Storage`] when the secret store refuses the write.
pub fn store_tokens(
    secrets: &dyn SecretStore,
    key_id: &str,
    tokens: &OAuthTokens,
) -> Result<(), ProviderError> {
    let raw = serde_json::to_string(tokens)
        .map_err(|err| ProviderError::Storage(format!("Failed to encode OAuth tokens: {err}")))?;
    secrets.set_value(key_id, &raw)
}
