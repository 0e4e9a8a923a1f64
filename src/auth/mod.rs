pub mod oauth;

use std::sync::Arc;

use url::Url;

use crate::config::{AuthConfig, OAuthConfig};
use crate::error::ProviderError;
use crate::store::SecretStore;
use crate::transport::{Endpoints, HttpTransport};
use crate::util::{random_token, unix_now_secs};

pub use oauth::OAuthTokens;

/// Resolves the bearer token for Dashboard calls.
///
/// A configured API key wins; otherwise the persisted OAuth token set is
/// used and refreshed shortly before it expires.
pub struct Authenticator {
    config: AuthConfig,
    secrets: Arc<dyn SecretStore>,
    refresh_lock: tokio::sync::Mutex<()>,
}

impl Authenticator {
    #[must_use]
    pub fn new(config: AuthConfig, secrets: Arc<dyn SecretStore>) -> Self {
        Self {
            config,
            secrets,
            refresh_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// True when an API key or an OAuth token set is stored. The token may
    /// still need a refresh.
    #[must_use]
    pub fn has_credential(&self) -> bool {
        if self.api_key().is_some() {
            return true;
        }
        self.config.oauth.as_ref().is_some_and(|oauth| {
            oauth::load_tokens(self.secrets.as_ref(), &oauth.token_key_id).is_some()
        })
    }

    fn api_key(&self) -> Option<String> {
        let key_id = self.config.api_key_id.as_deref()?;
        self.secrets
            .get_value(key_id)
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty())
    }

    fn oauth_config(&self) -> Result<&OAuthConfig, ProviderError> {
        self.config
            .oauth
            .as_ref()
            .ok_or_else(|| ProviderError::Auth("OAuth is not configured".to_string()))
    }

    fn client_secret(&self, oauth: &OAuthConfig) -> Option<String> {
        oauth
            .client_secret_key_id
            .as_deref()
            .and_then(|key_id| self.secrets.get_value(key_id))
    }

    /// Bearer token for the next request.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Auth`] when no API key is stored and there is
    /// no usable OAuth token set, or when the refresh is rejected.
    pub async fn bearer_token(
        &self,
        transport: &HttpTransport,
        endpoints: &Endpoints,
    ) -> Result<String, ProviderError> {
        if let Some(key) = self.api_key() {
            return Ok(key);
        }
        let Some(oauth) = self.config.oauth.as_ref() else {
            return Err(ProviderError::Auth(
                "No API key stored and OAuth is not configured".to_string(),
            ));
        };

        if let Some(tokens) = oauth::load_tokens(self.secrets.as_ref(), &oauth.token_key_id) {
            if !tokens.is_expiring(unix_now_secs()) {
                return Ok(tokens.access_token);
            }
        }

        let _guard = self.refresh_lock.lock().await;
        // Another task may have refreshed while we waited.
        let Some(tokens) = oauth::load_tokens(self.secrets.as_ref(), &oauth.token_key_id) else {
            return Err(ProviderError::Auth(
                "Not connected to Dashboard: complete the OAuth authorization first".to_string(),
            ));
        };
        if !tokens.is_expiring(unix_now_secs()) {
            return Ok(tokens.access_token);
        }
        let Some(refresh_token) = tokens.refresh_token.as_deref() else {
            return Err(ProviderError::Auth(
                "OAuth access token expired and no refresh token is stored".to_string(),
            ));
        };

        tracing::info!(client_id = %oauth.client_id, "OAuth access token expiring, refreshing");
        let client_secret = self.client_secret(oauth);
        let refreshed = oauth::refresh_tokens(
            transport,
            endpoints,
            oauth,
            client_secret.as_deref(),
            refresh_token,
        )
        .await?;
        oauth::store_tokens(self.secrets.as_ref(), &oauth.token_key_id, &refreshed)?;
        Ok(refreshed.access_token)
    }

    /// Start the authorization-code flow: the consent URL and the `state`
    /// value the caller must keep for the callback.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Auth`] when OAuth is not configured.
    pub fn begin_authorization(&self, endpoints: &Endpoints) -> Result<(Url, String), ProviderError> {
        let oauth = self.oauth_config()?;
        let state = random_token();
        Ok((oauth::authorize_url(endpoints, oauth, &state), state))
    }

    /// Finish the flow: check `state`, exchange the code and persist tokens.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Auth`] on a state mismatch or a rejected code,
    /// and [`ProviderError::Storage`] when tokens cannot be persisted.
    pub async fn complete_authorization(
        &self,
        transport: &HttpTransport,
        endpoints: &Endpoints,
        code: &str,
        returned_state: &str,
        expected_state: &str,
    ) -> Result<OAuthTokens, ProviderError> {
        let oauth = self.oauth_config()?;
        if returned_state.is_empty() || returned_state != expected_state {
            tracing::warn!("OAuth callback state mismatch");
            return Err(ProviderError::Auth("OAuth state mismatch".to_string()));
        }
        if code.trim().is_empty() {
            return Err(ProviderError::Auth("OAuth callback carried no code".to_string()));
        }
        let client_secret = self.client_secret(oauth);
        let tokens =
            oauth::exchange_code(transport, endpoints, oauth, client_secret.as_deref(), code)
                .await?;
        let _guard = self.refresh_lock.lock().await;
        oauth::store_tokens(self.secrets.as_ref(), &oauth.token_key_id, &tokens)?;
        Ok(tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DashboardConfig, HttpConfig};
    use crate::store::MemorySecretStore;

    fn endpoints() -> Endpoints {
        Endpoints::new(&DashboardConfig {
            base_url: "http://127.0.0.1:9".into(),
            organisation_id: "1".into(),
        })
        .unwrap()
    }

    fn oauth() -> OAuthConfig {
        OAuthConfig {
            client_id: "c".into(),
            client_secret_key_id: None,
            redirect_uri: "https://site.example.com/cb".into(),
            scope: "ai".into(),
            token_key_id: "tokens".into(),
        }
    }

    #[tokio::test]
    async fn test_api_key_wins_over_oauth() {
        let secrets = Arc::new(MemorySecretStore::new().with_value("api", " key-1 "));
        let auth = Authenticator::new(
            AuthConfig {
                api_key_id: Some("api".into()),
                oauth: Some(oauth()),
            },
            secrets,
        );
        let transport = HttpTransport::new(&HttpConfig::default()).unwrap();
        let token = auth.bearer_token(&transport, &endpoints()).await.unwrap();
        assert_eq!(token, "key-1");
    }

    #[tokio::test]
    async fn test_valid_oauth_token_used_without_network() {
        let secrets = Arc::new(MemorySecretStore::new());
        oauth::store_tokens(
            secrets.as_ref(),
            "tokens",
            &OAuthTokens {
                access_token: "at".into(),
                refresh_token: Some("rt".into()),
                expires_at: unix_now_secs() + 3_600,
                token_type: "Bearer".into(),
            },
        )
        .unwrap();
        let auth = Authenticator::new(
            AuthConfig {
                api_key_id: Some("missing".into()),
                oauth: Some(oauth()),
            },
            secrets,
        );
        let transport = HttpTransport::new(&HttpConfig::default()).unwrap();
        assert_eq!(
            auth.bearer_token(&transport, &endpoints()).await.unwrap(),
            "at"
        );
    }

    #[tokio::test]
    async fn test_no_credentials_is_auth_error() {
        let auth = Authenticator::new(
            AuthConfig {
                api_key_id: Some("missing".into()),
                oauth: None,
            },
            Arc::new(MemorySecretStore::new()),
        );
        assert!(!auth.has_credential());
        let transport = HttpTransport::new(&HttpConfig::default()).unwrap();
        let err = auth
            .bearer_token(&transport, &endpoints())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Auth(_)));
    }

    #[tokio::test]
    async fn test_state_mismatch_is_rejected_before_exchange() {
        let auth = Authenticator::new(
            AuthConfig {
                api_key_id: None,
                oauth: Some(oauth()),
            },
            Arc::new(MemorySecretStore::new()),
        );
        let (url, state) = auth.begin_authorization(&endpoints()).unwrap();
        assert!(url.as_str().contains(&format!("state={state}")));
        let transport = HttpTransport::new(&HttpConfig::default()).unwrap();
        let err = auth
            .complete_authorization(&transport, &endpoints(), "code", "forged", &state)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Auth(_)));
    }
}
