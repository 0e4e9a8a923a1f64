use super::{ConfigError, ProviderConfig};

/// Validate the full provider config, returning an error if any rule is violated.
///
/// # Errors
///
/// Returns [`ConfigError::Validation`] when any configuration invariant is violated.
pub fn validate_config(config: &ProviderConfig) -> Result<(), ConfigError> {
    validate_dashboard(config)?;
    validate_auth(config)?;
    validate_http(config)?;
    validate_vdb(config)?;
    validate_log_level(config)?;
    Ok(())
}

fn validation_err(msg: impl Into<String>) -> ConfigError {
    ConfigError::Validation(msg.into())
}

fn validate_dashboard(config: &ProviderConfig) -> Result<(), ConfigError> {
    validate_http_url("dashboard.base_url", &config.dashboard.base_url)?;
    if config.dashboard.organisation_id.trim().is_empty() {
        return Err(validation_err("dashboard.organisation_id cannot be empty"));
    }
    Ok(())
}

fn validate_auth(config: &ProviderConfig) -> Result<(), ConfigError> {
    let auth = &config.auth;
    if let Some(key_id) = auth.api_key_id.as_deref() {
        if key_id.trim().is_empty() {
            return Err(validation_err("auth.api_key_id cannot be empty when set"));
        }
    }
    if let Some(oauth) = auth.oauth.as_ref() {
        if oauth.client_id.trim().is_empty() {
            return Err(validation_err("auth.oauth.client_id cannot be empty"));
        }
        if oauth.token_key_id.trim().is_empty() {
            return Err(validation_err("auth.oauth.token_key_id cannot be empty"));
        }
        validate_http_url("auth.oauth.redirect_uri", &oauth.redirect_uri)?;
    }
    if auth.api_key_id.is_none() && auth.oauth.is_none() {
        return Err(validation_err(
            "auth requires either api_key_id or an oauth section",
        ));
    }
    Ok(())
}

fn validate_http(config: &ProviderConfig) -> Result<(), ConfigError> {
    let http = &config.http;
    if http.timeout_secs == 0 {
        return Err(validation_err("http.timeout_secs must be greater than 0"));
    }
    if http.stream_timeout_secs == 0 {
        return Err(validation_err(
            "http.stream_timeout_secs must be greater than 0",
        ));
    }
    if http.pool_max_idle_per_host == 0 {
        return Err(validation_err(
            "http.pool_max_idle_per_host must be greater than 0",
        ));
    }
    Ok(())
}

fn validate_vdb(config: &ProviderConfig) -> Result<(), ConfigError> {
    let namespace = config.vdb.namespace.trim();
    if namespace.is_empty() {
        return Err(validation_err("vdb.namespace cannot be empty"));
    }
    if namespace.contains(char::is_whitespace) {
        return Err(validation_err("vdb.namespace cannot contain whitespace"));
    }
    Ok(())
}

fn validate_http_url(field_name: &str, value: &str) -> Result<(), ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(validation_err(format!("{field_name} cannot be empty")));
    }
    let parsed = url::Url::parse(trimmed)
        .map_err(|err| validation_err(format!("{field_name} is not a valid URL: {err}")))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(validation_err(format!(
            "{field_name} must use http:// or https://"
        )));
    }
    Ok(())
}

const VALID_LOG_LEVELS: &[&str] = &[
    "DEBUG", "INFO", "WARNING", "WARN", "ERROR", "CRITICAL", "TRACE", "DISABLED",
];

fn validate_log_level(config: &ProviderConfig) -> Result<(), ConfigError> {
    let level = config.features.log_level.to_uppercase();
    if !VALID_LOG_LEVELS.contains(&level.as_str()) {
        return Err(validation_err(format!(
            "Invalid log_level '{}'. Must be one of: {}",
            config.features.log_level,
            VALID_LOG_LEVELS.join(", ")
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> ProviderConfig {
        ProviderConfig::new("https://dash.example.com", "42", "dashboard_api_key")
    }

    #[test]
    fn test_valid_minimal_config() {
        assert!(validate_config(&base()).is_ok());
    }

    #[test]
    fn test_missing_organisation_is_rejected() {
        let mut config = base();
        config.dashboard.organisation_id = "  ".into();
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("organisation_id"));
    }

    #[test]
    fn test_missing_auth_source_is_rejected() {
        let mut config = base();
        config.auth.api_key_id = None;
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("api_key_id or an oauth"));
    }

    #[test]
    fn test_non_http_base_url_is_rejected() {
        let mut config = base();
        config.dashboard.base_url = "ftp://dash.example.com".into();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_zero_stream_timeout_is_rejected() {
        let mut config = base();
        config.http.stream_timeout_secs = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_log_level_case_insensitive() {
        let mut config = base();
        config.features.log_level = "warning".into();
        assert!(validate_config(&config).is_ok());
        config.features.log_level = "chatty".into();
        assert!(validate_config(&config).is_err());
    }
}
