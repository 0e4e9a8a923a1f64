use std::time::{Duration, Instant};

use bytes::Bytes;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use http::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use serde::Serialize;
use serde_json::Value;
use url::Url;

use crate::config::HttpConfig;
use crate::error::ProviderError;
use crate::protocol::dashboard::error_message_from_body;
use crate::util::truncate_for_log;

use super::retry_policy::{
    retry_backoff_delay, retry_delay, should_retry_transport_error, should_retry_upstream_status,
    RETRY_MAX_ATTEMPTS,
};

const APPLICATION_JSON: &str = "application/json";
const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";
const EVENT_STREAM: &str = "text/event-stream";
const ERROR_BODY_LOG_MAX: usize = 512;

fn build_reqwest_client(config: &HttpConfig, timeout: Duration) -> Result<reqwest::Client, ProviderError> {
    let pool_idle_timeout = if config.pool_idle_timeout_secs == 0 {
        None
    } else {
        Some(Duration::from_secs(config.pool_idle_timeout_secs))
    };
    let mut builder = reqwest::Client::builder()
        .pool_max_idle_per_host(config.pool_max_idle_per_host.max(1))
        .pool_idle_timeout(pool_idle_timeout)
        .tcp_nodelay(true)
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs.max(1)))
        .redirect(reqwest::redirect::Policy::none())
        .timeout(timeout);
    if !config.use_env_proxy {
        builder = builder.no_proxy();
    }
    builder
        .build()
        .map_err(|err| ProviderError::Config(format!("Failed to build HTTP client: {err}")))
}

/// HTTP client for the Dashboard API.
///
/// Holds two pooled clients: one with the regular request timeout and one
/// with the longer streaming timeout.
pub struct HttpTransport {
    client: reqwest::Client,
    stream_client: reqwest::Client,
}

impl HttpTransport {
    /// # Errors
    ///
    /// Returns [`ProviderError::Config`] when the TLS backend or client
    /// settings cannot be initialised.
    pub fn new(config: &HttpConfig) -> Result<Self, ProviderError> {
        Ok(Self {
            client: build_reqwest_client(config, Duration::from_secs(config.timeout_secs))?,
            stream_client: build_reqwest_client(
                config,
                Duration::from_secs(config.stream_timeout_secs),
            )?,
        })
    }

    /// `GET` a JSON document. Retried on transient failures.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Transport`] when the request cannot be sent,
    /// [`ProviderError::Upstream`] on a non-2xx status and
    /// [`ProviderError::Translation`] when the body is not JSON.
    pub async fn get_json(&self, url: Url, token: &str) -> Result<Value, ProviderError> {
        let response = self
            .send(http::Method::GET, &url, true, || {
                self.client.get(url.clone()).header(AUTHORIZATION, bearer(token))
            })
            .await?;
        read_json(response, &url).await
    }

    /// `POST` a JSON body and read a JSON answer. Not retried.
    ///
    /// # Errors
    ///
    /// See [`HttpTransport::get_json`].
    pub async fn post_json<T>(&self, url: Url, token: &str, body: &T) -> Result<Value, ProviderError>
    where
        T: Serialize + ?Sized,
    {
        let payload = encode_body(body)?;
        let response = self
            .send(http::Method::POST, &url, false, || {
                self.client
                    .post(url.clone())
                    .header(AUTHORIZATION, bearer(token))
                    .header(CONTENT_TYPE, APPLICATION_JSON)
                    .header(ACCEPT, APPLICATION_JSON)
                    .body(payload.clone())
            })
            .await?;
        read_json(response, &url).await
    }

    /// `DELETE` a resource. Retried on transient failures.
    ///
    /// # Errors
    ///
    /// See [`HttpTransport::get_json`].
    pub async fn delete(&self, url: Url, token: &str) -> Result<(), ProviderError> {
        self.send(http::Method::DELETE, &url, true, || {
            self.client
                .delete(url.clone())
                .header(AUTHORIZATION, bearer(token))
        })
        .await?;
        Ok(())
    }

    /// `POST` a form-encoded body without bearer auth (OAuth token endpoint).
    ///
    /// # Errors
    ///
    /// See [`HttpTransport::get_json`].
    pub async fn post_form(&self, url: Url, form: &[(&str, &str)]) -> Result<Value, ProviderError> {
        let payload = Bytes::from(
            url::form_urlencoded::Serializer::new(String::new())
                .extend_pairs(form)
                .finish(),
        );
        let response = self
            .send(http::Method::POST, &url, false, || {
                self.client
                    .post(url.clone())
                    .header(CONTENT_TYPE, FORM_URLENCODED)
                    .header(ACCEPT, APPLICATION_JSON)
                    .body(payload.clone())
            })
            .await?;
        read_json(response, &url).await
    }

    /// `POST` a JSON body and hand back the raw event-stream body.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Transport`] when the request cannot be sent
    /// and [`ProviderError::Upstream`] on a non-2xx status.
    pub async fn post_stream<T>(
        &self,
        url: Url,
        token: &str,
        body: &T,
    ) -> Result<BoxStream<'static, Result<Bytes, reqwest::Error>>, ProviderError>
    where
        T: Serialize + ?Sized,
    {
        let payload = encode_body(body)?;
        let response = self
            .send(http::Method::POST, &url, false, || {
                self.stream_client
                    .post(url.clone())
                    .header(AUTHORIZATION, bearer(token))
                    .header(CONTENT_TYPE, APPLICATION_JSON)
                    .header(ACCEPT, EVENT_STREAM)
                    .body(payload.clone())
            })
            .await?;
        Ok(response.bytes_stream().boxed())
    }

    async fn send<F>(
        &self,
        method: http::Method,
        url: &Url,
        idempotent: bool,
        build: F,
    ) -> Result<reqwest::Response, ProviderError>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        let max_attempts = if idempotent { RETRY_MAX_ATTEMPTS + 1 } else { 1 };
        let mut attempt = 0;
        loop {
            let started = Instant::now();
            let result = build().send().await;
            let elapsed_ms = duration_ms(started.elapsed());
            attempt += 1;
            match result {
                Ok(response) if response.status().is_success() => {
                    tracing::debug!(
                        method = %method,
                        path = url.path(),
                        status = response.status().as_u16(),
                        elapsed_ms,
                        "Dashboard request completed"
                    );
                    return Ok(response);
                }
                Ok(response) => {
                    let status = response.status();
                    if attempt < max_attempts && should_retry_upstream_status(status) {
                        let delay = retry_delay(response.headers(), attempt - 1);
                        tracing::warn!(
                            method = %method,
                            path = url.path(),
                            status = status.as_u16(),
                            attempt,
                            delay_ms = duration_ms(delay),
                            "Retrying Dashboard request"
                        );
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    return Err(upstream_error(response, &method, url).await);
                }
                Err(err) => {
                    if attempt < max_attempts && should_retry_transport_error(&err) {
                        let delay = retry_backoff_delay(attempt - 1);
                        tracing::warn!(
                            method = %method,
                            path = url.path(),
                            error = %err,
                            attempt,
                            "Retrying Dashboard request after transport failure"
                        );
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    tracing::error!(
                        method = %method,
                        path = url.path(),
                        error = %err,
                        elapsed_ms,
                        "Dashboard request failed"
                    );
                    return Err(ProviderError::transport(
                        format!("{method} {}", url.path()),
                        err,
                    ));
                }
            }
        }
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn bearer(token: &str) -> String {
    let mut value = String::with_capacity(token.len() + 7);
    value.push_str("Bearer ");
    value.push_str(token);
    value
}

fn encode_body<T: Serialize + ?Sized>(body: &T) -> Result<Bytes, ProviderError> {
    serde_json::to_vec(body)
        .map(Bytes::from)
        .map_err(|err| ProviderError::Translation(format!("Failed to encode request body: {err}")))
}

async fn read_json(response: reqwest::Response, url: &Url) -> Result<Value, ProviderError> {
    let body = response
        .bytes()
        .await
        .map_err(|err| ProviderError::transport(format!("reading {}", url.path()), err))?;
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }
    serde_json::from_slice(&body).map_err(|err| {
        ProviderError::Translation(format!(
            "Invalid JSON from {}: {err}",
            url.path()
        ))
    })
}

async fn upstream_error(response: reqwest::Response, method: &http::Method, url: &Url) -> ProviderError {
    let status = response.status();
    let body = response.bytes().await.unwrap_or_default();
    let message = error_message_from_body(&body).unwrap_or_else(|| {
        let text = String::from_utf8_lossy(&body);
        let text = text.trim();
        if text.is_empty() {
            status.canonical_reason().unwrap_or("unknown error").to_string()
        } else {
            truncate_for_log(text, ERROR_BODY_LOG_MAX).to_string()
        }
    });
    tracing::warn!(
        method = %method,
        path = url.path(),
        status = status.as_u16(),
        message = %message,
        "Dashboard request rejected"
    );
    ProviderError::Upstream {
        status: status.as_u16(),
        message,
    }
}
