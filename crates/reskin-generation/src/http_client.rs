//! Shared HTTP client for the image-generation service
//!
//! One `reqwest::Client` per backend, configured with connect/idle timeouts and a
//! small transport-level retry for server errors and dropped connections. The
//! engines layer their own prompt-escalating retries on top.

use reqwest::{Client, Response, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use reskin_utils::error::GenerationError;
use reskin_utils::redaction::redact_credentials;

/// Upper bound on any single request (image edits can be slow)
const DEFAULT_MAX_HTTP_TIMEOUT: Duration = Duration::from_secs(600);

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Retries for 5xx and network failures
const MAX_RETRIES: u32 = 2;

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);

#[derive(Clone)]
pub(crate) struct HttpClient {
    client: Arc<Client>,
    max_timeout: Duration,
    backoff: Duration,
}

impl HttpClient {
    /// # Errors
    ///
    /// Returns `GenerationError::Misconfiguration` if the client cannot be constructed
    pub fn new() -> Result<Self, GenerationError> {
        Self::with_settings(DEFAULT_MAX_HTTP_TIMEOUT, INITIAL_BACKOFF)
    }

    /// # Errors
    ///
    /// Returns `GenerationError::Misconfiguration` if the client cannot be constructed
    pub fn with_settings(
        max_timeout: Duration,
        backoff: Duration,
    ) -> Result<Self, GenerationError> {
        let client = Client::builder()
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(10)
            .use_rustls_tls()
            .build()
            .map_err(|e| {
                GenerationError::Misconfiguration(format!("Failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            client: Arc::new(client),
            max_timeout,
            backoff,
        })
    }

    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// Execute a request with timeout and retry policy.
    ///
    /// - Per-request timeout: `min(request_timeout, max_timeout)`
    /// - Up to 2 retries for 5xx and network failures, backoff `backoff × attempt`
    /// - 4xx responses are mapped immediately and never retried
    ///
    /// # Errors
    ///
    /// - `ProviderAuth` for 401/403
    /// - `ProviderQuota` for 429
    /// - `InvalidRequest` for other 4xx
    /// - `ProviderOutage` for 5xx after retries
    /// - `Timeout` when the request times out
    /// - `Transport` for network errors after retries
    pub async fn execute_with_retry(
        &self,
        request_builder: reqwest::RequestBuilder,
        request_timeout: Duration,
        provider_name: &str,
    ) -> Result<Response, GenerationError> {
        let effective_timeout = request_timeout.min(self.max_timeout);
        let mut attempt = 0;

        loop {
            attempt += 1;

            let request = request_builder
                .try_clone()
                .ok_or_else(|| {
                    GenerationError::Transport("Failed to clone request for retry".to_string())
                })?
                .timeout(effective_timeout)
                .build()
                .map_err(|e| GenerationError::Transport(format!("Failed to build request: {e}")))?;

            debug!(
                provider = provider_name,
                attempt = attempt,
                timeout_secs = effective_timeout.as_secs(),
                "Executing HTTP request"
            );

            match self.client.execute(request).await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_client_error() {
                        return Err(map_client_error(status, provider_name));
                    }

                    if status.is_server_error() {
                        if attempt <= MAX_RETRIES {
                            warn!(
                                provider = provider_name,
                                attempt = attempt,
                                status = status.as_u16(),
                                "Server error, will retry"
                            );
                            tokio::time::sleep(self.backoff * attempt).await;
                            continue;
                        }
                        return Err(GenerationError::ProviderOutage(format!(
                            "{provider_name} returned server error: {status}"
                        )));
                    }

                    return Ok(response);
                }
                Err(e) => {
                    if e.is_timeout() {
                        return Err(GenerationError::Timeout {
                            duration: effective_timeout,
                        });
                    }

                    let message = redact_credentials(&e.to_string());
                    if attempt <= MAX_RETRIES {
                        warn!(
                            provider = provider_name,
                            attempt = attempt,
                            error = %message,
                            "Network error, will retry"
                        );
                        tokio::time::sleep(self.backoff * attempt).await;
                        continue;
                    }

                    return Err(GenerationError::Transport(format!(
                        "{provider_name} request failed: {message}"
                    )));
                }
            }
        }
    }
}

/// Map 4xx status codes to error variants.
fn map_client_error(status: StatusCode, provider_name: &str) -> GenerationError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => GenerationError::ProviderAuth(format!(
            "{provider_name} authentication failed: {status}"
        )),
        StatusCode::TOO_MANY_REQUESTS => {
            GenerationError::ProviderQuota(format!("{provider_name} rate limit exceeded: {status}"))
        }
        StatusCode::REQUEST_TIMEOUT => GenerationError::Transport(format!(
            "{provider_name} closed the request: {status}"
        )),
        _ => GenerationError::InvalidRequest(format!(
            "{provider_name} rejected the request: {status}"
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_client_construction() {
        assert!(HttpClient::new().is_ok());
        let client = HttpClient::with_settings(Duration::from_secs(10), Duration::ZERO).unwrap();
        assert_eq!(client.max_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_map_client_error() {
        assert!(matches!(
            map_client_error(StatusCode::UNAUTHORIZED, "svc"),
            GenerationError::ProviderAuth(_)
        ));
        assert!(matches!(
            map_client_error(StatusCode::FORBIDDEN, "svc"),
            GenerationError::ProviderAuth(_)
        ));

        let quota = map_client_error(StatusCode::TOO_MANY_REQUESTS, "svc");
        assert!(matches!(quota, GenerationError::ProviderQuota(_)));
        assert!(quota.is_retryable());

        let bad = map_client_error(StatusCode::BAD_REQUEST, "svc");
        assert!(matches!(bad, GenerationError::InvalidRequest(_)));
        assert!(!bad.is_retryable());

        assert!(map_client_error(StatusCode::REQUEST_TIMEOUT, "svc").is_retryable());
    }

    #[tokio::test]
    async fn test_unreachable_host_is_transport_error() {
        let client = HttpClient::with_settings(Duration::from_secs(5), Duration::ZERO).unwrap();
        // Port 9 on localhost is discard; nothing listens there in test environments.
        let request = client.inner().post("http://127.0.0.1:9/generate");
        let err = client
            .execute_with_retry(request, Duration::from_secs(2), "svc")
            .await
            .unwrap_err();
        assert!(err.is_retryable(), "{err}");
    }
}
