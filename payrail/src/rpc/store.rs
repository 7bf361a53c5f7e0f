//! Client for the external secret store holding the live RPC configuration.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use url::Url;

/// A key-value secret store.
///
/// Implementations return the raw secret text; parsing belongs to the caller.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Fetches the current value of the secret `name`.
    ///
    /// # Errors
    ///
    /// Returns [`SecretStoreError`] on transport failures, non-success statuses
    /// or an unreadable body.
    async fn fetch_secret(&self, name: &str) -> Result<String, SecretStoreError>;
}

/// Errors from a [`SecretStore`].
#[derive(Debug, thiserror::Error)]
pub enum SecretStoreError {
    /// URL construction failed.
    #[error("URL parse error: {context}: {source}")]
    UrlParse {
        /// Human-readable context.
        context: &'static str,
        /// The underlying parse error.
        #[source]
        source: url::ParseError,
    },
    /// HTTP transport error.
    #[error("HTTP error: {context}: {source}")]
    Http {
        /// Human-readable context.
        context: &'static str,
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },
    /// Unexpected HTTP status code.
    #[error("Unexpected HTTP status {status}: {body}")]
    HttpStatus {
        /// The HTTP status code.
        status: StatusCode,
        /// The response body.
        body: String,
    },
    /// The fetch did not finish within the allotted time.
    #[error("secret store did not answer within {0:?}")]
    Timeout(Duration),
}

/// HTTP secret store: `GET {base_url}/secrets/{name}`.
///
/// The response body is either the secret itself or an envelope carrying it
/// as a string under `SecretString` (or `secret_string`).
#[derive(Debug, Clone)]
pub struct HttpSecretStore {
    base_url: Url,
    client: Client,
    token: Option<String>,
    timeout: Option<Duration>,
}

impl HttpSecretStore {
    /// Creates a store client for `base_url`.
    #[must_use]
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            client: Client::new(),
            token: None,
            timeout: None,
        }
    }

    /// Sends `Authorization: Bearer <token>` with every request.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Sets a per-request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn secret_url(&self, name: &str) -> Result<Url, SecretStoreError> {
        let mut base = self.base_url.clone();
        if !base.path().ends_with('/') {
            base.set_path(&format!("{}/", base.path()));
        }
        base.join(&format!("secrets/{name}"))
            .map_err(|e| SecretStoreError::UrlParse {
                context: "Failed to construct secret URL",
                source: e,
            })
    }
}

#[async_trait]
impl SecretStore for HttpSecretStore {
    async fn fetch_secret(&self, name: &str) -> Result<String, SecretStoreError> {
        let url = self.secret_url(name)?;
        let mut req = self.client.get(url);
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }
        if let Some(timeout) = self.timeout {
            req = req.timeout(timeout);
        }
        let response = req.send().await.map_err(|e| {
            if e.is_timeout() {
                SecretStoreError::Timeout(self.timeout.unwrap_or_default())
            } else {
                SecretStoreError::Http {
                    context: "GET secret",
                    source: e,
                }
            }
        })?;
        let status = response.status();
        let body = response.text().await.map_err(|e| SecretStoreError::Http {
            context: "Failed to read secret body",
            source: e,
        })?;
        if !status.is_success() {
            return Err(SecretStoreError::HttpStatus { status, body });
        }
        Ok(unwrap_envelope(body))
    }
}

fn unwrap_envelope(body: String) -> String {
    let Ok(serde_json::Value::Object(map)) = serde_json::from_str::<serde_json::Value>(&body)
    else {
        return body;
    };
    ["SecretString", "secret_string"]
        .iter()
        .find_map(|key| map.get(*key).and_then(|v| v.as_str()).map(str::to_owned))
        .unwrap_or(body)
}
