//! API client for OpenAI-compatible chat completion endpoints.

use crate::completion::CompletionModel;
use crate::error::{Error, Result};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use std::sync::Arc;
use std::time::Duration;

/// Default API base URL.
pub const DEFAULT_API_BASE_URL: &str = "https://api.openai.com/v1";

/// Environment variable holding the API key.
pub const API_KEY_ENV: &str = "PLUME_API_KEY";

/// Fallback environment variable for the API key.
pub const API_KEY_FALLBACK_ENV: &str = "OPENAI_API_KEY";

/// Environment variable overriding the API base URL.
pub const BASE_URL_ENV: &str = "PLUME_BASE_URL";

/// Client handle for a chat completion endpoint.
///
/// # Example
///
/// ```rust,ignore
/// use plume::ChatClient;
///
/// // From PLUME_API_KEY / OPENAI_API_KEY
/// let client = ChatClient::from_env()?;
///
/// // With explicit configuration (proxies, local models, etc.)
/// let client = ChatClient::builder()
///     .api_key("sk-...")
///     .base_url("https://my-proxy.example.com/v1")
///     .build()?;
/// ```
#[derive(Clone)]
pub struct ChatClient {
    pub(crate) http_client: reqwest::Client,
    pub(crate) api_key: Arc<str>,
    pub(crate) base_url: Arc<str>,
}

impl std::fmt::Debug for ChatClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatClient")
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

impl ChatClient {
    /// Create a new client with the given API key and the default base URL.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] if the underlying HTTP client cannot be
    /// constructed.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Self::builder().api_key(api_key).build()
    }

    /// Create a new client builder.
    #[must_use]
    pub fn builder() -> ChatClientBuilder {
        ChatClientBuilder::default()
    }

    /// Create a client from environment variables.
    ///
    /// Reads the API key from `PLUME_API_KEY`, falling back to
    /// `OPENAI_API_KEY`, and an optional base URL from `PLUME_BASE_URL`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when neither key variable is set.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var(API_KEY_ENV)
            .or_else(|_| std::env::var(API_KEY_FALLBACK_ENV))
            .map_err(|_| {
                Error::config(format!(
                    "neither {API_KEY_ENV} nor {API_KEY_FALLBACK_ENV} is set"
                ))
            })?;

        let mut builder = Self::builder().api_key(api_key);

        if let Ok(base_url) = std::env::var(BASE_URL_ENV) {
            builder = builder.base_url(base_url);
        }

        builder.build()
    }

    /// Create a completion model with the specified model ID.
    #[must_use]
    pub fn completion_model(&self, model_id: impl Into<String>) -> CompletionModel {
        CompletionModel::new(self.clone(), model_id)
    }

    /// Get the base URL for API requests.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Build the authorization headers for API requests.
    pub(crate) fn auth_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.api_key))
                .map_err(|e| Error::config(format!("API key is not a valid header value: {e}")))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }
}

/// Builder for [`ChatClient`].
#[derive(Debug, Default)]
pub struct ChatClientBuilder {
    api_key: Option<String>,
    base_url: Option<String>,
    timeout_secs: Option<u64>,
}

impl ChatClientBuilder {
    /// Set the API key.
    #[must_use]
    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Set a custom base URL.
    ///
    /// Useful for proxies and local OpenAI-compatible servers.
    #[must_use]
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Set the request timeout in seconds.
    ///
    /// No timeout is applied by default; a streamed response stays open as
    /// long as the server keeps sending.
    #[must_use]
    pub const fn timeout_secs(mut self, timeout: u64) -> Self {
        self.timeout_secs = Some(timeout);
        self
    }

    /// Build the client.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when no API key was provided, or
    /// [`Error::Http`] when the HTTP client cannot be constructed.
    pub fn build(self) -> Result<ChatClient> {
        let api_key = self
            .api_key
            .ok_or_else(|| Error::config("API key is required"))?;

        let mut http = reqwest::Client::builder();
        if let Some(secs) = self.timeout_secs {
            http = http.timeout(Duration::from_secs(secs));
        }
        let http_client = http.build()?;

        Ok(ChatClient {
            http_client,
            api_key: api_key.into(),
            base_url: self
                .base_url
                .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string())
                .into(),
        })
    }
}
