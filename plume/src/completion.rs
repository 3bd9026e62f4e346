//! Chat completion request dispatch.

use crate::client::ChatClient;
use crate::error::{Error, Result};
use crate::message::ChatMessage;
use crate::streaming::{ChatStream, FragmentStream};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, instrument};

/// Handle for issuing completion requests against one model.
#[derive(Debug, Clone)]
pub struct CompletionModel {
    client: ChatClient,
    model_id: String,
}

impl CompletionModel {
    /// Create a new completion model.
    pub(crate) fn new(client: ChatClient, model_id: impl Into<String>) -> Self {
        Self {
            client,
            model_id: model_id.into(),
        }
    }

    /// The model identifier requests are sent with.
    #[must_use]
    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    /// Build the request body for the API.
    fn build_request_body(&self, messages: &[ChatMessage]) -> Value {
        serde_json::json!({
            "model": self.model_id,
            "messages": messages,
            "stream": true,
        })
    }

    /// Send a streaming completion request.
    ///
    /// Returns a stream of text fragments extracted from the SSE response
    /// body in arrival order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] when the request cannot be sent,
    /// [`Error::Config`] when the auth headers cannot be built, and
    /// [`Error::Api`] when the endpoint answers with a non-success status.
    #[instrument(skip(self, messages), fields(model = %self.model_id))]
    pub async fn stream(&self, messages: Vec<ChatMessage>) -> Result<ChatStream> {
        let body = self.build_request_body(&messages);

        debug!("sending streaming chat completion request");

        let response = self
            .client
            .http_client
            .post(format!("{}/chat/completions", self.client.base_url()))
            .headers(self.client.auth_headers()?)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            let message =
                serde_json::from_str::<ApiErrorResponse>(&text).map_or(text, |api| api.error.message);
            return Err(Error::api(status.as_u16(), message));
        }

        Ok(FragmentStream::new(Box::pin(response.bytes_stream())))
    }
}

/// API error response envelope.
#[derive(Debug, Deserialize)]
#[non_exhaustive]
pub struct ApiErrorResponse {
    /// Detailed error information.
    pub error: ApiError,
}

/// API error details.
#[derive(Debug, Deserialize)]
#[non_exhaustive]
pub struct ApiError {
    /// Human-readable error message.
    pub message: String,
    /// Error type identifier.
    #[serde(rename = "type")]
    pub kind: Option<String>,
    /// Provider-specific error code.
    pub code: Option<String>,
}
