/// HTTP transport: posts a JSON payload to a webhook URL.

use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// The JSON body delivered to a chat webhook: `{"content": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookPayload {
    pub content: String,
}

/// What came back from the webhook. Kept for diagnostics only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Issues a single POST. Implementations must not retry.
pub trait Transport {
    fn post_json(
        &self,
        url: &str,
        payload: &WebhookPayload,
    ) -> Result<TransportResponse, TransportError>;
}

/// Blocking reqwest transport.
#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a preconfigured client (proxies, timeouts, user agent).
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

impl Transport for HttpTransport {
    fn post_json(
        &self,
        url: &str,
        payload: &WebhookPayload,
    ) -> Result<TransportResponse, TransportError> {
        let response = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .json(payload)
            .send()?;
        let status = response.status().as_u16();
        // A body that cannot be read fails the whole post.
        let body = response.text()?;
        Ok(TransportResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_serializes_as_content_object() {
        let payload = WebhookPayload {
            content: "Hello, world!".to_string(),
        };
        assert_eq!(
            serde_json::to_string(&payload).unwrap(),
            r#"{"content":"Hello, world!"}"#
        );
    }

    #[test]
    fn success_range() {
        let ok = TransportResponse {
            status: 204,
            body: String::new(),
        };
        let not_found = TransportResponse {
            status: 404,
            body: "Unknown Webhook".to_string(),
        };
        assert!(ok.is_success());
        assert!(!not_found.is_success());
    }

    #[test]
    fn invalid_url_is_transport_error() {
        let transport = HttpTransport::new();
        let payload = WebhookPayload {
            content: "hi".to_string(),
        };
        let err = transport.post_json("not a url", &payload).unwrap_err();
        assert!(matches!(err, TransportError::Http(_)));
    }
}
