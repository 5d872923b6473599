pub mod error;
pub mod form;

pub use error::{Result, TransportError};
pub use form::flatten_form;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Wire encoding a subscriber expects its payload in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadEncoding {
    #[default]
    Json,
    Form,
}

/// One POST to one subscriber endpoint.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub url: String,
    pub body: serde_json::Value,
    pub encoding: PayloadEncoding,
    pub timeout: Duration,
}

/// Whatever the subscriber answered, regardless of status code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub reason: String,
    pub body: String,
}

impl TransportResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            reason: reason_phrase(status).to_string(),
            body: body.into(),
        }
    }

    pub fn is_client_error(&self) -> bool {
        (400..=499).contains(&self.status)
    }

    pub fn is_server_error(&self) -> bool {
        (500..=599).contains(&self.status)
    }
}

fn reason_phrase(status: u16) -> &'static str {
    reqwest::StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("")
}

/// An HTTP client that can POST a payload with a timeout. No retries.
#[async_trait]
pub trait SubscriberTransport: Send + Sync {
    async fn post(&self, request: &OutboundRequest) -> Result<TransportResponse>;
}

/// `reqwest`-backed transport used in production.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(user_agent: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .build()
            .map_err(|e| TransportError::Build(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl SubscriberTransport for HttpTransport {
    async fn post(&self, request: &OutboundRequest) -> Result<TransportResponse> {
        let builder = self
            .client
            .post(&request.url)
            .header("Accept", "text/plain")
            .timeout(request.timeout);

        let builder = match request.encoding {
            PayloadEncoding::Json => builder.json(&request.body),
            PayloadEncoding::Form => builder.form(&flatten_form(&request.body)),
        };

        let resp = builder
            .send()
            .await
            .map_err(|e| TransportError::from_reqwest(&request.url, e))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| TransportError::from_reqwest(&request.url, e))?;

        tracing::debug!(
            url = %request.url,
            status = status.as_u16(),
            bytes = body.len(),
            "Subscriber responded"
        );

        Ok(TransportResponse {
            status: status.as_u16(),
            reason: status.canonical_reason().unwrap_or("").to_string(),
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classes() {
        assert!(TransportResponse::new(404, "").is_client_error());
        assert!(!TransportResponse::new(404, "").is_server_error());
        assert!(TransportResponse::new(503, "").is_server_error());
        assert!(!TransportResponse::new(200, "").is_client_error());
    }

    #[test]
    fn reason_phrase_is_canonical() {
        assert_eq!(TransportResponse::new(418, "").reason, "I'm a teapot");
        assert_eq!(TransportResponse::new(599, "").reason, "");
    }

    #[test]
    fn encoding_deserializes_snake_case() {
        let enc: PayloadEncoding = serde_json::from_str("\"form\"").unwrap();
        assert_eq!(enc, PayloadEncoding::Form);
    }
}
