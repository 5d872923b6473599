//! In-memory transport for tests. No network required.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use serde_json::Value;
use webfilter_client::{OutboundRequest, SubscriberTransport, TransportError, TransportResponse};

#[derive(Debug, Clone)]
enum Outcome {
    Respond { status: u16, body: String },
    Timeout,
    Refuse,
}

/// Replays a canned outcome per URL and records every request it is given.
/// URLs without a script behave like a refused connection.
#[derive(Default)]
pub struct ScriptedTransport {
    outcomes: Mutex<HashMap<String, Outcome>>,
    requests: Mutex<Vec<OutboundRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(self, url: &str, status: u16, body: impl Into<String>) -> Self {
        self.script(
            url,
            Outcome::Respond {
                status,
                body: body.into(),
            },
        )
    }

    pub fn json(self, url: &str, status: u16, body: Value) -> Self {
        self.respond(url, status, body.to_string())
    }

    pub fn timeout(self, url: &str) -> Self {
        self.script(url, Outcome::Timeout)
    }

    pub fn refuse(self, url: &str) -> Self {
        self.script(url, Outcome::Refuse)
    }

    fn script(self, url: &str, outcome: Outcome) -> Self {
        self.outcomes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(url.to_string(), outcome);
        self
    }

    /// Every request posted so far, in order.
    pub fn requests(&self) -> Vec<OutboundRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn called_urls(&self) -> Vec<String> {
        self.requests().into_iter().map(|r| r.url).collect()
    }
}

#[async_trait]
impl SubscriberTransport for ScriptedTransport {
    async fn post(&self, request: &OutboundRequest) -> webfilter_client::Result<TransportResponse> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());

        let outcome = self
            .outcomes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&request.url)
            .cloned()
            .unwrap_or(Outcome::Refuse);

        match outcome {
            Outcome::Respond { status, body } => Ok(TransportResponse::new(status, body)),
            Outcome::Timeout => Err(TransportError::Timeout {
                url: request.url.clone(),
            }),
            Outcome::Refuse => Err(TransportError::Connect {
                url: request.url.clone(),
                message: "connection refused".to_string(),
            }),
        }
    }
}
