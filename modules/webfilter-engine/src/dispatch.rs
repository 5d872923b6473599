//! The subscriber loop.
//!
//! Subscribers are called one at a time in registry order. A subscriber's
//! failure policy can halt the whole event before later subscribers are ever
//! contacted, so the loop is strictly sequential: the worst-case latency added
//! to the host operation is the per-subscriber timeout times the number of
//! subscribers.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::{json, Map, Value};
use tracing::{debug, error, info, warn};
use webfilter_client::{OutboundRequest, SubscriberTransport, TransportResponse};

use crate::halt::{HaltKind, HaltSignal};
use crate::registry::{SubscriberConfig, SubscriberRegistry};

/// Per-subscriber `data` and `exception` sections, in subscriber order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Contributions {
    pub data: Vec<Map<String, Value>>,
    pub exceptions: Vec<Map<String, Value>>,
}

pub struct Dispatcher {
    transport: Arc<dyn SubscriberTransport>,
    registry: Arc<dyn SubscriberRegistry>,
    timeout: Duration,
}

impl Dispatcher {
    pub fn new(
        transport: Arc<dyn SubscriberTransport>,
        registry: Arc<dyn SubscriberRegistry>,
        timeout: Duration,
    ) -> Self {
        Self {
            transport,
            registry,
            timeout,
        }
    }

    fn enabled_subscribers(&self, event: &str) -> Vec<SubscriberConfig> {
        self.registry
            .subscribers_for(event)
            .into_iter()
            .filter(|s| s.enabled && s.event == event)
            .collect()
    }

    fn request(&self, subscriber: &SubscriberConfig, event: &str, payload: &Map<String, Value>) -> OutboundRequest {
        let mut body = payload.clone();
        body.insert(
            "event_metadata".to_string(),
            json!({
                "event_type": event,
                "time": Utc::now().to_rfc3339(),
            }),
        );
        OutboundRequest {
            url: subscriber.webhook_url.clone(),
            body: Value::Object(body),
            encoding: subscriber.encoding,
            timeout: self.timeout,
        }
    }

    /// Send `payload` to every enabled subscriber of `event` and collect what
    /// they propose.
    ///
    /// Returns `Err` only when a subscriber's own policy demands a halt; the
    /// signal is of kind `primary`. Every other failure is logged and the
    /// subscriber's contribution is dropped.
    pub async fn dispatch(
        &self,
        event: &str,
        payload: &Map<String, Value>,
        primary: HaltKind,
    ) -> Result<Contributions, HaltSignal> {
        let mut contributions = Contributions::default();

        for subscriber in self.enabled_subscribers(event) {
            let url = subscriber.webhook_url.as_str();
            info!(event, url, "Webhook filter triggered");

            let request = self.request(&subscriber, event, payload);
            let response = match self.transport.post(&request).await {
                Ok(response) => response,
                Err(e) => {
                    if subscriber.halt_on_request_exception {
                        info!(event, url, error = %e, "Halting on request exception");
                        return Err(HaltSignal::new(primary, e.to_string())
                            .with_redirect(subscriber.redirect_on_request_exception.clone()));
                    }
                    warn!(event, url, error = %e, "Request failed, skipping subscriber");
                    continue;
                }
            };

            if let Some(signal) = status_halt(&subscriber, event, &response, primary) {
                info!(
                    event,
                    url,
                    status = response.status,
                    redirect_to = ?signal.redirect_to,
                    "Halting on subscriber status"
                );
                return Err(signal);
            }

            if response.is_client_error() || response.is_server_error() {
                warn!(event, url, status = response.status, reason = %response.reason, "Subscriber returned error status");
            } else {
                info!(event, url, status = response.status, "Subscriber responded");
            }

            let body = parse_body(url, &response.body);

            if !subscriber.disable_filtering {
                if let Some(data) = section(&body, "data", event, url) {
                    contributions.data.push(data);
                }
            }
            if !subscriber.disable_halt {
                if let Some(exception) = section(&body, "exception", event, url) {
                    contributions.exceptions.push(exception);
                }
            }
        }

        Ok(contributions)
    }

    /// Fire-and-forget delivery for notification-style events. Responses are
    /// ignored and failures never halt. Returns how many subscribers answered
    /// with a 2xx status.
    pub async fn broadcast(&self, event: &str, payload: &Map<String, Value>) -> usize {
        let mut delivered = 0;
        for subscriber in self.enabled_subscribers(event) {
            let url = subscriber.webhook_url.as_str();
            let request = self.request(&subscriber, event, payload);
            match self.transport.post(&request).await {
                Ok(response) if (200..300).contains(&response.status) => {
                    debug!(event, url, status = response.status, "Notification delivered");
                    delivered += 1;
                }
                Ok(response) => {
                    error!(event, url, status = response.status, reason = %response.reason, "Notification rejected");
                }
                Err(e) => error!(event, url, error = %e, "Notification failed"),
            }
        }
        delivered
    }
}

fn status_halt(
    subscriber: &SubscriberConfig,
    event: &str,
    response: &TransportResponse,
    primary: HaltKind,
) -> Option<HaltSignal> {
    let redirect = if response.is_client_error() && subscriber.halt_on_4xx {
        subscriber.redirect_on_4xx.clone()
    } else if response.is_server_error() && subscriber.halt_on_5xx {
        subscriber.redirect_on_5xx.clone()
    } else {
        return None;
    };

    let message = format!(
        "Request to {} after webhook event {} returned status code {} ({})",
        subscriber.webhook_url, event, response.status, response.reason
    );
    Some(
        HaltSignal::new(primary, message)
            .with_redirect(redirect)
            .with_status(response.status),
    )
}

/// A body that is not a JSON object counts as an empty response.
fn parse_body(url: &str, body: &str) -> Map<String, Value> {
    if body.trim().is_empty() {
        debug!(url, "Subscriber returned an empty body");
        return Map::new();
    }
    match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(map)) => map,
        Ok(other) => {
            error!(url, body = %other, "Subscriber returned a non-object JSON body, ignoring it");
            Map::new()
        }
        Err(e) => {
            error!(url, error = %e, "Subscriber returned invalid JSON, ignoring it");
            Map::new()
        }
    }
}

fn section(body: &Map<String, Value>, key: &str, event: &str, url: &str) -> Option<Map<String, Value>> {
    match body.get(key) {
        Some(Value::Object(map)) => Some(map.clone()),
        Some(other) => {
            error!(event, url, section = key, value = %other, "Subscriber returned a non-object section, dropping it");
            None
        }
        None => {
            debug!(event, url, section = key, "Subscriber returned no section");
            None
        }
    }
}
