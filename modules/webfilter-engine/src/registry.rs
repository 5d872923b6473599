//! Read-only view of which subscribers want which events.

use serde::{Deserialize, Serialize};
use webfilter_client::PayloadEncoding;

/// One webhook registered against one event, with its failure policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriberConfig {
    pub event: String,
    pub webhook_url: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Halt the whole event when the request itself fails (refused, timed out).
    #[serde(default)]
    pub halt_on_request_exception: bool,
    #[serde(default)]
    pub redirect_on_request_exception: Option<String>,

    #[serde(default)]
    pub halt_on_4xx: bool,
    #[serde(default)]
    pub redirect_on_4xx: Option<String>,

    #[serde(default)]
    pub halt_on_5xx: bool,
    #[serde(default)]
    pub redirect_on_5xx: Option<String>,

    /// Ignore this subscriber's `data` section.
    #[serde(default)]
    pub disable_filtering: bool,
    /// Ignore this subscriber's `exception` section.
    #[serde(default)]
    pub disable_halt: bool,

    #[serde(default)]
    pub encoding: PayloadEncoding,
}

fn default_enabled() -> bool {
    true
}

impl SubscriberConfig {
    /// Enabled subscriber with no halting policy and both merges on.
    pub fn new(event: impl Into<String>, webhook_url: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            webhook_url: webhook_url.into(),
            enabled: true,
            halt_on_request_exception: false,
            redirect_on_request_exception: None,
            halt_on_4xx: false,
            redirect_on_4xx: None,
            halt_on_5xx: false,
            redirect_on_5xx: None,
            disable_filtering: false,
            disable_halt: false,
            encoding: PayloadEncoding::Json,
        }
    }
}

/// Source of subscriber configuration. Implementations must return
/// subscribers in a stable order; that order decides merge precedence.
pub trait SubscriberRegistry: Send + Sync {
    fn subscribers_for(&self, event: &str) -> Vec<SubscriberConfig>;
}

/// Registry held in memory, typically built from the `[[subscriber]]` table
/// of the config file.
#[derive(Debug, Clone, Default)]
pub struct StaticRegistry {
    subscribers: Vec<SubscriberConfig>,
}

impl StaticRegistry {
    pub fn new(subscribers: Vec<SubscriberConfig>) -> Self {
        Self { subscribers }
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }
}

impl SubscriberRegistry for StaticRegistry {
    fn subscribers_for(&self, event: &str) -> Vec<SubscriberConfig> {
        self.subscribers
            .iter()
            .filter(|s| s.event == event)
            .cloned()
            .collect()
    }
}
