//! The orchestrator hosts call from their filter entry points.
//!
//! One filter run is: [`FilterEngine::exchange`] (serialize, dispatch, merge),
//! then [`FilterEngine::apply`] for each patched object, then
//! [`FilterEngine::check_halt`] with the event's supported halt kinds. Hosts
//! decide what lives in each patch section; the engine never guesses.

use std::sync::Arc;

use anyhow::Context;
use serde_json::Value;
use tracing::{error, info};
use webfilter_client::{HttpTransport, SubscriberTransport};

use crate::config::{DispatchSettings, FileConfig};
use crate::dispatch::Dispatcher;
use crate::error::{FilterError, FilterResult};
use crate::halt::{reconstruct, HaltKind};
use crate::merge::{merge, MergedHaltRequests, MergedPatch};
use crate::patch::{self, ApplyReport, Patchable};
use crate::payload::{EventContext, PayloadSerializer};
use crate::persist::EntityStore;
use crate::registry::SubscriberRegistry;

/// What every subscriber of one event proposed, merged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Exchange {
    pub patch: MergedPatch,
    pub halts: MergedHaltRequests,
}

pub struct FilterEngine {
    dispatcher: Dispatcher,
    serializer: PayloadSerializer,
    store: Arc<dyn EntityStore>,
}

impl FilterEngine {
    pub fn new(
        transport: Arc<dyn SubscriberTransport>,
        registry: Arc<dyn SubscriberRegistry>,
        store: Arc<dyn EntityStore>,
        settings: &DispatchSettings,
    ) -> Self {
        Self {
            dispatcher: Dispatcher::new(transport, registry, settings.timeout()),
            serializer: settings.serializer(),
            store,
        }
    }

    /// Production wiring: `reqwest` transport and the config file's
    /// subscriber table.
    pub fn from_config(config: &FileConfig, store: Arc<dyn EntityStore>) -> anyhow::Result<Self> {
        let transport =
            HttpTransport::new(&config.dispatch.user_agent).context("Failed to build HTTP transport")?;
        Ok(Self::new(
            Arc::new(transport),
            Arc::new(config.registry()),
            store,
            &config.dispatch,
        ))
    }

    pub fn serializer(&self) -> &PayloadSerializer {
        &self.serializer
    }

    /// Serialize `context`, post it to every enabled subscriber of `event`
    /// and merge their answers. A subscriber whose failure policy says so
    /// halts the run with a signal of kind `primary`.
    pub async fn exchange(
        &self,
        event: &str,
        context: &EventContext<'_>,
        primary: HaltKind,
    ) -> FilterResult<Exchange> {
        let payload = self.serializer.serialize_context(context);
        let contributions = self.dispatcher.dispatch(event, &payload, primary).await?;
        let (patch, halts) = merge(contributions);
        Ok(Exchange { patch, halts })
    }

    /// Apply one patch section onto `target`, persisting it when anything
    /// changed. An absent section is a no-op.
    pub async fn apply<T: Patchable>(
        &self,
        target: &mut T,
        section: Option<&Value>,
    ) -> FilterResult<ApplyReport> {
        let Some(section) = section else {
            return Ok(ApplyReport::default());
        };
        let Some(fields) = section.as_object() else {
            error!(entity = T::ENTITY, value = %section, "Patch section is not an object, ignoring it");
            return Ok(ApplyReport::default());
        };

        let report = patch::apply(target, fields, &self.serializer);
        if report.changed() {
            self.store
                .save(T::ENTITY, target.identity(), Value::Object(target.snapshot()))
                .await
                .map_err(|e| FilterError::Persist {
                    entity: T::ENTITY,
                    source: e.into(),
                })?;
        }
        Ok(report)
    }

    /// Raise the highest-priority halt in `supported` that a subscriber asked
    /// for.
    pub fn check_halt(halts: &MergedHaltRequests, supported: &[HaltKind]) -> FilterResult<()> {
        match reconstruct(halts, supported) {
            Some(signal) => {
                info!(halt = %signal.kind, redirect_to = ?signal.redirect_to, "Subscriber requested halt");
                Err(signal.into())
            }
            None => Ok(()),
        }
    }

    /// Notify subscribers of an event that already happened. Never halts and
    /// never mutates; returns how many subscribers accepted the delivery.
    pub async fn broadcast(&self, event: &str, context: &EventContext<'_>) -> usize {
        let payload = self.serializer.serialize_context(context);
        self.dispatcher.broadcast(event, &payload).await
    }
}
