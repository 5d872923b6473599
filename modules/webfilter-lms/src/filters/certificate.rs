use async_trait::async_trait;
use serde_json::Value;
use tracing::{info, warn};
use webfilter_engine::{EventContext, FilterEngine, FilterResult, HaltKind};

use super::{EventSpec, WebFilter};
use crate::models::CertificateRender;

/// The certificate page is about to render. Subscribers may add or replace
/// keys of the render `context`, swap the `custom_template`, or stop the
/// render by redirecting, showing the invalid-certificate page or replacing
/// the response outright.
pub struct CertificateRenderStarted;

#[async_trait]
impl WebFilter for CertificateRenderStarted {
    type Input = CertificateRender;

    const SPEC: EventSpec = EventSpec {
        name: "CertificateRenderStarted",
        primary: HaltKind::RedirectToPage,
        halts: &[
            HaltKind::RedirectToPage,
            HaltKind::RenderAlternativeInvalidCertificate,
            HaltKind::RenderCustomResponse,
        ],
    };

    async fn run_filter(&self, engine: &FilterEngine, render: &mut CertificateRender) -> FilterResult<()> {
        let spec = Self::SPEC;
        info!(event = spec.name, template = ?render.custom_template, "Running webhook filter");

        let exchange = {
            let ctx = EventContext::new()
                .with("context", &render.context)
                .with("custom_template", &render.custom_template);
            engine.exchange(spec.name, &ctx, spec.primary).await?
        };

        match exchange.patch.get("context") {
            Some(Value::Object(updates)) => {
                let serializer = engine.serializer();
                for (key, value) in updates {
                    if serializer.drops(key) {
                        warn!(event = spec.name, field = %key, "Refusing to patch protected context key");
                        continue;
                    }
                    render.context.insert(key.clone(), value.clone());
                }
            }
            Some(other) => warn!(event = spec.name, value = %other, "Ignoring non-object context patch"),
            None => {}
        }
        match exchange.patch.get("custom_template") {
            Some(Value::String(template)) => render.custom_template = Some(template.clone()),
            Some(Value::Null) => render.custom_template = None,
            Some(other) => warn!(event = spec.name, value = %other, "Ignoring non-string custom_template"),
            None => {}
        }

        FilterEngine::check_halt(&exchange.halts, spec.halts)
    }
}
