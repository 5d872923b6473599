use async_trait::async_trait;
use tracing::info;
use webfilter_engine::{EventContext, FilterEngine, FilterResult, HaltKind};

use super::{apply_user_sections, EventSpec, WebFilter};
use crate::models::User;

/// A learner is trying to sign in. `None` when the credentials did not match
/// any account; subscribers are still told, with an empty context.
pub struct StudentLoginRequested;

#[async_trait]
impl WebFilter for StudentLoginRequested {
    type Input = Option<User>;

    const SPEC: EventSpec = EventSpec {
        name: "StudentLoginRequested",
        primary: HaltKind::PreventLogin,
        halts: &[HaltKind::PreventLogin],
    };

    async fn run_filter(&self, engine: &FilterEngine, user: &mut Option<User>) -> FilterResult<()> {
        let spec = Self::SPEC;
        info!(event = spec.name, user = ?user.as_ref().map(|u| u.username.as_str()), "Running webhook filter");

        let exchange = match user.as_ref() {
            Some(u) => {
                let ctx = EventContext::new().with("user", u).with("profile", &u.profile);
                engine.exchange(spec.name, &ctx, spec.primary).await?
            }
            None => {
                engine
                    .exchange(spec.name, &EventContext::new(), spec.primary)
                    .await?
            }
        };

        if let Some(u) = user.as_mut() {
            apply_user_sections(engine, u, &exchange.patch).await?;
        }

        FilterEngine::check_halt(&exchange.halts, spec.halts)
    }
}
