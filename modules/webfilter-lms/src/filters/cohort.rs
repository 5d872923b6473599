use async_trait::async_trait;
use tracing::{debug, info};
use webfilter_engine::{EventContext, FilterEngine, FilterResult, HaltKind};

use super::{EventSpec, WebFilter};
use crate::models::CohortChange;

/// A learner is about to be moved between cohorts. Subscribers can only
/// veto; nothing in the change is patchable.
pub struct CohortChangeRequested;

#[async_trait]
impl WebFilter for CohortChangeRequested {
    type Input = CohortChange;

    const SPEC: EventSpec = EventSpec {
        name: "CohortChangeRequested",
        primary: HaltKind::PreventCohortChange,
        halts: &[HaltKind::PreventCohortChange],
    };

    async fn run_filter(&self, engine: &FilterEngine, change: &mut CohortChange) -> FilterResult<()> {
        let spec = Self::SPEC;
        info!(
            event = spec.name,
            user = change.current_membership.user_id,
            from = %change.current_membership.course_user_group.name,
            to = %change.target_cohort.name,
            "Running webhook filter"
        );

        let exchange = {
            let ctx = EventContext::new()
                .with("current_membership", &change.current_membership)
                .with("target_cohort", &change.target_cohort);
            engine.exchange(spec.name, &ctx, spec.primary).await?
        };

        if !exchange.patch.is_empty() {
            debug!(event = spec.name, keys = ?exchange.patch.as_map().keys().collect::<Vec<_>>(), "Ignoring patch for veto-only event");
        }

        FilterEngine::check_halt(&exchange.halts, spec.halts)
    }
}
