use saga_core::{SagaEvent, SagaLogEvent, SagaStateView, StepInfo};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::Result;
use crate::services::SagaServices;

/// Advances the saga in reaction to `StepCompleted`.
///
/// Waits out the completed step's post-step delay, then starts the step with
/// the next greater order, or completes the saga when there is none.
pub struct StepCompletedEffect<S, E> {
    services: SagaServices<S, E>,
}

impl<S, E> StepCompletedEffect<S, E>
where
    S: SagaStateView + Sync + 'static,
    E: Send + 'static,
{
    #[must_use]
    pub fn new(services: SagaServices<S, E>) -> Self {
        Self { services }
    }

    /// # Errors
    ///
    /// Returns `EffectError::Cancelled` if `cancel` fires during the
    /// post-step delay. No events are produced in that case.
    pub async fn handle(
        &self,
        step_name: &str,
        step_order: u32,
        state: &S,
        cancel: &CancellationToken,
    ) -> Result<Vec<SagaLogEvent<E>>> {
        let registry = self.services.registry();
        let clock = self.services.clock();

        let delay = registry
            .step_by_order(step_order)
            .and_then(StepInfo::post_step_delay);
        if let Some(delay) = delay.filter(|_| !state.is_compensating()) {
            debug!(step = step_name, order = step_order, ?delay, "applying post-step delay");
            clock.delay(delay, cancel).await?;
        }

        let event = match registry.next_after_order(step_order) {
            Some(next) => {
                debug!(
                    completed = step_name,
                    next = next.name(),
                    order = next.order(),
                    "starting next step"
                );
                SagaEvent::StepStarted {
                    step_name: next.name().to_string(),
                    step_order: next.order(),
                    timestamp: clock.now(),
                }
            }
            None => {
                info!(
                    saga_type = self.services.saga_type(),
                    last_step = step_name,
                    "saga completed"
                );
                SagaEvent::SagaCompleted {
                    timestamp: clock.now(),
                }
            }
        };
        Ok(vec![SagaLogEvent::Saga(event)])
    }
}
