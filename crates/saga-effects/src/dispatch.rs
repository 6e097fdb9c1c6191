use saga_core::{SagaEvent, SagaLogEvent, SagaStateView};
use tokio_util::sync::CancellationToken;

use crate::effects::{StepCompletedEffect, StepFailedEffect, StepStartedEffect};
use crate::error::Result;
use crate::services::SagaServices;

/// Routes a lifecycle event to the single effect it triggers.
pub struct SagaEffects<S, E> {
    step_started: StepStartedEffect<S, E>,
    step_completed: StepCompletedEffect<S, E>,
    step_failed: StepFailedEffect<S, E>,
}

impl<S, E> SagaEffects<S, E>
where
    S: SagaStateView + Sync + 'static,
    E: Send + 'static,
{
    #[must_use]
    pub fn new(services: SagaServices<S, E>) -> Self {
        Self {
            step_started: StepStartedEffect::new(services.clone()),
            step_completed: StepCompletedEffect::new(services.clone()),
            step_failed: StepFailedEffect::new(services),
        }
    }

    /// Whether `event` triggers an effect at all.
    #[must_use]
    pub fn triggers(event: &SagaEvent) -> bool {
        matches!(
            event,
            SagaEvent::StepStarted { .. }
                | SagaEvent::StepCompleted { .. }
                | SagaEvent::StepFailed { .. }
        )
    }

    /// Runs the effect for `event` against `state`, which must reflect every
    /// event up to and including `event`.
    ///
    /// # Errors
    ///
    /// Returns `EffectError::Cancelled` when `cancel` fires mid-effect.
    pub async fn handle(
        &self,
        event: &SagaEvent,
        state: &S,
        cancel: &CancellationToken,
    ) -> Result<Vec<SagaLogEvent<E>>> {
        match event {
            SagaEvent::StepStarted {
                step_name,
                step_order,
                ..
            } => {
                self.step_started
                    .handle(step_name, *step_order, state, cancel)
                    .await
            }
            SagaEvent::StepCompleted {
                step_name,
                step_order,
                ..
            } => {
                self.step_completed
                    .handle(step_name, *step_order, state, cancel)
                    .await
            }
            SagaEvent::StepFailed {
                step_name,
                step_order,
                error_code,
                error_message,
                ..
            } => {
                self.step_failed
                    .handle(
                        step_name,
                        *step_order,
                        error_code,
                        error_message.as_deref(),
                        state,
                        cancel,
                    )
                    .await
            }
            SagaEvent::SagaStarted { .. }
            | SagaEvent::StepRetry { .. }
            | SagaEvent::SagaCompensating { .. }
            | SagaEvent::StepCompensated { .. }
            | SagaEvent::StepCompensationFailed { .. }
            | SagaEvent::SagaCompleted { .. }
            | SagaEvent::SagaFailed { .. } => Ok(Vec::new()),
        }
    }
}
