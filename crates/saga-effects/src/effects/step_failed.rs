use saga_core::{
    CompensationResult, CompensationStrategy, SagaEvent, SagaLogEvent, SagaStateView, StepInfo,
    StepKey, codes,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{Guarded, guarded};
use crate::error::Result;
use crate::services::SagaServices;

/// Applies the saga's compensation strategy in reaction to `StepFailed`.
///
/// A failure of a step that has completed since is a replay and emits
/// nothing.
///
/// - `Manual`: record `SagaFailed` and stop.
/// - `RetryThenCompensate`: emit `StepRetry` and restart the step while
///   attempts remain, then behave like `Immediate`.
/// - `Immediate`: emit `SagaCompensating`, compensate every completed step
///   in reverse order, then emit `SagaFailed`. A failed compensation is
///   recorded and the sweep continues.
pub struct StepFailedEffect<S, E> {
    services: SagaServices<S, E>,
}

/// The failure that triggered the effect.
struct Trigger<'a> {
    step_name: &'a str,
    step_order: u32,
    error_code: &'a str,
    error_message: Option<&'a str>,
}

impl Trigger<'_> {
    fn reason(&self) -> String {
        match self.error_message {
            Some(message) => format!(
                "step '{}' failed with {}: {message}",
                self.step_name, self.error_code
            ),
            None => format!("step '{}' failed with {}", self.step_name, self.error_code),
        }
    }
}

impl<S, E> StepFailedEffect<S, E>
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
    /// Returns `EffectError::Cancelled` if `cancel` fires while a
    /// compensation runs. The whole batch is discarded in that case.
    pub async fn handle(
        &self,
        step_name: &str,
        step_order: u32,
        error_code: &str,
        error_message: Option<&str>,
        state: &S,
        cancel: &CancellationToken,
    ) -> Result<Vec<SagaLogEvent<E>>> {
        let already_completed = self
            .services
            .registry()
            .index_of(step_order)
            .and_then(|index| i32::try_from(index).ok())
            .is_some_and(|index| index <= state.last_completed_step_index());
        if already_completed {
            debug!(
                step = step_name,
                order = step_order,
                last_completed = state.last_completed_step_index(),
                "failed step has since completed; ignoring replayed failure"
            );
            return Ok(Vec::new());
        }

        let trigger = Trigger {
            step_name,
            step_order,
            error_code,
            error_message,
        };
        let options = self.services.options();

        match options.compensation_strategy() {
            CompensationStrategy::Manual => {
                info!(
                    step = step_name,
                    error_code, "manual compensation strategy; saga failed without rollback"
                );
                Ok(vec![self.saga_failed(&trigger)])
            }
            CompensationStrategy::RetryThenCompensate => {
                let attempt = state.current_step_attempt();
                let max_attempts = options.max_retries();
                if attempt < max_attempts {
                    Ok(self.retry(&trigger, attempt + 1, max_attempts))
                } else {
                    warn!(
                        step = step_name,
                        attempts = attempt,
                        "retries exhausted; compensating"
                    );
                    self.compensate(&trigger, state, cancel).await
                }
            }
            CompensationStrategy::Immediate => self.compensate(&trigger, state, cancel).await,
        }
    }

    fn retry(
        &self,
        trigger: &Trigger<'_>,
        attempt_number: u32,
        max_attempts: u32,
    ) -> Vec<SagaLogEvent<E>> {
        let now = self.services.clock().now();
        info!(
            step = trigger.step_name,
            attempt = attempt_number,
            max_attempts,
            "retrying failed step"
        );
        vec![
            SagaLogEvent::Saga(SagaEvent::StepRetry {
                step_name: trigger.step_name.to_string(),
                step_order: trigger.step_order,
                attempt_number,
                max_attempts,
                timestamp: now,
            }),
            SagaLogEvent::Saga(SagaEvent::StepStarted {
                step_name: trigger.step_name.to_string(),
                step_order: trigger.step_order,
                timestamp: now,
            }),
        ]
    }

    async fn compensate(
        &self,
        trigger: &Trigger<'_>,
        state: &S,
        cancel: &CancellationToken,
    ) -> Result<Vec<SagaLogEvent<E>>> {
        let registry = self.services.registry();
        let from_step_index = state.last_completed_step_index();
        info!(
            failed_step = trigger.step_name,
            from_step_index, "compensating completed steps"
        );

        let mut events = vec![SagaLogEvent::Saga(SagaEvent::SagaCompensating {
            from_step_index,
            timestamp: self.services.clock().now(),
        })];

        for index in (0..=from_step_index).rev() {
            let Some(step) = registry.step_at(index) else {
                warn!(index, "completed step index is outside the registry");
                continue;
            };
            let Some(key) = step.compensation() else {
                debug!(step = step.name(), "step has no compensation; skipping");
                continue;
            };
            events.push(SagaLogEvent::Saga(
                self.compensate_step(step, key, state, cancel).await?,
            ));
        }

        events.push(self.saga_failed(trigger));
        Ok(events)
    }

    async fn compensate_step(
        &self,
        step: &StepInfo,
        key: &StepKey,
        state: &S,
        cancel: &CancellationToken,
    ) -> Result<SagaEvent> {
        let clock = self.services.clock();
        let step_name = step.name().to_string();

        let Some(compensation) = self.services.resolver().resolve_compensation(key) else {
            warn!(step = %step_name, %key, "compensation could not be resolved");
            return Ok(SagaEvent::StepCompensationFailed {
                step_name,
                error_code: codes::COMPENSATION_EXCEPTION.to_string(),
                error_message: Some(format!("no compensation registered for '{key}'")),
                timestamp: clock.now(),
            });
        };

        let outcome = guarded(compensation.compensate(state, cancel), cancel).await?;
        let (error_code, error_message) = match outcome {
            Guarded::Returned(Ok(
                result @ (CompensationResult::Success | CompensationResult::Skipped),
            )) => {
                debug!(step = %step_name, ?result, "step compensated");
                return Ok(SagaEvent::StepCompensated {
                    step_name,
                    timestamp: clock.now(),
                });
            }
            Guarded::Returned(Ok(CompensationResult::Failure {
                error_code,
                error_message,
            })) => (error_code, error_message),
            Guarded::Returned(Err(error)) => (
                codes::COMPENSATION_EXCEPTION.to_string(),
                Some(format!("{error:#}")),
            ),
            Guarded::Panicked(message) => {
                (codes::COMPENSATION_EXCEPTION.to_string(), Some(message))
            }
        };

        warn!(
            step = %step_name,
            error_code = %error_code,
            "compensation failed; continuing rollback"
        );
        Ok(SagaEvent::StepCompensationFailed {
            step_name,
            error_code,
            error_message,
            timestamp: clock.now(),
        })
    }

    fn saga_failed(&self, trigger: &Trigger<'_>) -> SagaLogEvent<E> {
        SagaLogEvent::Saga(SagaEvent::SagaFailed {
            reason: trigger.reason(),
            timestamp: self.services.clock().now(),
        })
    }
}
