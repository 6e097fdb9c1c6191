use std::time::Duration;

use saga_core::{SagaEvent, SagaLogEvent, SagaStateView, StepInfo, StepResult, codes};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{Guarded, guarded};
use crate::clock::Clock;
use crate::context::StepContext;
use crate::error::Result;
use crate::services::SagaServices;

/// Runs a step in reaction to `StepStarted`.
///
/// Guards run in order: registry hash, already-completed replay, unknown
/// order. Only then is the step resolved and executed, and its outcome is
/// turned into events: business events followed by `StepCompleted`, or a
/// single `StepFailed`.
pub struct StepStartedEffect<S, E> {
    services: SagaServices<S, E>,
}

impl<S, E> StepStartedEffect<S, E>
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
    /// Returns `EffectError::Cancelled` if `cancel` fires before the step
    /// returns. No events are produced in that case.
    pub async fn handle(
        &self,
        step_name: &str,
        step_order: u32,
        state: &S,
        cancel: &CancellationToken,
    ) -> Result<Vec<SagaLogEvent<E>>> {
        let registry = self.services.registry();

        let current_hash = registry.step_hash();
        if !current_hash.matches(state.step_hash()) {
            let recorded = state.step_hash().unwrap_or_default();
            warn!(
                step = step_name,
                order = step_order,
                recorded,
                current = %current_hash,
                "step registry changed since saga started; refusing to run step"
            );
            return Ok(vec![self.failed(
                step_name,
                step_order,
                codes::STEP_HASH_MISMATCH,
                Some(format!(
                    "saga started with step hash {recorded} but registry hash is {current_hash}"
                )),
            )]);
        }

        if let Some(index) = registry.index_of(step_order) {
            let already_completed = i32::try_from(index)
                .is_ok_and(|index| index <= state.last_completed_step_index());
            if already_completed {
                debug!(
                    step = step_name,
                    order = step_order,
                    last_completed = state.last_completed_step_index(),
                    "step already completed; ignoring replayed start"
                );
                return Ok(Vec::new());
            }
        }

        let Some(step_info) = registry.step_by_order(step_order) else {
            warn!(step = step_name, order = step_order, "no step registered for order");
            return Ok(vec![self.failed(
                step_name,
                step_order,
                codes::STEP_NOT_FOUND,
                Some(format!("no step registered with order {step_order}")),
            )]);
        };

        let Some(step) = self
            .services
            .resolver()
            .resolve_step(step_info.implementation())
        else {
            warn!(
                step = step_name,
                key = %step_info.implementation(),
                "step implementation could not be resolved"
            );
            return Ok(vec![self.failed(
                step_name,
                step_order,
                codes::STEP_EXCEPTION,
                Some(format!(
                    "no step implementation registered for '{}'",
                    step_info.implementation()
                )),
            )]);
        };

        let context = self.context(step_info, state);
        let timeout = step_info
            .timeout()
            .or_else(|| self.services.options().default_step_timeout());
        debug!(
            saga_id = %context.saga_id,
            step = step_name,
            order = step_order,
            attempt = context.attempt,
            "executing step"
        );

        let outcome = tokio::select! {
            biased;
            outcome = guarded(step.execute(state, &context, cancel), cancel) => outcome?,
            () = expire(self.services.clock(), timeout, cancel) => {
                warn!(step = step_name, order = step_order, ?timeout, "step timed out");
                return Ok(vec![self.failed(
                    step_name,
                    step_order,
                    codes::STEP_TIMEOUT,
                    Some(format!("step did not finish within {timeout:?}")),
                )]);
            }
        };

        let events = match outcome {
            Guarded::Returned(Ok(StepResult::Success { events })) => {
                info!(
                    saga_id = %context.saga_id,
                    step = step_name,
                    order = step_order,
                    business_events = events.len(),
                    "step completed"
                );
                events
                    .into_iter()
                    .map(SagaLogEvent::Business)
                    .chain(std::iter::once(SagaLogEvent::Saga(
                        SagaEvent::StepCompleted {
                            step_name: step_name.to_string(),
                            step_order,
                            timestamp: self.services.clock().now(),
                        },
                    )))
                    .collect()
            }
            Guarded::Returned(Ok(StepResult::Failure {
                error_code,
                error_message,
            })) => {
                warn!(
                    saga_id = %context.saga_id,
                    step = step_name,
                    order = step_order,
                    error_code = %error_code,
                    "step reported failure"
                );
                vec![self.failed(step_name, step_order, &error_code, error_message)]
            }
            Guarded::Returned(Err(error)) => {
                warn!(
                    step = step_name,
                    order = step_order,
                    error = %error,
                    "step returned an error"
                );
                vec![self.failed(
                    step_name,
                    step_order,
                    codes::STEP_EXCEPTION,
                    Some(format!("{error:#}")),
                )]
            }
            Guarded::Panicked(message) => {
                warn!(step = step_name, order = step_order, panic = %message, "step panicked");
                vec![self.failed(step_name, step_order, codes::STEP_EXCEPTION, Some(message))]
            }
        };
        Ok(events)
    }

    fn context(&self, step_info: &StepInfo, state: &S) -> StepContext {
        StepContext {
            saga_id: state.saga_id().unwrap_or_else(Uuid::new_v4),
            saga_type: self.services.saga_type().to_string(),
            correlation_id: state.correlation_id().map(str::to_string),
            started_at: state
                .started_at()
                .unwrap_or_else(|| self.services.clock().now()),
            step_name: step_info.name().to_string(),
            step_order: step_info.order(),
            attempt: state.current_step_attempt().max(1),
        }
    }

    fn failed(
        &self,
        step_name: &str,
        step_order: u32,
        error_code: &str,
        error_message: Option<String>,
    ) -> SagaLogEvent<E> {
        SagaLogEvent::Saga(SagaEvent::StepFailed {
            step_name: step_name.to_string(),
            step_order,
            error_code: error_code.to_string(),
            error_message,
            timestamp: self.services.clock().now(),
        })
    }
}

/// Resolves once `timeout` elapsed on `clock`; never resolves without a
/// timeout or after cancellation.
async fn expire(clock: &dyn Clock, timeout: Option<Duration>, cancel: &CancellationToken) {
    if let Some(timeout) = timeout {
        if clock.delay(timeout, cancel).await.is_ok() {
            return;
        }
    }
    std::future::pending::<()>().await;
}
