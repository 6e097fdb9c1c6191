use async_trait::async_trait;
use saga_core::{CompensationResult, StepResult};
use tokio_util::sync::CancellationToken;

use crate::context::StepContext;

/// Forward work of one saga step.
///
/// Implementations must be idempotent: a step can run again after a retry or
/// a redelivered event. Returning `Err` (or panicking) is recorded as a
/// `STEP_EXCEPTION` failure; business failures should be returned as
/// [`StepResult::Failure`] with a meaningful code.
#[async_trait]
pub trait SagaStep<S, E>: Send + Sync {
    async fn execute(
        &self,
        state: &S,
        context: &StepContext,
        cancel: &CancellationToken,
    ) -> anyhow::Result<StepResult<E>>;
}

/// Undo action paired with a step, run in reverse order when the saga
/// compensates.
///
/// Must be idempotent. `Err` and panics are recorded as
/// `COMPENSATION_EXCEPTION` and never stop the sweep.
#[async_trait]
pub trait Compensation<S>: Send + Sync {
    async fn compensate(
        &self,
        state: &S,
        cancel: &CancellationToken,
    ) -> anyhow::Result<CompensationResult>;
}
