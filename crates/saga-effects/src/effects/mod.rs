mod step_completed;
mod step_failed;
mod step_started;

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use tokio_util::sync::CancellationToken;

pub use step_completed::StepCompletedEffect;
pub use step_failed::StepFailedEffect;
pub use step_started::StepStartedEffect;

use crate::error::{EffectError, Result};

/// How a plug-in call ended, with cancellation already filtered out.
enum Guarded<T> {
    Returned(anyhow::Result<T>),
    Panicked(String),
}

/// Runs a step or compensation call so that neither a panic nor an error
/// escapes the effect. Cancellation wins over a result that races it.
async fn guarded<T, F>(call: F, cancel: &CancellationToken) -> Result<Guarded<T>>
where
    F: Future<Output = anyhow::Result<T>>,
{
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(EffectError::Cancelled),
        outcome = AssertUnwindSafe(call).catch_unwind() => Ok(match outcome {
            Ok(returned) => Guarded::Returned(returned),
            Err(payload) => Guarded::Panicked(panic_message(payload.as_ref())),
        }),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|message| (*message).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "panic with non-string payload".to_string())
}
