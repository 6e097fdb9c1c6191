//! Effects that drive a saga forward from its own event log.
//!
//! Each effect reacts to one lifecycle event and returns the events to
//! append next:
//!
//! - [`StepStartedEffect`] runs the step and reports completion or failure.
//! - [`StepCompletedEffect`] applies the post-step delay and starts the next
//!   step, or completes the saga.
//! - [`StepFailedEffect`] applies the saga's compensation strategy.
//!
//! [`SagaEffects`] routes an event to the one effect it triggers. Effects
//! never mutate state and never append; the hosting layer does both.

mod clock;
mod context;
mod dispatch;
mod effects;
mod error;
mod resolver;
mod services;
mod step;

#[cfg(any(test, feature = "testing"))]
pub use clock::ManualClock;
pub use clock::{Clock, SystemClock};
pub use context::StepContext;
pub use dispatch::SagaEffects;
pub use effects::{StepCompletedEffect, StepFailedEffect, StepStartedEffect};
pub use error::EffectError;
pub use resolver::{StepCatalog, StepResolver};
pub use services::SagaServices;
pub use step::{Compensation, SagaStep};
