//! Core types for event-sourced saga orchestration.
//!
//! A saga instance owns an append-only log. Every fact about it (started,
//! step started/completed/failed, compensations, terminal outcome) is a
//! [`SagaEvent`] on that log, and its [`SagaState`] is rebuilt by folding
//! the log through a [`SagaReducer`]. The [`StepRegistry`] is the immutable
//! catalogue of steps shared by every instance of a saga type.

pub mod codes;
mod error;
mod event;
mod options;
mod phase;
mod registry;
mod result;
mod state;

pub use error::{ConfigError, RegistryError};
pub use event::{SagaEvent, SagaLogEvent};
pub use options::{CompensationStrategy, DEFAULT_MAX_RETRIES, SagaOptions};
pub use phase::SagaPhase;
pub use registry::{StepHash, StepInfo, StepKey, StepRegistry, StepRegistryBuilder};
pub use result::{CompensationResult, StepResult};
pub use state::{SagaData, SagaReducer, SagaState, SagaStateView, StepFailure};
