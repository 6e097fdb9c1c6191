use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle events persisted on a saga's own log.
///
/// These are the durable, replayable record of a saga. Field names and the
/// `type` tag are part of the stored format and must stay stable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SagaEvent {
    SagaStarted {
        saga_id: Uuid,
        /// Registry hash captured at start. `None` disables hash validation.
        step_hash: Option<String>,
        correlation_id: Option<String>,
        started_at: DateTime<Utc>,
    },
    StepStarted {
        step_name: String,
        step_order: u32,
        timestamp: DateTime<Utc>,
    },
    StepCompleted {
        step_name: String,
        step_order: u32,
        timestamp: DateTime<Utc>,
    },
    StepFailed {
        step_name: String,
        step_order: u32,
        error_code: String,
        error_message: Option<String>,
        timestamp: DateTime<Utc>,
    },
    StepRetry {
        step_name: String,
        step_order: u32,
        attempt_number: u32,
        max_attempts: u32,
        timestamp: DateTime<Utc>,
    },
    SagaCompensating {
        /// Ordinal of the last completed step; `-1` when nothing completed.
        from_step_index: i32,
        timestamp: DateTime<Utc>,
    },
    StepCompensated {
        step_name: String,
        timestamp: DateTime<Utc>,
    },
    StepCompensationFailed {
        step_name: String,
        error_code: String,
        error_message: Option<String>,
        timestamp: DateTime<Utc>,
    },
    SagaCompleted {
        timestamp: DateTime<Utc>,
    },
    SagaFailed {
        reason: String,
        timestamp: DateTime<Utc>,
    },
}

impl SagaEvent {
    /// Stable event type name, identical to the serialized `type` tag.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::SagaStarted { .. } => "saga-started",
            Self::StepStarted { .. } => "step-started",
            Self::StepCompleted { .. } => "step-completed",
            Self::StepFailed { .. } => "step-failed",
            Self::StepRetry { .. } => "step-retry",
            Self::SagaCompensating { .. } => "saga-compensating",
            Self::StepCompensated { .. } => "step-compensated",
            Self::StepCompensationFailed { .. } => "step-compensation-failed",
            Self::SagaCompleted { .. } => "saga-completed",
            Self::SagaFailed { .. } => "saga-failed",
        }
    }

    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::SagaStarted { started_at, .. } => *started_at,
            Self::StepStarted { timestamp, .. }
            | Self::StepCompleted { timestamp, .. }
            | Self::StepFailed { timestamp, .. }
            | Self::StepRetry { timestamp, .. }
            | Self::SagaCompensating { timestamp, .. }
            | Self::StepCompensated { timestamp, .. }
            | Self::StepCompensationFailed { timestamp, .. }
            | Self::SagaCompleted { timestamp }
            | Self::SagaFailed { timestamp, .. } => *timestamp,
        }
    }

    /// Whether this event ends the saga.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::SagaCompleted { .. } | Self::SagaFailed { .. })
    }
}

/// One entry on a saga's log: either a lifecycle event or a business event
/// emitted by a step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "event", rename_all = "kebab-case")]
pub enum SagaLogEvent<E> {
    Saga(SagaEvent),
    Business(E),
}

impl<E> SagaLogEvent<E> {
    #[must_use]
    pub fn as_saga(&self) -> Option<&SagaEvent> {
        match self {
            Self::Saga(event) => Some(event),
            Self::Business(_) => None,
        }
    }

    #[must_use]
    pub fn as_business(&self) -> Option<&E> {
        match self {
            Self::Business(event) => Some(event),
            Self::Saga(_) => None,
        }
    }
}

impl<E> From<SagaEvent> for SagaLogEvent<E> {
    fn from(event: SagaEvent) -> Self {
        Self::Saga(event)
    }
}
