/// Outcome of a step's `execute`.
///
/// A success may carry business events; they are persisted ahead of the
/// `StepCompleted` lifecycle event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepResult<E> {
    Success {
        events: Vec<E>,
    },
    Failure {
        error_code: String,
        error_message: Option<String>,
    },
}

impl<E> StepResult<E> {
    #[must_use]
    pub fn success() -> Self {
        Self::Success { events: Vec::new() }
    }

    #[must_use]
    pub fn success_with(events: Vec<E>) -> Self {
        Self::Success { events }
    }

    #[must_use]
    pub fn failure(error_code: impl Into<String>, error_message: impl Into<String>) -> Self {
        Self::Failure {
            error_code: error_code.into(),
            error_message: Some(error_message.into()),
        }
    }

    #[must_use]
    pub fn failure_code(error_code: impl Into<String>) -> Self {
        Self::Failure {
            error_code: error_code.into(),
            error_message: None,
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// Outcome of a compensation's `compensate`.
///
/// `Skipped` means there was nothing to undo and counts as success.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompensationResult {
    Success,
    Skipped,
    Failure {
        error_code: String,
        error_message: Option<String>,
    },
}

impl CompensationResult {
    #[must_use]
    pub fn failure(error_code: impl Into<String>, error_message: impl Into<String>) -> Self {
        Self::Failure {
            error_code: error_code.into(),
            error_message: Some(error_message.into()),
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success | Self::Skipped)
    }
}
