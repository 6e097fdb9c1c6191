use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Execution context handed to a step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepContext {
    pub saga_id: Uuid,
    pub saga_type: String,
    pub correlation_id: Option<String>,
    pub started_at: DateTime<Utc>,
    pub step_name: String,
    pub step_order: u32,
    /// 1 on the first run, incremented by each retry.
    pub attempt: u32,
}

impl StepContext {
    #[must_use]
    pub fn is_retry(&self) -> bool {
        self.attempt > 1
    }
}
