use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::event::{SagaEvent, SagaLogEvent};
use crate::phase::SagaPhase;
use crate::registry::StepRegistry;

/// Read access the effects need from a saga's state.
///
/// Only `last_completed_step_index` is required. State shapes that do not
/// track saga identity keep the defaults, and the effects synthesize an
/// identity for the step context instead.
pub trait SagaStateView {
    /// Ordinal of the last completed step, `-1` before any step completed.
    fn last_completed_step_index(&self) -> i32;

    /// Registry hash captured at start; `None` disables hash validation.
    fn step_hash(&self) -> Option<&str> {
        None
    }

    /// Attempt number of the current step, starting at 1.
    fn current_step_attempt(&self) -> u32 {
        1
    }

    /// Whether the saga is unwinding; forward-path delays are skipped then.
    fn is_compensating(&self) -> bool {
        false
    }

    fn saga_id(&self) -> Option<Uuid> {
        None
    }

    fn correlation_id(&self) -> Option<&str> {
        None
    }

    fn started_at(&self) -> Option<DateTime<Utc>> {
        None
    }
}

/// Business data folded from the business events a saga's steps emit.
pub trait SagaData<E> {
    fn apply(&mut self, event: &E);
}

impl<E> SagaData<E> for () {
    fn apply(&mut self, _event: &E) {}
}

/// The most recent step failure recorded on the log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepFailure {
    pub step_name: String,
    pub step_order: u32,
    pub error_code: String,
    pub error_message: Option<String>,
}

/// Replay-built state of one saga instance.
///
/// Never mutated directly: only [`SagaReducer`] changes it, one log entry
/// at a time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SagaState<D> {
    pub saga_id: Option<Uuid>,
    pub phase: SagaPhase,
    pub last_completed_step_index: i32,
    pub step_hash: Option<String>,
    pub correlation_id: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub current_step_attempt: u32,
    pub last_error: Option<StepFailure>,
    pub compensated_steps: Vec<String>,
    pub failed_compensations: Vec<String>,
    pub failure_reason: Option<String>,
    pub finished_at: Option<DateTime<Utc>>,
    pub data: D,
}

impl<D: Default> Default for SagaState<D> {
    fn default() -> Self {
        Self::new(D::default())
    }
}

impl<D> SagaState<D> {
    #[must_use]
    pub fn new(data: D) -> Self {
        Self {
            saga_id: None,
            phase: SagaPhase::NotStarted,
            last_completed_step_index: -1,
            step_hash: None,
            correlation_id: None,
            started_at: None,
            current_step_attempt: 1,
            last_error: None,
            compensated_steps: Vec::new(),
            failed_compensations: Vec::new(),
            failure_reason: None,
            finished_at: None,
            data,
        }
    }
}

impl<D> SagaStateView for SagaState<D> {
    fn last_completed_step_index(&self) -> i32 {
        self.last_completed_step_index
    }

    fn step_hash(&self) -> Option<&str> {
        self.step_hash.as_deref()
    }

    fn current_step_attempt(&self) -> u32 {
        self.current_step_attempt
    }

    fn is_compensating(&self) -> bool {
        self.phase == SagaPhase::Compensating
    }

    fn saga_id(&self) -> Option<Uuid> {
        self.saga_id
    }

    fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }

    fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }
}

/// Folds log entries into [`SagaState`].
///
/// Holds the registry so `StepCompleted` orders can be turned into ordinal
/// positions.
#[derive(Debug, Clone)]
pub struct SagaReducer {
    registry: Arc<StepRegistry>,
}

impl SagaReducer {
    #[must_use]
    pub fn new(registry: Arc<StepRegistry>) -> Self {
        Self { registry }
    }

    /// Rebuilds state from a full log.
    pub fn replay<'a, D, E>(
        &self,
        initial: SagaState<D>,
        log: impl IntoIterator<Item = &'a SagaLogEvent<E>>,
    ) -> SagaState<D>
    where
        D: SagaData<E>,
        E: 'a,
    {
        let mut state = initial;
        for event in log {
            self.reduce(&mut state, event);
        }
        state
    }

    pub fn reduce<D, E>(&self, state: &mut SagaState<D>, event: &SagaLogEvent<E>)
    where
        D: SagaData<E>,
    {
        if state.phase.is_terminal() {
            debug!(phase = %state.phase, "ignoring event on terminal saga");
            return;
        }

        match event {
            SagaLogEvent::Business(business) => state.data.apply(business),
            SagaLogEvent::Saga(saga_event) => self.reduce_lifecycle(state, saga_event),
        }
    }

    fn reduce_lifecycle<D>(&self, state: &mut SagaState<D>, event: &SagaEvent) {
        match event {
            SagaEvent::SagaStarted {
                saga_id,
                step_hash,
                correlation_id,
                started_at,
            } => {
                if state.phase != SagaPhase::NotStarted {
                    warn!(
                        %saga_id,
                        phase = %state.phase,
                        "saga started twice; keeping first start"
                    );
                    return;
                }
                state.saga_id = Some(*saga_id);
                state.phase = SagaPhase::Running;
                state.step_hash.clone_from(step_hash);
                state.correlation_id.clone_from(correlation_id);
                state.started_at = Some(*started_at);
                state.last_completed_step_index = -1;
                state.current_step_attempt = 1;
            }
            SagaEvent::StepStarted { .. } => {}
            SagaEvent::StepCompleted {
                step_name,
                step_order,
                ..
            } => {
                let Some(index) = self.registry.index_of(*step_order) else {
                    warn!(
                        step = %step_name,
                        order = step_order,
                        "completed step is not in the registry; progress unchanged"
                    );
                    return;
                };
                let index = i32::try_from(index).unwrap_or(i32::MAX);
                state.last_completed_step_index = state.last_completed_step_index.max(index);
                state.current_step_attempt = 1;
            }
            SagaEvent::StepFailed {
                step_name,
                step_order,
                error_code,
                error_message,
                ..
            } => {
                state.last_error = Some(StepFailure {
                    step_name: step_name.clone(),
                    step_order: *step_order,
                    error_code: error_code.clone(),
                    error_message: error_message.clone(),
                });
            }
            SagaEvent::StepRetry { attempt_number, .. } => {
                state.current_step_attempt = *attempt_number;
            }
            SagaEvent::SagaCompensating { .. } => {
                state.phase = SagaPhase::Compensating;
            }
            SagaEvent::StepCompensated { step_name, .. } => {
                state.compensated_steps.push(step_name.clone());
            }
            SagaEvent::StepCompensationFailed { step_name, .. } => {
                state.failed_compensations.push(step_name.clone());
            }
            SagaEvent::SagaCompleted { timestamp } => {
                state.phase = SagaPhase::Completed;
                state.finished_at = Some(*timestamp);
            }
            SagaEvent::SagaFailed { reason, timestamp } => {
                state.phase = if state.phase == SagaPhase::Compensating
                    && state.failed_compensations.is_empty()
                {
                    SagaPhase::Compensated
                } else {
                    SagaPhase::Failed
                };
                state.failure_reason = Some(reason.clone());
                state.finished_at = Some(*timestamp);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::StepInfo;

    #[derive(Debug, Default, PartialEq)]
    struct Ledger {
        lines: Vec<String>,
    }

    impl SagaData<String> for Ledger {
        fn apply(&mut self, event: &String) {
            self.lines.push(event.clone());
        }
    }

    fn reducer() -> SagaReducer {
        let registry = StepRegistry::builder("orders")
            .step(StepInfo::new(10, "reserve", "orders.reserve"))
            .step(StepInfo::new(20, "charge", "orders.charge"))
            .step(StepInfo::new(30, "ship", "orders.ship"))
            .build()
            .expect("valid registry");
        SagaReducer::new(Arc::new(registry))
    }

    fn saga(event: SagaEvent) -> SagaLogEvent<String> {
        SagaLogEvent::Saga(event)
    }

    fn started(saga_id: Uuid) -> SagaLogEvent<String> {
        saga(SagaEvent::SagaStarted {
            saga_id,
            step_hash: Some("abc".to_string()),
            correlation_id: Some("corr-1".to_string()),
            started_at: Utc::now(),
        })
    }

    fn completed(name: &str, order: u32) -> SagaLogEvent<String> {
        saga(SagaEvent::StepCompleted {
            step_name: name.to_string(),
            step_order: order,
            timestamp: Utc::now(),
        })
    }

    #[test]
    fn new_state_has_no_completed_steps() {
        let state: SagaState<()> = SagaState::default();

        assert_eq!(state.phase, SagaPhase::NotStarted);
        assert_eq!(state.last_completed_step_index, -1);
        assert_eq!(state.current_step_attempt, 1);
    }

    #[test]
    fn saga_started_captures_identity() {
        let saga_id = Uuid::new_v4();

        let state = reducer().replay(SagaState::<Ledger>::default(), &[started(saga_id)]);

        assert_eq!(state.phase, SagaPhase::Running);
        assert_eq!(state.saga_id, Some(saga_id));
        assert_eq!(SagaStateView::step_hash(&state), Some("abc"));
        assert_eq!(SagaStateView::correlation_id(&state), Some("corr-1"));
    }

    #[test]
    fn step_completed_records_ordinal_not_order() {
        let log = vec![started(Uuid::new_v4()), completed("reserve", 10), completed("charge", 20)];

        let state = reducer().replay(SagaState::<Ledger>::default(), &log);

        assert_eq!(state.last_completed_step_index, 1);
    }

    #[test]
    fn replayed_completion_never_moves_index_backwards() {
        let log = vec![
            started(Uuid::new_v4()),
            completed("reserve", 10),
            completed("charge", 20),
            completed("reserve", 10),
        ];

        let state = reducer().replay(SagaState::<Ledger>::default(), &log);

        assert_eq!(state.last_completed_step_index, 1);
    }

    #[test]
    fn completion_of_unregistered_order_leaves_progress_alone() {
        let log = vec![
            started(Uuid::new_v4()),
            completed("reserve", 10),
            completed("ghost", 15),
        ];

        let state = reducer().replay(SagaState::<Ledger>::default(), &log);

        assert_eq!(state.last_completed_step_index, 0);
        assert_eq!(state.phase, SagaPhase::Running);
    }

    #[test]
    fn retry_sets_attempt_and_completion_resets_it() {
        let reducer = reducer();
        let mut state = reducer.replay(SagaState::<Ledger>::default(), &[started(Uuid::new_v4())]);

        reducer.reduce(
            &mut state,
            &saga(SagaEvent::StepRetry {
                step_name: "reserve".to_string(),
                step_order: 10,
                attempt_number: 2,
                max_attempts: 3,
                timestamp: Utc::now(),
            }),
        );
        assert_eq!(state.current_step_attempt, 2);

        reducer.reduce(&mut state, &completed("reserve", 10));
        assert_eq!(state.current_step_attempt, 1);
    }

    #[test]
    fn business_events_fold_into_data() {
        let log = vec![
            started(Uuid::new_v4()),
            SagaLogEvent::Business("stock reserved".to_string()),
            completed("reserve", 10),
        ];

        let state = reducer().replay(SagaState::<Ledger>::default(), &log);

        assert_eq!(state.data.lines, vec!["stock reserved".to_string()]);
    }

    #[test]
    fn clean_sweep_ends_compensated() {
        let now = Utc::now();
        let log = vec![
            started(Uuid::new_v4()),
            completed("reserve", 10),
            saga(SagaEvent::SagaCompensating {
                from_step_index: 0,
                timestamp: now,
            }),
            saga(SagaEvent::StepCompensated {
                step_name: "reserve".to_string(),
                timestamp: now,
            }),
            saga(SagaEvent::SagaFailed {
                reason: "charge failed".to_string(),
                timestamp: now,
            }),
        ];

        let state = reducer().replay(SagaState::<Ledger>::default(), &log);

        assert_eq!(state.phase, SagaPhase::Compensated);
        assert_eq!(state.compensated_steps, vec!["reserve".to_string()]);
        assert_eq!(state.failure_reason.as_deref(), Some("charge failed"));
    }

    #[test]
    fn sweep_with_failed_compensation_ends_failed() {
        let now = Utc::now();
        let log = vec![
            started(Uuid::new_v4()),
            completed("reserve", 10),
            saga(SagaEvent::SagaCompensating {
                from_step_index: 0,
                timestamp: now,
            }),
            saga(SagaEvent::StepCompensationFailed {
                step_name: "reserve".to_string(),
                error_code: "E1".to_string(),
                error_message: None,
                timestamp: now,
            }),
            saga(SagaEvent::SagaFailed {
                reason: "charge failed".to_string(),
                timestamp: now,
            }),
        ];

        let state = reducer().replay(SagaState::<Ledger>::default(), &log);

        assert_eq!(state.phase, SagaPhase::Failed);
        assert_eq!(state.failed_compensations, vec!["reserve".to_string()]);
    }

    #[test]
    fn failure_without_sweep_ends_failed_and_keeps_last_error() {
        let now = Utc::now();
        let log = vec![
            started(Uuid::new_v4()),
            saga(SagaEvent::StepFailed {
                step_name: "reserve".to_string(),
                step_order: 10,
                error_code: "OUT_OF_STOCK".to_string(),
                error_message: Some("sku 7".to_string()),
                timestamp: now,
            }),
            saga(SagaEvent::SagaFailed {
                reason: "manual".to_string(),
                timestamp: now,
            }),
        ];

        let state = reducer().replay(SagaState::<Ledger>::default(), &log);

        assert_eq!(state.phase, SagaPhase::Failed);
        let last_error = state.last_error.expect("last error recorded");
        assert_eq!(last_error.error_code, "OUT_OF_STOCK");
        assert_eq!(last_error.step_order, 10);
    }

    #[test]
    fn terminal_state_ignores_later_events() {
        let now = Utc::now();
        let log = vec![
            started(Uuid::new_v4()),
            saga(SagaEvent::SagaCompleted { timestamp: now }),
            completed("reserve", 10),
            SagaLogEvent::Business("late".to_string()),
        ];

        let state = reducer().replay(SagaState::<Ledger>::default(), &log);

        assert_eq!(state.phase, SagaPhase::Completed);
        assert_eq!(state.last_completed_step_index, -1);
        assert!(state.data.lines.is_empty());
    }

    #[test]
    fn second_start_is_ignored() {
        let first = Uuid::new_v4();
        let log = vec![started(first), started(Uuid::new_v4())];

        let state = reducer().replay(SagaState::<Ledger>::default(), &log);

        assert_eq!(state.saga_id, Some(first));
    }
}
