//! Shared fixtures for the effect tests: recording steps and compensations,
//! a three-step registry with sparse orders, and helpers to build state.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use saga_core::{
    CompensationResult, SagaEvent, SagaLogEvent, SagaOptions, SagaPhase, SagaState, StepInfo,
    StepRegistry, StepResult,
};
use saga_effects::{
    Clock, Compensation, ManualClock, SagaServices, SagaStep, StepCatalog, StepContext,
};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

pub type TestState = SagaState<()>;
pub type TestEvent = String;

/// Ordered record of every step and compensation invocation.
#[derive(Debug, Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn record(&self, entry: String) {
        self.0.lock().expect("journal lock").push(entry);
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().expect("journal lock").clone()
    }
}

#[derive(Debug, Clone)]
pub enum StepBehavior {
    Succeed(Vec<TestEvent>),
    Fail {
        code: &'static str,
        message: Option<&'static str>,
    },
    Error(&'static str),
    Panic(&'static str),
    Hang,
}

pub struct RecordingStep {
    pub label: &'static str,
    pub journal: Journal,
    pub behavior: StepBehavior,
    pub last_context: Arc<Mutex<Option<StepContext>>>,
}

impl RecordingStep {
    pub fn new(label: &'static str, journal: &Journal, behavior: StepBehavior) -> Self {
        Self {
            label,
            journal: journal.clone(),
            behavior,
            last_context: Arc::new(Mutex::new(None)),
        }
    }
}

#[async_trait]
impl<S: Sync> SagaStep<S, TestEvent> for RecordingStep {
    async fn execute(
        &self,
        _state: &S,
        context: &StepContext,
        _cancel: &CancellationToken,
    ) -> anyhow::Result<StepResult<TestEvent>> {
        self.journal.record(format!("execute {}", self.label));
        *self.last_context.lock().expect("context lock") = Some(context.clone());
        match &self.behavior {
            StepBehavior::Succeed(events) => Ok(StepResult::success_with(events.clone())),
            StepBehavior::Fail { code, message } => Ok(StepResult::Failure {
                error_code: (*code).to_string(),
                error_message: message.map(str::to_string),
            }),
            StepBehavior::Error(message) => Err(anyhow::anyhow!(*message)),
            StepBehavior::Panic(message) => panic!("{message}"),
            StepBehavior::Hang => std::future::pending().await,
        }
    }
}

#[derive(Debug, Clone)]
pub enum CompensationBehavior {
    Succeed,
    Skip,
    Fail(&'static str),
    Error(&'static str),
    Panic(&'static str),
    Hang,
}

pub struct RecordingCompensation {
    pub label: &'static str,
    pub journal: Journal,
    pub behavior: CompensationBehavior,
}

impl RecordingCompensation {
    pub fn new(label: &'static str, journal: &Journal, behavior: CompensationBehavior) -> Self {
        Self {
            label,
            journal: journal.clone(),
            behavior,
        }
    }
}

#[async_trait]
impl<S: Sync> Compensation<S> for RecordingCompensation {
    async fn compensate(
        &self,
        _state: &S,
        _cancel: &CancellationToken,
    ) -> anyhow::Result<CompensationResult> {
        self.journal.record(format!("compensate {}", self.label));
        match &self.behavior {
            CompensationBehavior::Succeed => Ok(CompensationResult::Success),
            CompensationBehavior::Skip => Ok(CompensationResult::Skipped),
            CompensationBehavior::Fail(code) => Ok(CompensationResult::Failure {
                error_code: (*code).to_string(),
                error_message: None,
            }),
            CompensationBehavior::Error(message) => Err(anyhow::anyhow!(*message)),
            CompensationBehavior::Panic(message) => panic!("{message}"),
            CompensationBehavior::Hang => std::future::pending().await,
        }
    }
}

/// Steps at orders 10, 20, 30, each with a compensation.
pub fn sparse_registry() -> Arc<StepRegistry> {
    Arc::new(
        StepRegistry::builder("orders")
            .step(StepInfo::new(10, "step1", "orders.step1").with_compensation("orders.undo1"))
            .step(StepInfo::new(20, "step2", "orders.step2").with_compensation("orders.undo2"))
            .step(StepInfo::new(30, "step3", "orders.step3").with_compensation("orders.undo3"))
            .build()
            .expect("valid registry"),
    )
}

/// Catalog resolving every key of [`sparse_registry`] to succeeding plug-ins.
pub fn succeeding_catalog(journal: &Journal) -> StepCatalog<TestState, TestEvent> {
    ["step1", "step2", "step3"]
        .into_iter()
        .zip(1..)
        .fold(StepCatalog::new(), |catalog, (label, n)| {
            catalog
                .with_step(
                    format!("orders.step{n}"),
                    RecordingStep::new(label, journal, StepBehavior::Succeed(vec![])),
                )
                .with_compensation(
                    format!("orders.undo{n}"),
                    RecordingCompensation::new(label, journal, CompensationBehavior::Succeed),
                )
        })
}

pub fn services(
    registry: Arc<StepRegistry>,
    options: SagaOptions,
    catalog: StepCatalog<TestState, TestEvent>,
    clock: Arc<ManualClock>,
) -> SagaServices<TestState, TestEvent> {
    SagaServices::new(registry, options, Arc::new(catalog)).with_clock(clock as Arc<dyn Clock>)
}

/// A running saga whose steps up to `last_completed_step_index` completed.
pub fn running_state(registry: &StepRegistry, last_completed_step_index: i32) -> TestState {
    let mut state = TestState::default();
    state.saga_id = Some(Uuid::new_v4());
    state.phase = SagaPhase::Running;
    state.step_hash = Some(registry.step_hash().to_string());
    state.correlation_id = Some("corr-42".to_string());
    state.started_at = Some(chrono::Utc::now());
    state.last_completed_step_index = last_completed_step_index;
    state
}

pub fn lifecycle(events: &[SagaLogEvent<TestEvent>]) -> Vec<&SagaEvent> {
    events.iter().filter_map(SagaLogEvent::as_saga).collect()
}

/// Event type names, with business events shown as `business:<payload>`.
pub fn kinds(events: &[SagaLogEvent<TestEvent>]) -> Vec<String> {
    events
        .iter()
        .map(|event| match event {
            SagaLogEvent::Saga(saga) => saga.event_type().to_string(),
            SagaLogEvent::Business(payload) => format!("business:{payload}"),
        })
        .collect()
}

pub async fn wait_for_waiters(clock: &ManualClock) {
    while clock.waiters() == 0 {
        tokio::task::yield_now().await;
    }
}

pub const FIVE_SECONDS: Duration = Duration::from_millis(5000);
