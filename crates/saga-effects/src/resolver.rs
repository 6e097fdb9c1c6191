use std::sync::Arc;

use indexmap::IndexMap;
use saga_core::{StepKey, StepRegistry};

use crate::step::{Compensation, SagaStep};

type StepFactory<S, E> = Arc<dyn Fn() -> Arc<dyn SagaStep<S, E>> + Send + Sync>;
type CompensationFactory<S> = Arc<dyn Fn() -> Arc<dyn Compensation<S>> + Send + Sync>;

/// Constructs step and compensation instances from registry keys.
///
/// Called concurrently by every instance of a saga type.
pub trait StepResolver<S, E>: Send + Sync {
    fn resolve_step(&self, key: &StepKey) -> Option<Arc<dyn SagaStep<S, E>>>;

    fn resolve_compensation(&self, key: &StepKey) -> Option<Arc<dyn Compensation<S>>>;
}

/// Resolver backed by explicit registrations.
///
/// Factories receive their dependencies by capture, so each resolution can
/// build a fresh instance or hand out a shared one.
pub struct StepCatalog<S, E> {
    steps: IndexMap<StepKey, StepFactory<S, E>>,
    compensations: IndexMap<StepKey, CompensationFactory<S>>,
}

impl<S, E> Default for StepCatalog<S, E> {
    fn default() -> Self {
        Self {
            steps: IndexMap::new(),
            compensations: IndexMap::new(),
        }
    }
}

impl<S, E> StepCatalog<S, E>
where
    S: Sync + 'static,
    E: Send + 'static,
{
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a shared step instance.
    #[must_use]
    pub fn with_step(self, key: impl Into<StepKey>, step: impl SagaStep<S, E> + 'static) -> Self {
        let step: Arc<dyn SagaStep<S, E>> = Arc::new(step);
        self.with_step_factory(key, move || Arc::clone(&step))
    }

    #[must_use]
    pub fn with_step_factory<F>(mut self, key: impl Into<StepKey>, factory: F) -> Self
    where
        F: Fn() -> Arc<dyn SagaStep<S, E>> + Send + Sync + 'static,
    {
        self.steps.insert(key.into(), Arc::new(factory));
        self
    }

    /// Registers a shared compensation instance.
    #[must_use]
    pub fn with_compensation(
        self,
        key: impl Into<StepKey>,
        compensation: impl Compensation<S> + 'static,
    ) -> Self {
        let compensation: Arc<dyn Compensation<S>> = Arc::new(compensation);
        self.with_compensation_factory(key, move || Arc::clone(&compensation))
    }

    #[must_use]
    pub fn with_compensation_factory<F>(mut self, key: impl Into<StepKey>, factory: F) -> Self
    where
        F: Fn() -> Arc<dyn Compensation<S>> + Send + Sync + 'static,
    {
        self.compensations.insert(key.into(), Arc::new(factory));
        self
    }

    /// Registry keys this catalog cannot resolve, in registry order.
    #[must_use]
    pub fn missing_keys(&self, registry: &StepRegistry) -> Vec<StepKey> {
        registry
            .steps()
            .iter()
            .flat_map(|step| {
                let implementation = (!self.steps.contains_key(step.implementation()))
                    .then(|| step.implementation().clone());
                let compensation = step
                    .compensation()
                    .filter(|key| !self.compensations.contains_key(*key))
                    .cloned();
                implementation.into_iter().chain(compensation)
            })
            .collect()
    }
}

impl<S, E> StepResolver<S, E> for StepCatalog<S, E>
where
    S: Sync + 'static,
    E: Send + 'static,
{
    fn resolve_step(&self, key: &StepKey) -> Option<Arc<dyn SagaStep<S, E>>> {
        self.steps.get(key).map(|factory| factory())
    }

    fn resolve_compensation(&self, key: &StepKey) -> Option<Arc<dyn Compensation<S>>> {
        self.compensations.get(key).map(|factory| factory())
    }
}
