use std::sync::Arc;

use saga_core::{SagaOptions, StepRegistry};

use crate::clock::{Clock, SystemClock};
use crate::resolver::StepResolver;

/// Everything the effects of one saga type share: its registry, options,
/// resolver, and clock.
pub struct SagaServices<S, E> {
    registry: Arc<StepRegistry>,
    options: SagaOptions,
    resolver: Arc<dyn StepResolver<S, E>>,
    clock: Arc<dyn Clock>,
}

impl<S, E> Clone for SagaServices<S, E> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            options: self.options.clone(),
            resolver: Arc::clone(&self.resolver),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<S, E> SagaServices<S, E>
where
    S: Sync + 'static,
    E: Send + 'static,
{
    /// Uses the system clock; see [`SagaServices::with_clock`].
    #[must_use]
    pub fn new(
        registry: Arc<StepRegistry>,
        options: SagaOptions,
        resolver: Arc<dyn StepResolver<S, E>>,
    ) -> Self {
        Self {
            registry,
            options,
            resolver,
            clock: Arc::new(SystemClock),
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn registry(&self) -> &StepRegistry {
        &self.registry
    }

    #[must_use]
    pub fn registry_handle(&self) -> Arc<StepRegistry> {
        Arc::clone(&self.registry)
    }

    #[must_use]
    pub fn options(&self) -> &SagaOptions {
        &self.options
    }

    #[must_use]
    pub fn resolver(&self) -> &dyn StepResolver<S, E> {
        self.resolver.as_ref()
    }

    #[must_use]
    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    /// Saga type name: the configured one, else the registry's.
    #[must_use]
    pub fn saga_type(&self) -> &str {
        match self.options.saga_type() {
            "" => self.registry.saga_type(),
            configured => configured,
        }
    }
}
