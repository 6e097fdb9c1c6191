use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};

use saga_core::{SagaData, SagaEvent, SagaLogEvent, SagaReducer, SagaState};
use saga_effects::{SagaEffects, SagaServices};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::brook::{MemoryBrook, StoredEvent};
use crate::error::{HostError, Result};

/// Drives saga instances of one type through their logs.
///
/// Every call appends → reduces → routes → appends until the effects emit
/// nothing further. Calls for the same saga id are serialized; different
/// ids proceed in parallel. State is rebuilt from the log alone, so any
/// host sharing the brook can pick up a saga another host left unfinished.
pub struct SagaHost<D, E> {
    services: SagaServices<SagaState<D>, E>,
    effects: SagaEffects<SagaState<D>, E>,
    reducer: SagaReducer,
    brook: Arc<MemoryBrook<E>>,
    /// Single-writer locks of sagas with a call in flight or not yet settled.
    writers: Mutex<HashMap<Uuid, Arc<tokio::sync::Mutex<()>>>>,
    cancel: CancellationToken,
}

impl<D, E> SagaHost<D, E>
where
    D: SagaData<E> + Default + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    #[must_use]
    pub fn new(services: SagaServices<SagaState<D>, E>) -> Self {
        Self {
            effects: SagaEffects::new(services.clone()),
            reducer: SagaReducer::new(services.registry_handle()),
            services,
            brook: Arc::new(MemoryBrook::new()),
            writers: Mutex::new(HashMap::new()),
            cancel: CancellationToken::new(),
        }
    }

    /// Appends to `brook` instead of a private log.
    #[must_use]
    pub fn with_brook(mut self, brook: Arc<MemoryBrook<E>>) -> Self {
        self.brook = brook;
        self
    }

    #[must_use]
    pub fn brook(&self) -> &MemoryBrook<E> {
        &self.brook
    }

    /// Shared handle for other hosts; see [`SagaHost::with_brook`].
    #[must_use]
    pub fn brook_handle(&self) -> Arc<MemoryBrook<E>> {
        Arc::clone(&self.brook)
    }

    /// Token observed by every running effect.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Cancels in-flight effects. Events appended so far are kept.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Starts a new saga and runs it until it settles.
    ///
    /// Appends `SagaStarted` with the registry hash, then `seed` as business
    /// events that set up the saga's initial data, then `StepStarted` for
    /// the first step.
    ///
    /// # Errors
    ///
    /// `HostError::AlreadyStarted` if `saga_id` has history, or
    /// `HostError::Effect` if the host is shut down mid-run.
    pub async fn start(
        &self,
        saga_id: Uuid,
        correlation_id: Option<String>,
        seed: Vec<E>,
    ) -> Result<SagaState<D>> {
        let writer = self.writer(saga_id);
        let _guard = writer.lock().await;

        if self.brook.contains(saga_id) {
            warn!(%saga_id, "refusing to start saga with existing history");
            let settled = self.state(saga_id).is_ok_and(|state| state.phase.is_terminal());
            self.release(saga_id, &writer, settled);
            return Err(HostError::AlreadyStarted(saga_id));
        }

        let registry = self.services.registry();
        let now = self.services.clock().now();
        info!(
            %saga_id,
            saga_type = self.services.saga_type(),
            steps = registry.len(),
            "starting saga"
        );

        let mut opening = vec![SagaLogEvent::Saga(SagaEvent::SagaStarted {
            saga_id,
            step_hash: Some(registry.step_hash().to_string()),
            correlation_id,
            started_at: now,
        })];
        opening.extend(seed.into_iter().map(SagaLogEvent::Business));
        if let Some(first) = registry.first() {
            opening.push(SagaLogEvent::Saga(SagaEvent::StepStarted {
                step_name: first.name().to_string(),
                step_order: first.order(),
                timestamp: now,
            }));
        }

        let mut state = SagaState::default();
        self.cascade(saga_id, &mut state, opening.into_iter().map(|event| (event, None)))
            .await?;
        self.release(saga_id, &writer, state.phase.is_terminal());
        Ok(state)
    }

    /// Rebuilds the saga's state from its log.
    ///
    /// # Errors
    ///
    /// `HostError::NotFound` if the saga has no history.
    pub fn state(&self, saga_id: Uuid) -> Result<SagaState<D>> {
        let log = self.brook.read(saga_id);
        self.replay(saga_id, &log)
    }

    /// Delivers a historical event to its effect again and runs the cascade
    /// on whatever it emits.
    ///
    /// An event whose effect output is already on the log is not handled
    /// again, and terminal sagas are left alone. Otherwise the effect sees
    /// the saga's current state, so work already reflected there emits
    /// nothing. Redelivering the last event of an interrupted cascade
    /// resumes the saga.
    ///
    /// # Errors
    ///
    /// `HostError::NotFound` or `HostError::UnknownEvent` if there is no
    /// such event, or `HostError::Effect` if the host is shut down mid-run.
    pub async fn redeliver(&self, saga_id: Uuid, seq: u64) -> Result<Vec<StoredEvent<E>>> {
        let writer = self.writer(saga_id);
        let _guard = writer.lock().await;

        let log = self.brook.read(saga_id);
        let Some(target) = log.iter().find(|stored| stored.seq == seq) else {
            self.release(saga_id, &writer, log.is_empty());
            return Err(if log.is_empty() {
                HostError::NotFound(saga_id)
            } else {
                HostError::UnknownEvent { saga_id, seq }
            });
        };
        let mut state = self.replay(saga_id, &log)?;

        if state.phase.is_terminal() {
            debug!(
                %saga_id,
                seq,
                phase = %state.phase,
                "saga already settled; ignoring redelivery"
            );
            self.release(saga_id, &writer, true);
            return Ok(Vec::new());
        }
        if log.iter().any(|stored| stored.caused_by == Some(seq)) {
            debug!(%saga_id, seq, "effect output already on the log; ignoring redelivery");
            return Ok(Vec::new());
        }
        let Some(event) = target.event.as_saga() else {
            return Ok(Vec::new());
        };

        debug!(%saga_id, seq, event = event.event_type(), "redelivering event");
        let emitted = self.effects.handle(event, &state, &self.cancel).await?;
        let appended = self
            .cascade(
                saga_id,
                &mut state,
                emitted.into_iter().map(|event| (event, Some(seq))),
            )
            .await?;
        self.release(saga_id, &writer, state.phase.is_terminal());
        Ok(appended)
    }

    /// Appends each queued event, folds it into `state`, and queues what its
    /// effect emits, until the queue drains.
    async fn cascade(
        &self,
        saga_id: Uuid,
        state: &mut SagaState<D>,
        seed: impl IntoIterator<Item = (SagaLogEvent<E>, Option<u64>)>,
    ) -> Result<Vec<StoredEvent<E>>> {
        let mut queue: VecDeque<_> = seed.into_iter().collect();
        let mut appended = Vec::new();

        while let Some((event, caused_by)) = queue.pop_front() {
            let stored = self
                .brook
                .append(saga_id, caused_by, event, self.services.clock().now());
            self.reducer.reduce(state, &stored.event);

            let trigger = stored
                .event
                .as_saga()
                .filter(|event| SagaEffects::<SagaState<D>, E>::triggers(event));
            if let Some(trigger) = trigger {
                let emitted = match self.effects.handle(trigger, state, &self.cancel).await {
                    Ok(emitted) => emitted,
                    Err(err) => {
                        warn!(%saga_id, seq = stored.seq, error = %err, "cascade interrupted");
                        return Err(err.into());
                    }
                };
                queue.extend(emitted.into_iter().map(|child| (child, Some(stored.seq))));
            }
            appended.push(stored);
        }

        debug!(%saga_id, appended = appended.len(), phase = %state.phase, "saga settled");
        Ok(appended)
    }

    fn replay(&self, saga_id: Uuid, log: &[StoredEvent<E>]) -> Result<SagaState<D>> {
        if log.is_empty() {
            return Err(HostError::NotFound(saga_id));
        }
        Ok(self
            .reducer
            .replay(SagaState::default(), log.iter().map(|stored| &stored.event)))
    }

    fn writer(&self, saga_id: Uuid) -> Arc<tokio::sync::Mutex<()>> {
        let mut writers = self.writers.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(writers.entry(saga_id).or_default())
    }

    /// Forgets the saga's lock once nothing more will be appended for it.
    ///
    /// Kept while another call holds a handle, so callers already queued on
    /// the lock still serialize with this one.
    fn release(&self, saga_id: Uuid, writer: &Arc<tokio::sync::Mutex<()>>, settled: bool) {
        if !settled {
            return;
        }
        let mut writers = self.writers.lock().unwrap_or_else(PoisonError::into_inner);
        let idle = writers
            .get(&saga_id)
            .is_some_and(|held| Arc::ptr_eq(held, writer) && Arc::strong_count(writer) == 2);
        if idle {
            writers.remove(&saga_id);
        }
    }

    #[cfg(test)]
    fn tracked_writers(&self) -> usize {
        self.writers.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}
