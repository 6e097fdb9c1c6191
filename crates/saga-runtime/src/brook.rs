use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use saga_core::SagaLogEvent;
use uuid::Uuid;

/// One entry of a saga's log as it was appended.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredEvent<E> {
    /// Position in the saga's log, starting at 1.
    pub seq: u64,
    pub saga_id: Uuid,
    pub recorded_at: DateTime<Utc>,
    /// Sequence number of the event whose effect emitted this one.
    pub caused_by: Option<u64>,
    pub event: SagaLogEvent<E>,
}

/// In-memory append-only event log, one stream per saga id. Thread-safe.
#[derive(Debug)]
pub struct MemoryBrook<E> {
    streams: Mutex<HashMap<Uuid, Vec<StoredEvent<E>>>>,
}

impl<E> Default for MemoryBrook<E> {
    fn default() -> Self {
        Self {
            streams: Mutex::new(HashMap::new()),
        }
    }
}

impl<E: Clone> MemoryBrook<E> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `event` to the saga's stream and returns the stored copy.
    pub fn append(
        &self,
        saga_id: Uuid,
        caused_by: Option<u64>,
        event: SagaLogEvent<E>,
        recorded_at: DateTime<Utc>,
    ) -> StoredEvent<E> {
        let mut streams = self.streams.lock().unwrap_or_else(PoisonError::into_inner);
        let stream = streams.entry(saga_id).or_default();
        let stored = StoredEvent {
            seq: stream.len() as u64 + 1,
            saga_id,
            recorded_at,
            caused_by,
            event,
        };
        stream.push(stored.clone());
        stored
    }

    /// The saga's stream in append order; empty for an unknown id.
    #[must_use]
    pub fn read(&self, saga_id: Uuid) -> Vec<StoredEvent<E>> {
        self.streams
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&saga_id)
            .cloned()
            .unwrap_or_default()
    }

    #[must_use]
    pub fn contains(&self, saga_id: Uuid) -> bool {
        self.streams
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&saga_id)
            .is_some_and(|stream| !stream.is_empty())
    }

    /// Ids of every saga with at least one event.
    #[must_use]
    pub fn saga_ids(&self) -> Vec<Uuid> {
        self.streams
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect()
    }
}
