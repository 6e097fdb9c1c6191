use saga_effects::EffectError;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum HostError {
    #[error("saga {0} already has history and cannot be started again")]
    AlreadyStarted(Uuid),

    #[error("saga {0} has no history")]
    NotFound(Uuid),

    #[error("saga {saga_id} has no event with sequence number {seq}")]
    UnknownEvent { saga_id: Uuid, seq: u64 },

    #[error(transparent)]
    Effect(#[from] EffectError),
}

pub type Result<T> = std::result::Result<T, HostError>;
