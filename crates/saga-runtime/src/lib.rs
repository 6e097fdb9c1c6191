//! Reference host for sagas: an in-memory log per saga instance, replay
//! through the reducer, and the cascade that feeds each appended event to
//! its effect until nothing more is emitted.

mod brook;
mod error;
mod host;

pub use brook::{MemoryBrook, StoredEvent};
pub use error::{HostError, Result};
pub use host::SagaHost;
