//! Error codes recorded on `StepFailed` and `StepCompensationFailed` events.
//!
//! Business steps may return any code of their own; the codes below are the
//! ones produced by the effects themselves.

/// The registry changed since the saga started; the step was not invoked.
pub const STEP_HASH_MISMATCH: &str = "STEP_HASH_MISMATCH";

/// No registered step has the requested order.
pub const STEP_NOT_FOUND: &str = "STEP_NOT_FOUND";

/// The step faulted (returned an error, panicked, or could not be resolved).
pub const STEP_EXCEPTION: &str = "STEP_EXCEPTION";

/// The step did not finish within its effective timeout.
pub const STEP_TIMEOUT: &str = "STEP_TIMEOUT";

/// The compensation faulted (returned an error, panicked, or could not be resolved).
pub const COMPENSATION_EXCEPTION: &str = "COMPENSATION_EXCEPTION";
