use thiserror::Error;

/// The only failure an effect reports to its caller.
///
/// Step and compensation faults are recorded as events instead.
#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum EffectError {
    #[error("operation cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, EffectError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancelled_error_message() {
        assert!(EffectError::Cancelled.to_string().contains("cancelled"));
    }
}
