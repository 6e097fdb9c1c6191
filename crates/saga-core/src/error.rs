use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("saga type '{saga_type}' has no steps")]
    Empty { saga_type: String },

    #[error("step '{name}' has order 0; orders start at 1")]
    ZeroOrder { name: String },

    #[error("order {order} is used by both '{first}' and '{second}'")]
    DuplicateOrder {
        order: u32,
        first: String,
        second: String,
    },

    #[error("step name '{0}' is registered more than once")]
    DuplicateName(String),

    #[error("step '{step}' uses '|' or a line break in {value:?}")]
    ReservedCharacter { step: String, value: String },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse saga options")]
    Parse(#[from] toml::de::Error),

    #[error("max_retries must be at least 1 for the retry-then-compensate strategy")]
    ZeroRetries,
}
