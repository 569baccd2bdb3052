use thiserror::Error;

/// Domain-level errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    #[error("Device is not connected: discovery prefix has not been assigned")]
    NotReady,

    #[error("Unknown state slot: {0}")]
    UnknownSlot(String),

    #[error("Invalid value {value:?} for state slot {slot}")]
    InvalidValue { slot: String, value: String },

    #[error("Invalid entity ID: {0}")]
    InvalidEntityId(String),

    #[error("State slot already registered: {0}")]
    DuplicateSlot(String),

    #[error("Discovery config key already in use: {0}")]
    DuplicateConfigKey(String),

    #[error("Device already bound under {0}; moving it to another discovery target is not supported")]
    TargetChanged(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Messaging error: {0}")]
    Messaging(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

pub type Result<T> = std::result::Result<T, DomainError>;
