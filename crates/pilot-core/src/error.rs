use thiserror::Error;

#[derive(Error, Debug)]
pub enum PilotError {
    #[error("storage error: {0}")]
    Store(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("confirmation expired or unknown: {0}")]
    ConfirmationNotFound(String),

    #[error("runner error: {0}")]
    Runner(String),

    #[error("messenger error: {0}")]
    Messenger(String),

    #[error("classifier error: {0}")]
    Classifier(String),

    #[error("usage threshold exceeded: {0}")]
    UsageExceeded(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PilotError>;
