#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("Store error: {0}")]
    Store(String),

    #[error("Invalid session key: {0:?}")]
    InvalidSessionKey(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, RelayError>;
