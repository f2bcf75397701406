use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Unknown request status: {0}")]
    UnknownStatus(String),

    #[error("Message has neither text nor image")]
    EmptyContent,

    #[error("Invalid identifier: {0}")]
    InvalidId(#[from] uuid::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
