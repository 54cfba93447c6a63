// src/error.rs

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TrainerError {
    /// Empty catalog, malformed outcome, or an out-of-range confidence.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type TrainerResult<T> = Result<T, TrainerError>;

impl TrainerError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        TrainerError::InvalidInput(msg.into())
    }
}
