use crate::chain::models::{ChainId, QuestionId};
use thiserror::Error;

/// Top-level error type for the entire reconciler
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Chain error: {0}")]
    Chain(#[from] ChainError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Mirror and checkpoint store errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Record not found: {question_id} on chain {chain_id}")]
    NotFound {
        question_id: QuestionId,
        chain_id: ChainId,
    },

    #[error("Batch of {size} records exceeds the write limit of {limit}")]
    BatchTooLarge { size: usize, limit: usize },

    #[error("Invalid stored value for {field}: {value}")]
    Corrupt { field: &'static str, value: String },

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Chain API errors
#[derive(Error, Debug)]
pub enum ChainError {
    #[error("RPC error {code} calling {method}: {message}")]
    Rpc {
        method: String,
        code: i64,
        message: String,
    },

    #[error("Transport error calling {method}: {message}")]
    Transport { method: String, message: String },

    #[error("Malformed response from {method}: {message}")]
    Decode { method: String, message: String },

    #[error("Invalid question id: {0}")]
    InvalidQuestionId(String),
}

/// Event retrieval errors
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Incomplete {event} event at block {block:?}: missing {missing}")]
    IncompleteEvent {
        event: String,
        block: Option<u64>,
        missing: String,
    },

    #[error("Fetching {event} events exhausted {attempts} attempts: [{}]", join_causes(.causes))]
    RetryExhausted {
        event: String,
        attempts: usize,
        causes: Vec<FetchError>,
    },
}

fn join_causes(causes: &[FetchError]) -> String {
    causes
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl From<config::ConfigError> for AppError {
    fn from(error: config::ConfigError) -> Self {
        AppError::Config(error.to_string())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(error: validator::ValidationErrors) -> Self {
        AppError::Config(format!("Invalid configuration: {}", error))
    }
}

/// Result type alias for the reconciler
pub type AppResult<T> = Result<T, AppError>;
