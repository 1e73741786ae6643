//! Unified error taxonomy for the Q&A engine.
//!
//! Classification failures are recoverable and collapse to a default intent at
//! the classifier boundary; generation failures propagate to the caller.

use thiserror::Error;

/// Failure talking to the external text-generation oracle.
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("oracle request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("oracle returned {status}: {message}")]
    Api { status: u16, message: String },
}

/// Failure reading from the takeoff or snippet stores.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error")]
    Database(#[from] sqlx::Error),
}

/// Why a classification attempt could not produce a usable intent.
///
/// Never surfaces past the classifier: the public `classify` converts any of
/// these into the default `OTHER` classification.
#[derive(Debug, Error)]
pub enum ClassificationError {
    #[error("classifier oracle call failed: {0}")]
    Oracle(#[from] OracleError),

    #[error("classifier returned malformed JSON: {0}")]
    MalformedJson(#[from] serde_json::Error),
}

/// Pipeline-level errors surfaced to the caller of `answer_question`.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("answer generation failed: {0}")]
    Generation(#[from] OracleError),
}

pub type EngineResult<T> = Result<T, EngineError>;
