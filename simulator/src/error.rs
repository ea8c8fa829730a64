use thiserror::Error;
use tic_core::GeminiError;

#[derive(Error, Debug)]
pub enum SimulatorError {
    /// Non rate-limit failure from the model provider
    #[error("Upstream model error: {0}")]
    Upstream(#[from] GeminiError),

    /// Only returned where no session exists yet to keep the input
    #[error("The model provider is rate limiting requests; wait a few seconds and try again")]
    RateLimited,

    #[error("Snapshot carries no usable persona metadata: {0}")]
    MissingPersonaMetadata(String),

    #[error("Invalid snapshot: {0}")]
    InvalidSnapshot(String),

    #[error("Corpus unavailable: {0}")]
    CorpusUnavailable(String),

    #[error("Teacher turn is empty")]
    EmptyTurn,

    #[error("No unanswered teacher turn to retry")]
    NothingToRetry,

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type SimulatorResult<T> = Result<T, SimulatorError>;
