use thiserror::Error;

/// Remote row store errors
#[derive(Error, Debug)]
pub enum SheetsError {
    #[error("Authentication Error: {0}")]
    Auth(String),

    #[error("HTTP Error: {status_code} - {message}")]
    Http { status_code: u16, message: String },

    #[error("Malformed response: {0}")]
    Malformed(String),

    #[error("Storage Error: {0}")]
    Storage(String),

    #[error("Configuration Error: {0}")]
    Config(String),

    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Jwt(#[from] jsonwebtoken::errors::Error),
}

/// Result type for row store operations
pub type SheetsResult<T> = Result<T, SheetsError>;
