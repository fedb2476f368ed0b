use thiserror::Error;

#[derive(Error, Debug)]
pub enum DuiError {
    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Query analysis error: {0}")]
    Analysis(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Backend rate limited: {0}")]
    RateLimited(String),

    #[error("Backend timed out after {0}s")]
    Timeout(u64),

    #[error("SQL generation error: {0}")]
    Generation(String),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<rusqlite::Error> for DuiError {
    fn from(err: rusqlite::Error) -> Self {
        DuiError::Execution(err.to_string())
    }
}

impl From<reqwest::Error> for DuiError {
    fn from(err: reqwest::Error) -> Self {
        DuiError::Backend(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DuiError>;
