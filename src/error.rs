use anyhow::Result;
use reqwest::StatusCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Identity mapping error: {0}")]
    Mapping(String),
    #[error("GitHub API error ({status}): {message}")]
    GitHubApi { status: u16, message: String },
    #[error("Unexpected GitHub response: {0}")]
    InvalidResponse(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_yaml::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl AppError {
    /// Whether retrying the same request may succeed: rate limiting, 5xx
    /// and transport failures. Everything else is returned to the caller
    /// on the first attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            AppError::GitHubApi { status, message } => {
                let status = StatusCode::from_u16(*status).unwrap_or(StatusCode::OK);
                status == StatusCode::TOO_MANY_REQUESTS
                    || status.is_server_error()
                    || (status == StatusCode::FORBIDDEN
                        && message.to_ascii_lowercase().contains("rate limit"))
            }
            AppError::Http(e) => e.is_connect() || e.is_timeout() || e.is_request(),
            _ => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, AppError::GitHubApi { status: 404, .. })
    }
}

pub type AppResult<T> = Result<T, AppError>;
