use std::fmt::Display;

use serde_json::Value;

/// Error payload returned by the API for a non-2xx response
#[derive(Debug, Clone, PartialEq)]
pub struct ApiError {
    pub status: u16,
    pub message: String,
    /// Parsed response body, when it was valid JSON
    pub raw: Option<Value>,
}

impl Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.status, self.message)
    }
}

/// Client-level errors
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum AppError {
    /// Rejected locally, no request was sent
    #[error("Validation error: {0}")]
    Validation(String),

    /// No response received (connect failure, timeout, reset)
    #[error("Network error: {0}")]
    Network(String),

    #[error("Server error: {0}")]
    Server(ApiError),

    /// 4xx other than 401
    #[error("Request rejected: {0}")]
    Client(ApiError),

    /// 401; the session has already been torn down when this is returned
    #[error("Not authenticated: {0}")]
    Auth(ApiError),

    #[error("Unexpected response: {0}")]
    Decode(String),

    /// A mutation for the same resource is still pending
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl AppError {
    /// Transient failures that the retry controller absorbs
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::Network(_) | AppError::Server(_))
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, AppError::Auth(_))
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            AppError::Server(e) | AppError::Client(e) | AppError::Auth(e) => Some(e.status),
            _ => None,
        }
    }

    /// Text suitable for an inline alert or error banner
    pub fn user_message(&self) -> String {
        match self {
            AppError::Validation(msg) | AppError::Conflict(msg) => msg.clone(),
            AppError::Network(_) => {
                "Unable to reach the server. Please check your connection and try again."
                    .to_string()
            }
            AppError::Server(_) => "Server error. Please try again later.".to_string(),
            AppError::Client(e) if e.status == 404 => {
                "The requested item was not found. It may have been removed.".to_string()
            }
            AppError::Client(e) if e.status == 403 => {
                "Access denied. You may need to log in.".to_string()
            }
            AppError::Client(e) => e.message.clone(),
            AppError::Auth(_) => "Your session has expired. Please log in again.".to_string(),
            AppError::Decode(_) => "Invalid data format from server.".to_string(),
            AppError::Config(msg) => msg.clone(),
        }
    }
}

impl From<reqwest::Error> for AppError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            AppError::Decode(e.to_string())
        } else if e.is_builder() {
            AppError::Config(e.to_string())
        } else {
            // timeouts, connect and body errors are all "no usable response"
            AppError::Network(e.to_string())
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        AppError::Decode(e.to_string())
    }
}

pub type AppResult<T> = Result<T, AppError>;
