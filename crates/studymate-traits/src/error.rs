//! Error type shared by every remote-capability seam.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceError {
    /// Required credentials or settings are absent.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The remote service answered with a non-success status.
    #[error("{service} returned HTTP {status}: {message}")]
    Http {
        service: String,
        status: u16,
        message: String,
    },

    /// The request never produced a usable response.
    #[error("{service} request failed: {message}")]
    Transport { service: String, message: String },

    #[error("Invalid response from {service}: {message}")]
    InvalidResponse { service: String, message: String },

    #[error("Session closed: {0}")]
    Closed(String),

    #[error("{0}")]
    Other(String),
}

impl ServiceError {
    pub fn transport(service: impl Into<String>, message: impl ToString) -> Self {
        Self::Transport {
            service: service.into(),
            message: message.to_string(),
        }
    }

    pub fn invalid_response(service: impl Into<String>, message: impl ToString) -> Self {
        Self::InvalidResponse {
            service: service.into(),
            message: message.to_string(),
        }
    }

    /// Whether a retry of the same request could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http { status, .. } => *status == 429 || *status >= 500,
            Self::Transport { .. } => true,
            _ => false,
        }
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(error: serde_json::Error) -> Self {
        Self::InvalidResponse {
            service: "json".to_string(),
            message: error.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ServiceError>;
