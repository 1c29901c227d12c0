//! Error types for the AI module

use studymate_traits::ServiceError;
use thiserror::Error;

/// AI module error types
#[derive(Error, Debug)]
pub enum AiError {
    #[error("LLM error: {0}")]
    Llm(String),

    #[error("{provider} API error {status}: {message}")]
    LlmHttp {
        provider: String,
        status: u16,
        message: String,
        retry_after_secs: Option<u64>,
    },

    #[error("Invalid response format: {0}")]
    InvalidFormat(String),

    #[error("Realtime session error: {0}")]
    Realtime(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AiError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::LlmHttp { status, .. } => *status == 429 || *status >= 500,
            Self::Http(err) => err.is_timeout() || err.is_connect(),
            Self::Llm(message) => {
                let lower = message.to_lowercase();
                lower.contains("rate limit") || lower.contains("timeout")
            }
            _ => false,
        }
    }
}

impl From<AiError> for ServiceError {
    fn from(error: AiError) -> Self {
        match error {
            AiError::LlmHttp {
                provider,
                status,
                message,
                ..
            } => ServiceError::Http {
                service: provider,
                status,
                message,
            },
            AiError::Http(err) => ServiceError::transport("gemini", err),
            AiError::WebSocket(err) => ServiceError::transport("gemini-live", err),
            AiError::InvalidFormat(message) => ServiceError::invalid_response("gemini", message),
            AiError::Json(err) => ServiceError::invalid_response("gemini", err),
            AiError::Realtime(message) => ServiceError::Closed(message),
            AiError::Llm(message) => ServiceError::Other(message),
        }
    }
}

/// Result type alias for AI operations
pub type Result<T> = std::result::Result<T, AiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_errors_keep_status_when_converted() {
        let error = AiError::LlmHttp {
            provider: "gemini".to_string(),
            status: 503,
            message: "overloaded".to_string(),
            retry_after_secs: None,
        };
        assert!(error.is_retryable());
        match ServiceError::from(error) {
            ServiceError::Http { status, .. } => assert_eq!(status, 503),
            other => panic!("unexpected conversion: {other:?}"),
        }
    }

    #[test]
    fn llm_string_fallback() {
        assert!(AiError::Llm("rate limit exceeded".to_string()).is_retryable());
        assert!(!AiError::Llm("bad request".to_string()).is_retryable());
    }
}
