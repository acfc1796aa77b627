//! Daemon error types.

use std::time::Duration;

use engine::EngineError;
use thiserror::Error;

pub type PrepResult<T> = Result<T, PrepError>;

#[derive(Debug, Clone, Error)]
pub enum PrepError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("{service} failed: {message}")]
    Provider {
        service: &'static str,
        message: String,
    },

    #[error("Composition {task_id} failed: {message}")]
    Composition { task_id: String, message: String },

    #[error("Composition {task_id} did not finish within {waited:?}")]
    CompositionTimeout { task_id: String, waited: Duration },

    /// `task_id` is set when the render was already submitted.
    #[error("Cancelled by pipeline reset")]
    Cancelled { task_id: Option<String> },

    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl PrepError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn provider(service: &'static str, msg: impl Into<String>) -> Self {
        Self::Provider {
            service,
            message: msg.into(),
        }
    }

    /// Transient failures the pipeline retries automatically.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PrepError::Provider { .. })
    }

    /// Structurally bad input; retrying cannot help.
    pub fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            PrepError::InvalidInput(_) | PrepError::Engine(EngineError::InvalidInput(_))
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_provider_errors_are_retryable() {
        assert!(PrepError::provider("voice", "503").is_retryable());
        assert!(!PrepError::invalid_input("empty").is_retryable());
        assert!(!PrepError::Cancelled { task_id: None }.is_retryable());
        assert!(!PrepError::CompositionTimeout {
            task_id: "t".into(),
            waited: Duration::from_secs(120)
        }
        .is_retryable());
    }

    #[test]
    fn engine_input_errors_count_as_invalid_input() {
        let err: PrepError = EngineError::invalid_input("duration must be positive").into();
        assert!(err.is_invalid_input());
        assert!(!PrepError::provider("voice", "timeout").is_invalid_input());
    }

    #[test]
    fn messages_name_the_service() {
        let err = PrepError::provider("image_search", "HTTP 429");
        assert_eq!(err.to_string(), "image_search failed: HTTP 429");
    }
}
