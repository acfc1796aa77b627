use thiserror::Error;

use crate::pipeline::PipelineStep;

pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Cannot transition {step}: {reason}")]
    InvalidTransition { step: PipelineStep, reason: String },

    #[error("Selection incomplete, missing segments {missing:?}")]
    IncompleteSelection { missing: Vec<u32> },

    #[error("Unknown segment {0}")]
    UnknownSegment(u32),
}

impl EngineError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn invalid_transition(step: PipelineStep, reason: impl Into<String>) -> Self {
        Self::InvalidTransition {
            step,
            reason: reason.into(),
        }
    }
}
