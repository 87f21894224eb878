use thiserror::Error;
use crate::engine::EngineError;

/// Reasons a submission is rejected before any work is dispatched.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("prompt must not be empty")]
    EmptyPrompt,
    #[error("step count {value} is outside {min}..={max}")]
    StepsOutOfRange { value: u32, min: u32, max: u32 },
    #[error("guidance scale {value} is outside {min}..={max}")]
    GuidanceOutOfRange { value: f32, min: f32, max: f32 },
    #[error("image count {value} is outside {min}..={max}")]
    ImageCountOutOfRange { value: u32, min: u32, max: u32 },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("invalid request: {0}")]
    Validation(#[from] ValidationError),
    #[error("inference failed: {0}")]
    Inference(String),
    #[error("persistence failed: {0}")]
    Persistence(String),
}

impl Error {
    pub fn persistence(context: &str, err: impl std::fmt::Display) -> Self {
        Self::Persistence(format!("{context}: {err}"))
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

impl From<EngineError> for Error {
    fn from(err: EngineError) -> Self {
        Self::Inference(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
