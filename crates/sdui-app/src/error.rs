use thiserror::Error;

/// Failures while wiring the generator up, before any request exists.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Store error: {0}")]
    Store(#[from] surrealdb::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Legacy export error: {0}")]
    LegacyExport(#[from] serde_json::Error),
}
