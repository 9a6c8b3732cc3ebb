use crate::error::CompileError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid TAC unit: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Compile(#[from] CompileError),
}
