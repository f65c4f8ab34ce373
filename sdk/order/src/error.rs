use tessera_threshold::{SealError, ThresholdError};
use thiserror::Error;

/// Order construction, fragmentation and encryption errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OrderError {
    #[error("malformed order: {0}")]
    MalformedOrder(String),

    #[error(transparent)]
    Threshold(#[from] ThresholdError),

    #[error(transparent)]
    Encryption(#[from] SealError),

    #[error("fragment reassembly failed: {0}")]
    Reassembly(String),
}

pub type Result<T> = std::result::Result<T, OrderError>;
