use thiserror::Error;

use crate::store::StoreError;

/// Typed failures surfaced to the boundary layer.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Creation attempted with no remaining account quota. Nothing is
    /// committed when this is raised.
    #[error("river quota exceeded")]
    QuotaExceeded,

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("invalid access token")]
    InvalidToken,

    #[error("forbidden")]
    Forbidden,

    /// Lifetime extension refused because the river hit its drop quota.
    #[error("river is full")]
    RiverFull,

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl CoreError {
    pub fn validation(msg: impl Into<String>) -> Self {
        CoreError::Validation(msg.into())
    }
}
