use thiserror::Error;

use crate::db::repositories::RepositoryError;

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("invalid target address: {0}")]
    InvalidTarget(String),
    #[error("invalid monitoring interval: {0} ms")]
    InvalidInterval(i64),
    #[error("failed to resolve speed test config: {0}")]
    ConfigResolution(String),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}
