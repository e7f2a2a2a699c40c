//! Error types for pool operations

/// Errors from pool operations.
///
/// Only construction can fail, and the pool absorbs that failure itself;
/// `get_token` never returns an error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("snapshot error: {0}")]
    Snapshot(String),
}

/// Result alias for pool operations.
pub type Result<T> = std::result::Result<T, Error>;
