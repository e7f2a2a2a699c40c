//! Error types for ledger operations

/// Errors from ledger storage and parsing.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("ledger not found: {0}")]
    Missing(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("malformed record in {ledger} at line {line}: {message}")]
    Parse {
        ledger: String,
        line: usize,
        message: String,
    },

    #[error("injected failure: {0}")]
    Injected(String),
}

/// Result alias for ledger operations.
pub type Result<T> = std::result::Result<T, Error>;
