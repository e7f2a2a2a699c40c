//! Error taxonomy for a harvesting run

use authenticator::AuthError;

/// Errors from the pipeline.
///
/// - `FatalLoad`: a ledger could not be read at startup; nothing was touched.
/// - `Authentication`: the login flow failed; the batch halts.
/// - `Persistence`: a ledger write failed after a successful login; logged,
///   the account stays pending, the batch continues.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to load ledger: {0}")]
    FatalLoad(#[source] ledger::Error),

    #[error(transparent)]
    Authentication(#[from] AuthError),

    #[error("failed to write {ledger} ledger for {identifier}: {source}")]
    Persistence {
        ledger: &'static str,
        identifier: String,
        #[source]
        source: ledger::Error,
    },
}

/// Result alias for pipeline operations.
pub type Result<T> = std::result::Result<T, Error>;
