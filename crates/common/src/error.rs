//! Configuration and record errors shared by every crate

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Invalid or missing configuration value
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid TOML: {0}")]
    Toml(#[from] toml::de::Error),

    /// Ledger line that doesn't match its record format
    #[error("malformed record: {0}")]
    Parse(String),
}

pub type Result<T> = std::result::Result<T, Error>;
