//! Shared types for the token harvester workspace
//!
//! Holds the record types every ledger stores (`Account`, `ProxyDescriptor`,
//! `Token`), the `Secret` wrapper that keeps credentials out of logs, and the
//! common configuration/I/O error type.

mod error;
mod record;
mod secret;

pub use error::{Error, Result};
pub use record::{Account, ProxyDescriptor, Token};
pub use secret::Secret;
