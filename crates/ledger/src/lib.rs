//! Durable line-oriented ledgers
//!
//! Every collection the harvester persists (pending accounts, authenticated
//! accounts, issued tokens, proxies) is a flat text file with one record per
//! line. This crate separates the storage backend from the typed view:
//!
//! - [`LineStore`] is the durable backend: read everything, append one line,
//!   or replace the whole content. [`FileStore`] is the real one,
//!   [`MemoryStore`] backs tests and can be told to fail.
//! - [`Ledger`] is a typed repository over a store with an in-memory mirror
//!   that only changes after the durable write succeeded.

pub mod error;
pub mod ledger;
pub mod memory;
pub mod store;

pub use error::{Error, Result};
pub use ledger::{Ledger, Record};
pub use memory::MemoryStore;
pub use store::{BoxFuture, FileStore, LineStore, write_atomic};
