//! Credential rotation pool
//!
//! Serves bearer tokens to the gateway in strict round-robin order. The pool
//! is loaded once at startup from the token ledger, snapshotted to durable
//! storage, and then consulted on every inbound request.
//!
//! Lifecycle:
//! 1. Gateway reads the token ledger and calls `RotationPool::new`
//! 2. The token list is written verbatim to the snapshot (overwriting it)
//! 3. Each request calls `get_token()`: head token out, appended to the tail
//! 4. A snapshot failure leaves the pool empty; `get_token()` then returns
//!    `None` and the gateway answers "no credentials" instead of crashing

pub mod error;
pub mod pool;
pub mod snapshot;

pub use error::{Error, Result};
pub use pool::RotationPool;
pub use snapshot::{JsonSnapshot, SnapshotStore};
