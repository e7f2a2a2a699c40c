//! Account authentication pipeline
//!
//! Drains the pending-accounts ledger one account at a time: pick a proxy,
//! run the external login, and on success move the account through the
//! commit sequence (token ledger → authenticated ledger → pending rewrite).
//! The pending rewrite is the commit point, so a crash in between can only
//! cause an account to be processed twice, never a token to be lost.
//!
//! The first authentication failure halts the batch. Failures in this domain
//! are almost always systemic (banned proxy range, upstream outage), and the
//! operator resumes from the rewritten pending ledger once fixed.

pub mod egress;
pub mod error;
pub mod pipeline;
pub mod proxy;
pub mod queue;
pub mod state;

pub use egress::{CommandEgressCycler, EgressCycler};
pub use error::{Error, Result};
pub use pipeline::{BatchReport, Ledgers, Pipeline, PipelineConfig};
pub use proxy::ProxyAssigner;
pub use queue::AccountQueue;
pub use state::{BatchEvent, BatchState, transition};
