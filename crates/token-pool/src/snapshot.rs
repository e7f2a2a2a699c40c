//! Durable snapshot of the pool's token list

use std::path::{Path, PathBuf};

use common::Token;
use ledger::BoxFuture;
use tracing::debug;

use crate::error::{Error, Result};

/// Durable storage for the pool's initial token list.
pub trait SnapshotStore: Send + Sync {
    fn describe(&self) -> String;

    /// Replace any previous snapshot with `tokens`, in order.
    fn save<'a>(&'a self, tokens: &'a [Token]) -> BoxFuture<'a, Result<()>>;
}

/// Snapshot stored as a JSON array of strings.
#[derive(Debug, Clone)]
pub struct JsonSnapshot {
    path: PathBuf,
}

impl JsonSnapshot {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SnapshotStore for JsonSnapshot {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn save<'a>(&'a self, tokens: &'a [Token]) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let raw: Vec<&str> = tokens.iter().map(Token::expose).collect();
            let mut json = serde_json::to_string(&raw)
                .map_err(|e| Error::Snapshot(format!("serializing tokens: {e}")))?;
            json.push('\n');

            ledger::write_atomic(&self.path, json.as_bytes())
                .await
                .map_err(|e| Error::Snapshot(e.to_string()))?;
            debug!(path = %self.path.display(), tokens = tokens.len(), "wrote pool snapshot");
            Ok(())
        })
    }
}
