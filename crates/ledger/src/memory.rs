//! In-memory line store
//!
//! Behaves like a [`FileStore`](crate::FileStore) without touching disk, and
//! can be switched into a failing mode to simulate a full disk or a crash
//! between two ledger writes.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::store::{BoxFuture, LineStore};

/// Line store held in memory. `None` content means "does not exist".
#[derive(Debug, Default)]
pub struct MemoryStore {
    name: String,
    lines: Mutex<Option<Vec<String>>>,
    fail_appends: AtomicBool,
    fail_overwrites: AtomicBool,
}

impl MemoryStore {
    /// A store that does not exist yet.
    pub fn missing(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// A store pre-populated with `lines`.
    pub fn with_lines<I, S>(name: impl Into<String>, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            lines: Mutex::new(Some(lines.into_iter().map(Into::into).collect())),
            ..Self::default()
        }
    }

    /// Current content (empty if the store does not exist).
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone().unwrap_or_default()
    }

    pub fn exists(&self) -> bool {
        self.lines.lock().is_some()
    }

    /// Make subsequent appends fail (or succeed again).
    pub fn fail_appends(&self, fail: bool) {
        self.fail_appends.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent overwrites fail (or succeed again).
    pub fn fail_overwrites(&self, fail: bool) {
        self.fail_overwrites.store(fail, Ordering::SeqCst);
    }
}

impl LineStore for MemoryStore {
    fn describe(&self) -> String {
        format!("memory:{}", self.name)
    }

    fn read_lines(&self) -> BoxFuture<'_, Result<Vec<String>>> {
        Box::pin(async move {
            self.lines
                .lock()
                .clone()
                .ok_or_else(|| Error::Missing(self.describe()))
        })
    }

    fn append_line<'a>(&'a self, line: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            if self.fail_appends.load(Ordering::SeqCst) {
                return Err(Error::Injected(format!("append to {}", self.describe())));
            }
            self.lines
                .lock()
                .get_or_insert_with(Vec::new)
                .push(line.to_string());
            Ok(())
        })
    }

    fn overwrite<'a>(&'a self, lines: &'a [String]) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            if self.fail_overwrites.load(Ordering::SeqCst) {
                return Err(Error::Injected(format!("overwrite of {}", self.describe())));
            }
            *self.lines.lock() = Some(lines.to_vec());
            Ok(())
        })
    }
}
