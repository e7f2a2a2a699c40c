//! Typed ledger with an in-memory mirror

use std::sync::Arc;

use common::{Account, Token};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::store::LineStore;

/// A record with a single-line text form.
pub trait Record: Clone + Send + Sync {
    fn parse(line: &str) -> common::Result<Self>;
    fn to_line(&self) -> String;
}

impl Record for Account {
    fn parse(line: &str) -> common::Result<Self> {
        Account::parse_line(line)
    }

    fn to_line(&self) -> String {
        Account::to_line(self)
    }
}

impl Record for Token {
    fn parse(line: &str) -> common::Result<Self> {
        Token::new(line).ok_or_else(|| common::Error::Parse("token is empty".into()))
    }

    fn to_line(&self) -> String {
        self.expose().to_string()
    }
}

/// Ordered collection of records mirrored from a [`LineStore`].
///
/// The mirror is updated only after the store accepted the write, so
/// `entries()` never shows state that isn't durable.
pub struct Ledger<T> {
    store: Arc<dyn LineStore>,
    entries: Vec<T>,
}

impl<T: Record> Ledger<T> {
    /// Load an existing ledger. A missing store is an error.
    ///
    /// Blank lines are ignored; any other unparseable line fails the load.
    pub async fn load(store: Arc<dyn LineStore>) -> Result<Self> {
        let lines = store.read_lines().await?;
        let entries = parse_lines(&store.describe(), &lines)?;
        info!(ledger = %store.describe(), records = entries.len(), "loaded ledger");
        Ok(Self { store, entries })
    }

    /// Like [`load`](Self::load), but a missing store is an empty ledger.
    pub async fn open(store: Arc<dyn LineStore>) -> Result<Self> {
        match Self::load(store.clone()).await {
            Err(Error::Missing(_)) => {
                info!(ledger = %store.describe(), "ledger not found, starting empty");
                Ok(Self {
                    store,
                    entries: Vec::new(),
                })
            }
            other => other,
        }
    }

    pub fn entries(&self) -> &[T] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn describe(&self) -> String {
        self.store.describe()
    }

    /// Durably append one record.
    pub async fn append(&mut self, record: &T) -> Result<()> {
        self.store.append_line(&record.to_line()).await?;
        self.entries.push(record.clone());
        debug!(ledger = %self.store.describe(), records = self.entries.len(), "appended record");
        Ok(())
    }

    /// Replace the whole ledger with `records`.
    pub async fn overwrite_all(&mut self, records: Vec<T>) -> Result<()> {
        let lines: Vec<String> = records.iter().map(Record::to_line).collect();
        self.store.overwrite(&lines).await?;
        self.entries = records;
        debug!(ledger = %self.store.describe(), records = self.entries.len(), "rewrote ledger");
        Ok(())
    }
}

fn parse_lines<T: Record>(ledger: &str, lines: &[String]) -> Result<Vec<T>> {
    lines
        .iter()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| {
            T::parse(line).map_err(|e| Error::Parse {
                ledger: ledger.to_string(),
                line: idx + 1,
                message: e.to_string(),
            })
        })
        .collect()
}
