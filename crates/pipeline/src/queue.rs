//! Durable queue of pending accounts
//!
//! Backed by the pending-accounts ledger. Removal is a full rewrite rather
//! than an append, because the queue must never again contain an account
//! that was removed.

use std::sync::Arc;

use common::Account;
use ledger::{Ledger, LineStore};
use tracing::info;

/// Ordered, durable list of accounts still to be authenticated.
pub struct AccountQueue {
    ledger: Ledger<Account>,
}

impl AccountQueue {
    /// Load the pending ledger.
    ///
    /// A missing ledger or a line that isn't `identifier:secret` is an
    /// error: the queue holds credentials and must not be silently truncated.
    pub async fn load(store: Arc<dyn LineStore>) -> ledger::Result<Self> {
        let ledger = Ledger::load(store).await?;
        Ok(Self { ledger })
    }

    pub fn accounts(&self) -> &[Account] {
        self.ledger.entries()
    }

    /// Account at the head of the queue.
    pub fn peek(&self) -> Option<&Account> {
        self.ledger.entries().first()
    }

    pub fn len(&self) -> usize {
        self.ledger.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ledger.is_empty()
    }

    /// Durably rewrite the queue as `remaining` without any account sharing
    /// `processed`'s identifier.
    ///
    /// Idempotent: repeating the call with the same arguments writes the
    /// same content.
    pub async fn commit_removal(
        &mut self,
        processed: &Account,
        remaining: &[Account],
    ) -> ledger::Result<()> {
        let kept: Vec<Account> = remaining
            .iter()
            .filter(|a| a.identifier != processed.identifier)
            .cloned()
            .collect();
        self.ledger.overwrite_all(kept).await?;
        info!(
            identifier = %processed.identifier,
            remaining = self.ledger.len(),
            "removed account from pending queue"
        );
        Ok(())
    }

    /// Remove and return the head account, rewriting the ledger.
    pub async fn remove_head(&mut self) -> ledger::Result<Option<Account>> {
        let Some(head) = self.peek().cloned() else {
            return Ok(None);
        };
        let remaining = self.ledger.entries()[1..].to_vec();
        self.rewrite(remaining).await?;
        Ok(Some(head))
    }

    /// Replace the whole queue.
    pub async fn rewrite(&mut self, accounts: Vec<Account>) -> ledger::Result<()> {
        self.ledger.overwrite_all(accounts).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger::{FileStore, MemoryStore};

    fn ids(queue: &AccountQueue) -> Vec<&str> {
        queue
            .accounts()
            .iter()
            .map(|a| a.identifier.as_str())
            .collect()
    }

    #[tokio::test]
    async fn load_keeps_ledger_order() {
        let store = Arc::new(MemoryStore::with_lines("pending", ["x:1", "y:2", "z:3"]));
        let queue = AccountQueue::load(store).await.unwrap();

        assert_eq!(ids(&queue), vec!["x", "y", "z"]);
        assert_eq!(queue.peek().unwrap().identifier, "x");
    }

    #[tokio::test]
    async fn missing_ledger_is_fatal() {
        let store = Arc::new(MemoryStore::missing("pending"));
        let err = AccountQueue::load(store).await.err().unwrap();
        assert!(matches!(err, ledger::Error::Missing(_)));
    }

    #[tokio::test]
    async fn malformed_line_is_fatal() {
        let store = Arc::new(MemoryStore::with_lines("pending", ["x:1", "y"]));
        let err = AccountQueue::load(store).await.err().unwrap();
        assert!(matches!(err, ledger::Error::Parse { line: 2, .. }));
    }

    #[tokio::test]
    async fn commit_removal_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("accounts.txt");
        std::fs::write(&path, "x:1\ny:2\nz:3\n").unwrap();
        let mut queue = AccountQueue::load(Arc::new(FileStore::new(&path)))
            .await
            .unwrap();

        let processed = queue.accounts()[0].clone();
        let remaining = queue.accounts().to_vec();

        queue.commit_removal(&processed, &remaining).await.unwrap();
        let once = std::fs::read_to_string(&path).unwrap();
        queue.commit_removal(&processed, &remaining).await.unwrap();
        let twice = std::fs::read_to_string(&path).unwrap();

        assert_eq!(once, "y:2\nz:3\n");
        assert_eq!(once, twice);
        assert_eq!(ids(&queue), vec!["y", "z"]);
    }

    #[tokio::test]
    async fn commit_removal_drops_every_entry_with_that_identifier() {
        let store = Arc::new(MemoryStore::with_lines("pending", ["x:1", "y:2", "x:1"]));
        let mut queue = AccountQueue::load(store.clone()).await.unwrap();

        let processed = Account::new("x", "1");
        let remaining = queue.accounts().to_vec();
        queue.commit_removal(&processed, &remaining).await.unwrap();

        assert_eq!(store.lines(), vec!["y:2"]);
    }

    #[tokio::test]
    async fn failed_rewrite_keeps_account_pending() {
        let store = Arc::new(MemoryStore::with_lines("pending", ["x:1", "y:2"]));
        let mut queue = AccountQueue::load(store.clone()).await.unwrap();
        store.fail_overwrites(true);

        let processed = queue.accounts()[0].clone();
        let remaining = queue.accounts().to_vec();
        assert!(queue.commit_removal(&processed, &remaining).await.is_err());

        assert_eq!(ids(&queue), vec!["x", "y"]);
        assert_eq!(store.lines(), vec!["x:1", "y:2"]);
    }

    #[tokio::test]
    async fn remove_head_pops_in_order() {
        let store = Arc::new(MemoryStore::with_lines("pending", ["x:1", "y:2"]));
        let mut queue = AccountQueue::load(store.clone()).await.unwrap();

        assert_eq!(queue.remove_head().await.unwrap().unwrap().identifier, "x");
        assert_eq!(store.lines(), vec!["y:2"]);
        assert_eq!(queue.remove_head().await.unwrap().unwrap().identifier, "y");
        assert!(queue.remove_head().await.unwrap().is_none());
        assert!(queue.is_empty());
        assert!(store.lines().is_empty());
    }

    #[tokio::test]
    async fn rewrite_replaces_queue() {
        let store = Arc::new(MemoryStore::with_lines("pending", ["x:1"]));
        let mut queue = AccountQueue::load(store.clone()).await.unwrap();

        queue
            .rewrite(vec![Account::new("a", "1"), Account::new("b", "2")])
            .await
            .unwrap();
        assert_eq!(store.lines(), vec!["a:1", "b:2"]);
        assert_eq!(queue.len(), 2);
    }
}
