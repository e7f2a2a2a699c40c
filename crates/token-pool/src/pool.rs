//! Round-robin token rotation
//!
//! Every `get_token` call is a writer: it takes the head token and moves it
//! to the tail. The whole read-modify-write runs under a single mutex, so
//! concurrent callers see one global rotation order and no token is ever
//! dropped or duplicated by the pool. Duplicates present in the source list
//! are kept as given.

use std::collections::VecDeque;

use common::Token;
use parking_lot::Mutex;
use tracing::{info, warn};

use crate::snapshot::SnapshotStore;

/// Thread-safe round-robin pool of bearer tokens.
///
/// Share it via `Arc<RotationPool>`; it holds no global state.
#[derive(Debug, Default)]
pub struct RotationPool {
    tokens: Mutex<VecDeque<Token>>,
}

impl RotationPool {
    /// Snapshot `tokens` to `snapshot` and build a pool serving them in order.
    ///
    /// If the snapshot cannot be written the pool starts empty rather than
    /// failing: callers treat an empty pool as "no credentials right now".
    pub async fn new(tokens: Vec<Token>, snapshot: &dyn SnapshotStore) -> Self {
        if let Err(e) = snapshot.save(&tokens).await {
            warn!(
                snapshot = %snapshot.describe(),
                error = %e,
                "failed to snapshot tokens, starting with an empty pool"
            );
            return Self::default();
        }
        info!(tokens = tokens.len(), snapshot = %snapshot.describe(), "token pool initialized");
        Self {
            tokens: Mutex::new(tokens.into()),
        }
    }

    /// Return the least recently issued token and rotate it to the back.
    ///
    /// `None` means the pool has no credentials; it is never an error.
    pub fn get_token(&self) -> Option<Token> {
        let mut tokens = self.tokens.lock();
        let Some(token) = tokens.pop_front() else {
            metrics::counter!("token_pool_requests_total", "outcome" => "empty").increment(1);
            return None;
        };
        tokens.push_back(token.clone());
        metrics::counter!("token_pool_requests_total", "outcome" => "issued").increment(1);
        Some(token)
    }

    /// Number of tokens in rotation.
    pub fn len(&self) -> usize {
        self.tokens.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pool summary for the health endpoint. Never includes token values.
    pub fn health(&self) -> serde_json::Value {
        let total = self.len();
        serde_json::json!({
            "status": if total > 0 { "healthy" } else { "unhealthy" },
            "tokens_total": total,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, Result};
    use crate::snapshot::JsonSnapshot;
    use ledger::BoxFuture;
    use std::sync::Arc;

    fn tokens(values: &[&str]) -> Vec<Token> {
        values.iter().map(|v| Token::new(*v).unwrap()).collect()
    }

    /// Snapshot that always fails.
    struct BrokenSnapshot;

    impl SnapshotStore for BrokenSnapshot {
        fn describe(&self) -> String {
            "broken".into()
        }

        fn save<'a>(&'a self, _tokens: &'a [Token]) -> BoxFuture<'a, Result<()>> {
            Box::pin(async { Err(Error::Snapshot("disk full".into())) })
        }
    }

    async fn pool_with(values: &[&str]) -> (tempfile::TempDir, RotationPool) {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = JsonSnapshot::new(dir.path().join("access_tokens.json"));
        let pool = RotationPool::new(tokens(values), &snapshot).await;
        (dir, pool)
    }

    #[tokio::test]
    async fn rotates_round_robin() {
        let (_dir, pool) = pool_with(&["a", "b", "c"]).await;

        let issued: Vec<String> = (0..7)
            .map(|_| pool.get_token().unwrap().expose().to_string())
            .collect();
        assert_eq!(issued, vec!["a", "b", "c", "a", "b", "c", "a"]);
        assert_eq!(pool.len(), 3);
    }

    #[tokio::test]
    async fn empty_pool_returns_none_every_time() {
        let (_dir, pool) = pool_with(&[]).await;

        for _ in 0..5 {
            assert!(pool.get_token().is_none());
        }
        assert!(pool.is_empty());
    }

    #[tokio::test]
    async fn source_duplicates_are_preserved() {
        let (_dir, pool) = pool_with(&["a", "a", "b"]).await;

        let issued: Vec<String> = (0..6)
            .map(|_| pool.get_token().unwrap().expose().to_string())
            .collect();
        assert_eq!(issued, vec!["a", "a", "b", "a", "a", "b"]);
    }

    #[tokio::test]
    async fn construction_writes_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("access_tokens.json");
        std::fs::write(&path, "[\"stale\"]\n").unwrap();

        let pool = RotationPool::new(tokens(&["x", "y"]), &JsonSnapshot::new(&path)).await;
        assert_eq!(pool.len(), 2);

        let parsed: Vec<String> =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed, vec!["x", "y"]);
    }

    #[tokio::test]
    async fn snapshot_failure_yields_inert_empty_pool() {
        let pool = RotationPool::new(tokens(&["a", "b"]), &BrokenSnapshot).await;

        assert!(pool.is_empty());
        assert!(pool.get_token().is_none());
        assert_eq!(pool.health()["status"], "unhealthy");
    }

    #[tokio::test]
    async fn health_reports_count_without_token_values() {
        let (_dir, pool) = pool_with(&["secret-token-1", "secret-token-2"]).await;

        let health = pool.health();
        assert_eq!(health["status"], "healthy");
        assert_eq!(health["tokens_total"], 2);
        assert!(!health.to_string().contains("secret-token"));
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_rotation() {
        let (_dir, pool) = pool_with(&["a", "b", "c"]).await;
        let pool = Arc::new(pool);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let pool = pool.clone();
                std::thread::spawn(move || {
                    (0..300)
                        .map(|_| pool.get_token().unwrap().expose().to_string())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut counts = std::collections::HashMap::new();
        for handle in handles {
            for token in handle.join().unwrap() {
                *counts.entry(token).or_insert(0usize) += 1;
            }
        }

        // 2400 calls over 3 tokens in strict rotation: exactly 800 each.
        assert_eq!(counts.len(), 3);
        assert!(counts.values().all(|&n| n == 800), "counts: {counts:?}");
        assert_eq!(pool.len(), 3);
    }
}
