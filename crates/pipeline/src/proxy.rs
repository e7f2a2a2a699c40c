//! Round-robin proxy assignment

use std::collections::VecDeque;

use common::ProxyDescriptor;
use ledger::LineStore;
use tracing::{info, warn};

/// Hands out one proxy per authentication attempt in strict rotation.
///
/// Single-threaded by design: the pipeline owns it exclusively. Running
/// several batches in parallel would need the same locking as the token pool.
#[derive(Debug, Default)]
pub struct ProxyAssigner {
    proxies: VecDeque<ProxyDescriptor>,
}

impl ProxyAssigner {
    pub fn new(proxies: Vec<ProxyDescriptor>) -> Self {
        Self {
            proxies: proxies.into(),
        }
    }

    /// Load the proxy list. A missing list means "no proxies"; lines that are
    /// neither `host:port` nor `host:port:user:pass` are skipped.
    pub async fn load(store: &dyn LineStore) -> ledger::Result<Self> {
        let lines = match store.read_lines().await {
            Ok(lines) => lines,
            Err(ledger::Error::Missing(_)) => {
                info!(ledger = %store.describe(), "proxy list not found, running without proxies");
                return Ok(Self::default());
            }
            Err(e) => return Err(e),
        };

        let proxies = parse_proxy_lines(&lines, &store.describe());
        info!(ledger = %store.describe(), proxies = proxies.len(), "loaded proxy list");
        Ok(Self::new(proxies))
    }

    /// Next proxy in rotation; it moves to the back of the list.
    pub fn next_proxy(&mut self) -> Option<ProxyDescriptor> {
        let proxy = self.proxies.pop_front()?;
        self.proxies.push_back(proxy.clone());
        Some(proxy)
    }

    pub fn len(&self) -> usize {
        self.proxies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.proxies.is_empty()
    }
}

fn parse_proxy_lines(lines: &[String], ledger: &str) -> Vec<ProxyDescriptor> {
    lines
        .iter()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .filter_map(|(idx, line)| {
            let parsed = ProxyDescriptor::parse_line(line);
            if parsed.is_none() {
                warn!(ledger, line = idx + 1, "skipping malformed proxy line");
            }
            parsed
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger::MemoryStore;

    fn proxy(host: &str) -> ProxyDescriptor {
        ProxyDescriptor::parse_line(&format!("{host}:1080")).unwrap()
    }

    #[test]
    fn rotates_through_proxies() {
        let mut assigner = ProxyAssigner::new(vec![proxy("p1"), proxy("p2")]);

        let hosts: Vec<String> = (0..3)
            .map(|_| assigner.next_proxy().unwrap().host)
            .collect();
        assert_eq!(hosts, vec!["p1", "p2", "p1"]);
        assert_eq!(assigner.len(), 2);
    }

    #[test]
    fn empty_assigner_returns_none() {
        let mut assigner = ProxyAssigner::default();
        assert!(assigner.next_proxy().is_none());
        assert!(assigner.is_empty());
    }

    #[tokio::test]
    async fn malformed_lines_are_skipped() {
        let store = MemoryStore::with_lines("proxies", ["10.0.0.1:1080", "10.0.0.2:1080:user", ""]);
        let mut assigner = ProxyAssigner::load(&store).await.unwrap();

        assert_eq!(assigner.len(), 1);
        assert_eq!(assigner.next_proxy().unwrap().host, "10.0.0.1");
    }

    #[tokio::test]
    async fn missing_list_is_empty_not_an_error() {
        let store = MemoryStore::missing("proxies");
        let assigner = ProxyAssigner::load(&store).await.unwrap();
        assert!(assigner.is_empty());
    }

    #[tokio::test]
    async fn authenticated_proxies_keep_credentials() {
        let store = MemoryStore::with_lines("proxies", ["10.0.0.9:1080:u:p"]);
        let mut assigner = ProxyAssigner::load(&store).await.unwrap();

        assert_eq!(
            assigner.next_proxy().unwrap().socks5_url(),
            "socks5://u:p@10.0.0.9:1080"
        );
    }
}
