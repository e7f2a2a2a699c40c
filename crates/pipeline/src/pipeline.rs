//! Batch orchestrator
//!
//! For each pending account:
//! 1. optionally cycle the egress identity and wait for it to settle
//! 2. take the next proxy (or the fallback proxy when the list is empty)
//! 3. authenticate
//! 4. commit: append token → append account to authenticated → rewrite pending
//!
//! A failed login halts the batch. A failed ledger write is logged, the
//! account's remaining writes are skipped, and the batch moves on.

use std::sync::Arc;
use std::time::Duration;

use authenticator::{AuthError, Authenticator};
use common::{Account, Token};
use ledger::{Ledger, LineStore};
use tracing::{error, info, instrument, warn};

use crate::egress::EgressCycler;
use crate::error::{Error, Result};
use crate::proxy::ProxyAssigner;
use crate::queue::AccountQueue;
use crate::state::{BatchEvent, BatchState, transition};

/// Run-time knobs for a batch.
#[derive(Debug, Clone, Default)]
pub struct PipelineConfig {
    /// Cycle the egress identity before each account.
    pub cycle_egress: bool,
    /// Wait after cycling before the next login.
    pub settle_delay: Duration,
    /// Proxy URL used when the proxy list is empty.
    pub fallback_proxy: Option<String>,
}

/// Storage handles for the four ledgers a run touches.
#[derive(Clone)]
pub struct Ledgers {
    pub pending: Arc<dyn LineStore>,
    pub authenticated: Arc<dyn LineStore>,
    pub tokens: Arc<dyn LineStore>,
    pub proxies: Arc<dyn LineStore>,
}

/// Result of one `run()`.
#[derive(Debug)]
pub struct BatchReport {
    /// Terminal state: `Drained` or `HaltedOnError`.
    pub state: BatchState,
    /// Identifiers fully committed, in order.
    pub committed: Vec<String>,
    /// Ledger writes that failed after a successful login.
    pub persistence_failures: Vec<Error>,
}

impl BatchReport {
    pub fn halted(&self) -> bool {
        matches!(self.state, BatchState::HaltedOnError { .. })
    }
}

/// Sequential account authentication pipeline.
pub struct Pipeline {
    config: PipelineConfig,
    authenticator: Arc<dyn Authenticator>,
    egress: Arc<dyn EgressCycler>,
    proxies: ProxyAssigner,
    queue: AccountQueue,
    authenticated: Ledger<Account>,
    tokens: Ledger<Token>,
}

impl Pipeline {
    /// Load every ledger. Any failure here is fatal and happens before a
    /// single side effect.
    pub async fn load(
        config: PipelineConfig,
        ledgers: Ledgers,
        authenticator: Arc<dyn Authenticator>,
        egress: Arc<dyn EgressCycler>,
    ) -> Result<Self> {
        let queue = AccountQueue::load(ledgers.pending)
            .await
            .map_err(Error::FatalLoad)?;
        let proxies = ProxyAssigner::load(ledgers.proxies.as_ref())
            .await
            .map_err(Error::FatalLoad)?;
        let authenticated = Ledger::open(ledgers.authenticated)
            .await
            .map_err(Error::FatalLoad)?;
        let tokens = Ledger::open(ledgers.tokens)
            .await
            .map_err(Error::FatalLoad)?;

        Ok(Self {
            config,
            authenticator,
            egress,
            proxies,
            queue,
            authenticated,
            tokens,
        })
    }

    pub fn queue(&self) -> &AccountQueue {
        &self.queue
    }

    pub fn authenticated(&self) -> &Ledger<Account> {
        &self.authenticated
    }

    pub fn tokens(&self) -> &Ledger<Token> {
        &self.tokens
    }

    /// Work through the pending queue until it is drained or a login fails.
    pub async fn run(&mut self) -> BatchReport {
        info!(
            pending = self.queue.len(),
            proxies = self.proxies.len(),
            authenticator = self.authenticator.id(),
            cycle_egress = self.config.cycle_egress,
            "starting batch"
        );

        let mut state = BatchState::Running { committed: 0 };
        let mut committed = Vec::new();
        let mut persistence_failures = Vec::new();
        // Accounts before the cursor had an incomplete commit and are left
        // pending for the next run.
        let mut cursor = 0;

        while !state.is_terminal() {
            let Some(account) = self.queue.accounts().get(cursor).cloned() else {
                state = transition(state, BatchEvent::QueueExhausted);
                continue;
            };

            let event = match self.authenticate(&account).await {
                Err(error) => {
                    error!(
                        identifier = %account.identifier,
                        stage = %error.stage,
                        http_status = ?error.http_status,
                        error = %error,
                        "authentication failed, halting batch"
                    );
                    BatchEvent::AuthenticationFailed {
                        identifier: account.identifier.clone(),
                        error,
                    }
                }
                Ok(token) => match self.commit(&account, &token).await {
                    Ok(()) => {
                        info!(identifier = %account.identifier, "account committed");
                        committed.push(account.identifier.clone());
                        BatchEvent::AccountCommitted
                    }
                    Err(e) => {
                        warn!(
                            identifier = %account.identifier,
                            error = %e,
                            "commit incomplete, account stays pending"
                        );
                        persistence_failures.push(e);
                        cursor += 1;
                        BatchEvent::CommitIncomplete
                    }
                },
            };
            state = transition(state, event);
        }

        info!(
            state = state.label(),
            committed = state.committed(),
            pending = self.queue.len(),
            persistence_failures = persistence_failures.len(),
            "batch finished"
        );

        BatchReport {
            state,
            committed,
            persistence_failures,
        }
    }

    #[instrument(skip_all, fields(identifier = %account.identifier))]
    async fn authenticate(&mut self, account: &Account) -> std::result::Result<Token, AuthError> {
        if self.config.cycle_egress {
            if let Err(e) = self.egress.cycle().await {
                warn!(error = %e, "egress cycling failed, continuing");
            }
            tokio::time::sleep(self.config.settle_delay).await;
        }

        let proxy_url = match self.proxies.next_proxy() {
            Some(proxy) => {
                info!(proxy_host = %proxy.host, proxy_port = %proxy.port, "using proxy");
                Some(proxy.socks5_url())
            }
            None => {
                if self.config.fallback_proxy.is_some() {
                    info!("proxy list empty, using fallback proxy");
                }
                self.config.fallback_proxy.clone()
            }
        };

        self.authenticator
            .authenticate(
                &account.identifier,
                account.secret.expose(),
                proxy_url.as_deref(),
            )
            .await
    }

    /// Commit sequence. Stops at the first failed write.
    async fn commit(&mut self, account: &Account, token: &Token) -> Result<()> {
        let persistence = |ledger: &'static str| {
            let identifier = account.identifier.clone();
            move |source| Error::Persistence {
                ledger,
                identifier,
                source,
            }
        };

        self.tokens
            .append(token)
            .await
            .map_err(persistence("tokens"))?;
        self.authenticated
            .append(account)
            .await
            .map_err(persistence("authenticated"))?;

        let remaining = self.queue.accounts().to_vec();
        self.queue
            .commit_removal(account, &remaining)
            .await
            .map_err(persistence("pending"))?;
        Ok(())
    }
}
