//! Egress identity cycling
//!
//! When enabled, the pipeline drops and re-establishes the host's network
//! egress (e.g. a WARP tunnel) before each account so consecutive logins
//! don't share an exit address.

use std::path::PathBuf;

use ledger::BoxFuture;
use tracing::{debug, warn};

/// Opaque side-effecting hook that rotates the outbound network identity.
pub trait EgressCycler: Send + Sync {
    fn cycle(&self) -> BoxFuture<'_, std::io::Result<()>>;
}

/// Runs `<program> disconnect` then `<program> connect`.
///
/// `connect` always runs, even when `disconnect` fails (e.g. the tunnel was
/// already down), so the host is never left without egress.
#[derive(Debug, Clone)]
pub struct CommandEgressCycler {
    program: PathBuf,
}

impl CommandEgressCycler {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    async fn run(&self, verb: &str) -> std::io::Result<()> {
        let status = tokio::process::Command::new(&self.program)
            .arg(verb)
            .status()
            .await?;
        if !status.success() {
            return Err(std::io::Error::other(format!(
                "`{} {verb}` exited with {status}",
                self.program.display()
            )));
        }
        debug!(program = %self.program.display(), verb, "egress command finished");
        Ok(())
    }
}

impl EgressCycler for CommandEgressCycler {
    fn cycle(&self) -> BoxFuture<'_, std::io::Result<()>> {
        Box::pin(async move {
            let disconnected = self.run("disconnect").await;
            if let Err(e) = &disconnected {
                warn!(error = %e, "egress disconnect failed, connecting anyway");
            }
            let connected = self.run("connect").await;
            disconnected.and(connected)
        })
    }
}
