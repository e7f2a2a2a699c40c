//! Authenticator backed by an external helper program
//!
//! The helper is invoked once per account as `<program> [args..] <identifier>`.
//! The secret is written to its stdin so it never shows up in the process
//! table, and the proxy URL is exported as `ALL_PROXY` / `HTTPS_PROXY`.
//!
//! Contract with the helper:
//! - exit 0, token on the first stdout line → success
//! - non-zero exit → failure; a JSON object
//!   `{"stage": "...", "status": 403, "message": "..."}` on stderr or stdout
//!   is turned into a structured `AuthError`

use std::path::PathBuf;
use std::process::{Output, Stdio};
use std::time::Duration;

use common::Token;
use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument};

use crate::{AuthError, Authenticator, Result};

/// Structured failure a helper may print before exiting non-zero.
#[derive(Debug, Deserialize)]
struct HelperFailure {
    stage: Option<String>,
    status: Option<u16>,
    message: Option<String>,
}

/// Runs a helper executable to perform the login flow.
#[derive(Debug, Clone)]
pub struct CommandAuthenticator {
    program: PathBuf,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandAuthenticator {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
        }
    }

    #[instrument(skip_all, fields(identifier = %identifier, proxied = proxy_url.is_some()))]
    async fn run(&self, identifier: &str, secret: &str, proxy_url: Option<&str>) -> Result<Token> {
        let mut command = tokio::process::Command::new(&self.program);
        command
            .args(&self.args)
            .arg(identifier)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(url) = proxy_url {
            command.env("ALL_PROXY", url).env("HTTPS_PROXY", url);
        }

        let mut child = command.spawn().map_err(|e| {
            AuthError::new(
                "spawn",
                format!("failed to start {}", self.program.display()),
            )
            .with_cause(e)
        })?;

        if let Some(mut stdin) = child.stdin.take() {
            let mut payload = String::with_capacity(secret.len() + 1);
            payload.push_str(secret);
            payload.push('\n');
            match stdin.write_all(payload.as_bytes()).await {
                Ok(()) => {}
                // Helper exited without reading stdin; its exit status decides.
                Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                    debug!("helper closed stdin before reading the secret");
                }
                Err(e) => {
                    return Err(AuthError::new("spawn", "failed to pass secret to helper")
                        .with_cause(e));
                }
            }
        }

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                AuthError::new(
                    "timeout",
                    format!("helper did not finish within {}s", self.timeout.as_secs_f64()),
                )
            })?
            .map_err(|e| AuthError::new("helper", "failed to collect helper output").with_cause(e))?;

        if !output.status.success() {
            return Err(failure_from_output(&output));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let first_line = stdout.lines().next().unwrap_or("");
        let token = Token::new(first_line).ok_or_else(|| {
            AuthError::new("token", "helper exited successfully but printed no token")
        })?;
        debug!("helper returned a token");
        Ok(token)
    }
}

impl Authenticator for CommandAuthenticator {
    fn id(&self) -> &str {
        "command"
    }

    fn authenticate<'a>(
        &'a self,
        identifier: &'a str,
        secret: &'a str,
        proxy_url: Option<&'a str>,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Token>> + Send + 'a>> {
        Box::pin(self.run(identifier, secret, proxy_url))
    }
}

/// Build an `AuthError` from a failed helper run.
///
/// Prefers a JSON failure object on stderr, then stdout; falls back to the
/// raw stderr text.
fn failure_from_output(output: &Output) -> AuthError {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stdout = String::from_utf8_lossy(&output.stdout);

    let structured = [stderr.trim(), stdout.trim()]
        .into_iter()
        .find_map(|text| serde_json::from_str::<HelperFailure>(text).ok());

    if let Some(failure) = structured {
        let mut err = AuthError::new(
            failure.stage.unwrap_or_else(|| "helper".into()),
            failure
                .message
                .unwrap_or_else(|| format!("helper exited with {}", output.status)),
        );
        if let Some(status) = failure.status {
            err = err.with_status(status);
        }
        return err;
    }

    let message = if stderr.trim().is_empty() {
        format!("helper exited with {}", output.status)
    } else {
        stderr.trim().to_string()
    };
    AuthError::new("helper", message)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    /// Helper that runs `script` under `sh`, with the identifier as `$1`.
    fn sh(script: &str) -> CommandAuthenticator {
        CommandAuthenticator::new(
            "/bin/sh",
            vec!["-c".into(), script.into(), "helper".into()],
            Duration::from_secs(10),
        )
    }

    #[tokio::test]
    async fn returns_first_stdout_line_as_token() {
        let auth = sh(r#"read secret; echo "tok-$1-$secret"; echo "ignored""#);
        let token = auth.authenticate("alice", "pw", None).await.unwrap();
        assert_eq!(token.expose(), "tok-alice-pw");
    }

    #[tokio::test]
    async fn exports_proxy_url_to_helper() {
        let auth = sh(r#"echo "$ALL_PROXY""#);
        let token = auth
            .authenticate("alice", "pw", Some("socks5://10.0.0.1:1080"))
            .await
            .unwrap();
        assert_eq!(token.expose(), "socks5://10.0.0.1:1080");
    }

    #[tokio::test]
    async fn structured_failure_is_parsed() {
        let auth = sh(
            r#"echo '{"stage":"login","status":403,"message":"proxy banned"}' >&2; exit 1"#,
        );
        let err = auth.authenticate("alice", "pw", None).await.unwrap_err();
        assert_eq!(err.stage, "login");
        assert_eq!(err.http_status, Some(403));
        assert_eq!(err.message, "proxy banned");
    }

    #[tokio::test]
    async fn unstructured_failure_uses_stderr() {
        let auth = sh("echo 'connection refused' >&2; exit 3");
        let err = auth.authenticate("alice", "pw", None).await.unwrap_err();
        assert_eq!(err.stage, "helper");
        assert_eq!(err.http_status, None);
        assert_eq!(err.message, "connection refused");
    }

    #[tokio::test]
    async fn empty_stdout_is_a_token_stage_failure() {
        let auth = sh("exit 0");
        let err = auth.authenticate("alice", "pw", None).await.unwrap_err();
        assert_eq!(err.stage, "token");
    }

    #[tokio::test]
    async fn missing_program_is_a_spawn_failure() {
        let auth = CommandAuthenticator::new(
            "/nonexistent/login-helper",
            vec![],
            Duration::from_secs(1),
        );
        let err = auth.authenticate("alice", "pw", None).await.unwrap_err();
        assert_eq!(err.stage, "spawn");
        assert!(std::error::Error::source(&err).is_some());
    }

    #[tokio::test]
    async fn slow_helper_times_out() {
        let auth = CommandAuthenticator::new(
            "/bin/sh",
            vec!["-c".into(), "sleep 5".into(), "helper".into()],
            Duration::from_millis(100),
        );
        let err = auth.authenticate("alice", "pw", None).await.unwrap_err();
        assert_eq!(err.stage, "timeout");
    }
}
