//! Authenticator capability
//!
//! Defines the `Authenticator` trait that decouples the harvesting pipeline
//! from the external login flow. The pipeline hands over an identifier, the
//! account secret and an optional proxy URL, and gets back either a bearer
//! token or a structured `AuthError` saying which stage of the flow failed.
//!
//! The login protocol itself lives outside this workspace.
//! `CommandAuthenticator` bridges to it by running a helper executable.

pub mod command;

pub use command::CommandAuthenticator;

use std::future::Future;
use std::pin::Pin;

use common::Token;

/// Failure of the external login flow.
///
/// `stage` names the step that failed (e.g. "login", "challenge", "token"),
/// `http_status` carries the upstream status code when there was one.
#[derive(Debug, thiserror::Error)]
#[error(
    "authentication failed at stage `{stage}`{}: {message}",
    .http_status.map(|s| format!(" (HTTP {s})")).unwrap_or_default()
)]
pub struct AuthError {
    pub stage: String,
    pub http_status: Option<u16>,
    pub message: String,
    #[source]
    pub cause: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl AuthError {
    pub fn new(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            http_status: None,
            message: message.into(),
            cause: None,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.http_status = Some(status);
        self
    }

    pub fn with_cause(mut self, cause: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }
}

/// Result alias for authentication attempts.
pub type Result<T> = std::result::Result<T, AuthError>;

/// Performs the external login flow for one account.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility
/// (`Arc<dyn Authenticator>`). Timeouts are the implementation's business;
/// the pipeline waits for whatever comes back.
pub trait Authenticator: Send + Sync {
    /// Identifier for logging (e.g. "command").
    fn id(&self) -> &str;

    /// Log in as `identifier` using `secret`, routed through `proxy_url` when
    /// given, and return the issued bearer token.
    fn authenticate<'a>(
        &'a self,
        identifier: &'a str,
        secret: &'a str,
        proxy_url: Option<&'a str>,
    ) -> Pin<Box<dyn Future<Output = Result<Token>> + Send + 'a>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn display_includes_stage_status_and_message() {
        let err = AuthError::new("login", "account locked").with_status(403);
        assert_eq!(
            err.to_string(),
            "authentication failed at stage `login` (HTTP 403): account locked"
        );

        let err = AuthError::new("challenge", "no solution");
        assert_eq!(
            err.to_string(),
            "authentication failed at stage `challenge`: no solution"
        );
    }

    #[test]
    fn cause_is_exposed_as_source() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset by peer");
        let err = AuthError::new("login", "transport error").with_cause(io);
        let source = err.source().expect("cause should be the source");
        assert!(source.to_string().contains("reset by peer"));
    }
}
