//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! `CF_PROXY` turns on egress cycling and `http_proxy` / `HTTP_PROXY`
//! overrides the fallback proxy, so existing shell setups keep working.

use pipeline::PipelineConfig;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub ledgers: LedgerPaths,
    /// Required by `harvest`
    #[serde(default)]
    pub authenticator: Option<AuthenticatorConfig>,
    #[serde(default)]
    pub egress: EgressConfig,
    /// Required by `serve`
    #[serde(default)]
    pub gateway: Option<GatewayConfig>,
}

/// Ledger file locations
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LedgerPaths {
    pub pending: PathBuf,
    pub authenticated: PathBuf,
    pub tokens: PathBuf,
    pub proxies: PathBuf,
    pub snapshot: PathBuf,
}

impl Default for LedgerPaths {
    fn default() -> Self {
        Self {
            pending: "accounts.txt".into(),
            authenticated: "authenticated_accounts.txt".into(),
            tokens: "access_tokens.txt".into(),
            proxies: "proxies.txt".into(),
            snapshot: "access_tokens.json".into(),
        }
    }
}

/// External login helper
#[derive(Debug, Deserialize)]
pub struct AuthenticatorConfig {
    pub program: PathBuf,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default = "default_login_timeout")]
    pub timeout_secs: u64,
}

/// Egress identity cycling
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct EgressConfig {
    pub enabled: bool,
    pub program: PathBuf,
    pub settle_secs: u64,
    pub fallback_proxy: Option<String>,
}

impl Default for EgressConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            program: "warp-cli".into(),
            settle_secs: 5,
            fallback_proxy: None,
        }
    }
}

/// Credential-injecting gateway
#[derive(Debug, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
    #[serde(default = "default_admin_addr")]
    pub admin_addr: SocketAddr,
    pub upstream_url: String,
    #[serde(default = "default_gateway_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_login_paths")]
    pub login_paths: Vec<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

fn default_login_timeout() -> u64 {
    300
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

fn default_admin_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 9090))
}

fn default_gateway_timeout() -> u64 {
    60
}

fn default_max_connections() -> usize {
    1000
}

fn default_login_paths() -> Vec<String> {
    vec!["/chatgpt/login".into(), "/platform/login".into()]
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;
        config.overlay_env();
        config.validate()?;
        Ok(config)
    }

    fn overlay_env(&mut self) {
        if std::env::var("CF_PROXY").is_ok_and(|v| !v.is_empty()) {
            self.egress.enabled = true;
        }

        // Lowercase wins, as with curl
        let proxy = ["http_proxy", "HTTP_PROXY"]
            .iter()
            .filter_map(|key| std::env::var(key).ok())
            .find(|v| !v.trim().is_empty());
        if let Some(proxy) = proxy {
            self.egress.fallback_proxy = Some(proxy.trim().to_owned());
        }
    }

    fn validate(&self) -> common::Result<()> {
        if let Some(auth) = &self.authenticator {
            if auth.program.as_os_str().is_empty() {
                return Err(common::Error::Config(
                    "authenticator.program must not be empty".into(),
                ));
            }
            if auth.timeout_secs == 0 {
                return Err(common::Error::Config(
                    "authenticator.timeout_secs must be greater than 0".into(),
                ));
            }
        }

        if self.egress.enabled && self.egress.program.as_os_str().is_empty() {
            return Err(common::Error::Config(
                "egress.program must not be empty when egress cycling is enabled".into(),
            ));
        }

        if let Some(gateway) = &self.gateway {
            if !gateway.upstream_url.starts_with("http://")
                && !gateway.upstream_url.starts_with("https://")
            {
                return Err(common::Error::Config(format!(
                    "upstream_url must start with http:// or https://, got: {}",
                    gateway.upstream_url
                )));
            }
            if gateway.timeout_secs == 0 {
                return Err(common::Error::Config(
                    "gateway.timeout_secs must be greater than 0".into(),
                ));
            }
            if gateway.max_connections == 0 {
                return Err(common::Error::Config(
                    "gateway.max_connections must be greater than 0".into(),
                ));
            }
        }

        Ok(())
    }

    /// Pipeline knobs derived from the egress section.
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            cycle_egress: self.egress.enabled,
            settle_delay: Duration::from_secs(self.egress.settle_secs),
            fallback_proxy: self.egress.fallback_proxy.clone(),
        }
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("token-harvester.toml")
    }
}
