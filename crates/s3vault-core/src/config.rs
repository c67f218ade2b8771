//! Gateway configuration
//!
//! Built once at startup by the binary and handed to each component.

use crate::error::{Error, Result};
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Default token file mounted by the Vault agent injector
pub const DEFAULT_TOKEN_PATH: &str = "/vault/secrets/token";

/// Default transit engine mount
pub const DEFAULT_TRANSIT_MOUNT: &str = "transit";

/// Default request body limit (100 MiB)
pub const DEFAULT_BODY_LIMIT: usize = 100 * 1024 * 1024;

/// Where object encryption happens
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GatewayMode {
    /// The gateway encrypts bodies through the transit engine and keeps sidecars
    #[default]
    Envelope,
    /// Bodies pass through unmodified; the backend applies SSE-KMS itself
    Passthrough,
}

impl FromStr for GatewayMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "envelope" => Ok(Self::Envelope),
            "passthrough" | "pass-through" => Ok(Self::Passthrough),
            other => Err(format!(
                "unknown gateway mode '{other}' (expected envelope or passthrough)"
            )),
        }
    }
}

impl fmt::Display for GatewayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Envelope => write!(f, "envelope"),
            Self::Passthrough => write!(f, "passthrough"),
        }
    }
}

/// How the backend scheme is chosen when the client's original scheme differs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchemePolicy {
    /// Upgrade an http endpoint to https when the client connected over https
    #[default]
    FollowClient,
    /// Always use the configured endpoint scheme
    Endpoint,
}

impl FromStr for SchemePolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "follow-client" | "follow_client" => Ok(Self::FollowClient),
            "endpoint" => Ok(Self::Endpoint),
            other => Err(format!(
                "unknown scheme policy '{other}' (expected follow-client or endpoint)"
            )),
        }
    }
}

impl fmt::Display for SchemePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FollowClient => write!(f, "follow-client"),
            Self::Endpoint => write!(f, "endpoint"),
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Json,
    Text,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "text" | "console" | "pretty" => Ok(Self::Text),
            other => Err(format!("unknown log format '{other}' (expected json or text)")),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json => write!(f, "json"),
            Self::Text => write!(f, "text"),
        }
    }
}

/// S3 backend connection settings
#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub endpoint: String,
    /// Extra PEM trust root, added to the system roots
    pub ca_cert_path: Option<PathBuf>,
    pub scheme_policy: SchemePolicy,
    /// Overall deadline for a single backend call
    pub timeout: Duration,
}

impl BackendConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ca_cert_path: None,
            scheme_policy: SchemePolicy::default(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Vault connection settings
#[derive(Debug, Clone)]
pub struct VaultConfig {
    pub address: String,
    /// Explicit token; ranks after the token file
    pub token: Option<String>,
    pub token_path: PathBuf,
    pub transit_mount: String,
    pub namespace: Option<String>,
    pub timeout: Duration,
    /// How often the token file is re-read
    pub watch_interval: Duration,
}

impl VaultConfig {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            token: None,
            token_path: PathBuf::from(DEFAULT_TOKEN_PATH),
            transit_mount: DEFAULT_TRANSIT_MOUNT.to_string(),
            namespace: None,
            timeout: Duration::from_secs(30),
            watch_interval: Duration::from_secs(60),
        }
    }
}

/// Inbound listener settings
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen: SocketAddr,
    pub body_limit: usize,
    /// Idle keep-alive connections are closed after this long
    pub idle_timeout: Duration,
    /// Deadline for reading a request head and body
    pub read_timeout: Duration,
    /// Grace period for in-flight requests at shutdown
    pub shutdown_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 9000)),
            body_limit: DEFAULT_BODY_LIMIT,
            idle_timeout: Duration::from_secs(120),
            read_timeout: Duration::from_secs(30),
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Json,
        }
    }
}

/// Build metadata reported by `/version`
#[derive(Debug, Clone)]
pub struct BuildInfo {
    pub version: String,
    pub commit: String,
    pub date: String,
    pub built_by: String,
}

impl Default for BuildInfo {
    fn default() -> Self {
        Self {
            version: "dev".to_string(),
            commit: "none".to_string(),
            date: "unknown".to_string(),
            built_by: "unknown".to_string(),
        }
    }
}

/// Complete gateway configuration
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub mode: GatewayMode,
    pub server: ServerConfig,
    pub backend: BackendConfig,
    pub vault: VaultConfig,
    pub log: LogConfig,
    pub build: BuildInfo,
}

impl GatewayConfig {
    /// Check required settings. `env_token` reports whether `VAULT_TOKEN`
    /// is available as a last-resort token source.
    pub fn validate(&self, env_token: bool) -> Result<()> {
        if self.backend.endpoint.trim().is_empty() {
            return Err(Error::invalid_config("S3_ENDPOINT is required"));
        }

        let endpoint = url::Url::parse(&self.backend.endpoint).map_err(|e| {
            Error::invalid_config(format!(
                "S3_ENDPOINT '{}' is not a valid URL: {e}",
                self.backend.endpoint
            ))
        })?;
        if !matches!(endpoint.scheme(), "http" | "https") || endpoint.host_str().is_none() {
            return Err(Error::invalid_config(format!(
                "S3_ENDPOINT '{}' must be an http or https URL with a host",
                self.backend.endpoint
            )));
        }

        if self.vault.address.trim().is_empty() {
            return Err(Error::invalid_config("VAULT_ADDR is required"));
        }

        if self.vault.transit_mount.trim().is_empty() {
            return Err(Error::invalid_config("VAULT_TRANSIT_MOUNT must not be empty"));
        }

        let has_value = self
            .vault
            .token
            .as_deref()
            .is_some_and(|t| !t.trim().is_empty());
        if !self.vault.token_path.exists() && !has_value && !env_token {
            return Err(Error::invalid_config(format!(
                "no Vault token source: {} does not exist and neither a token value nor VAULT_TOKEN is set",
                self.vault.token_path.display()
            )));
        }

        if self.server.body_limit == 0 {
            return Err(Error::invalid_config("BODY_LIMIT must be greater than zero"));
        }

        Ok(())
    }
}
