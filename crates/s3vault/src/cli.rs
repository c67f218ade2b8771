//! CLI argument parsing with clap

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use s3vault_core::config::{
    BackendConfig, BuildInfo, LogConfig, LogFormat, ServerConfig, VaultConfig,
    DEFAULT_BODY_LIMIT, DEFAULT_TOKEN_PATH, DEFAULT_TRANSIT_MOUNT,
};
use s3vault_core::{GatewayConfig, GatewayMode, SchemePolicy};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

/// S3 gateway that encrypts objects with Vault transit keys
#[derive(Parser, Debug)]
#[command(name = "s3vault")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the gateway (default)
    Serve(ServeArgs),

    /// Show version information
    Version(VersionArgs),

    /// Print the transit key name a KMS key ARN maps to
    ResolveKey(ResolveKeyArgs),
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    #[command(flatten)]
    pub build: BuildArgs,
}

#[derive(Args, Debug)]
pub struct ResolveKeyArgs {
    /// KMS key ARN, e.g. arn:aws:kms:us-east-1:123456789012:key/my-key
    pub arn: String,
}

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    /// Listen port
    #[arg(long, env = "PORT", default_value_t = 9000)]
    pub port: u16,

    /// Listen address
    #[arg(long, env = "LISTEN_ADDR", default_value = "0.0.0.0")]
    pub listen_addr: IpAddr,

    /// S3 backend endpoint URL
    #[arg(long, env = "S3_ENDPOINT", default_value = "")]
    pub s3_endpoint: String,

    /// Extra PEM CA certificate trusted for the backend
    #[arg(long, env = "S3_CA_CERT_PATH")]
    pub s3_ca_cert_path: Option<PathBuf>,

    /// Backend scheme policy: follow-client or endpoint
    #[arg(long, env = "S3_SCHEME_POLICY", default_value = "follow-client")]
    pub s3_scheme_policy: SchemePolicy,

    /// Vault address
    #[arg(long, env = "VAULT_ADDR", default_value = "")]
    pub vault_addr: String,

    /// Vault token; the token file takes precedence and VAULT_TOKEN is the fallback
    #[arg(long)]
    pub vault_token: Option<String>,

    /// File holding the Vault token, re-read while running
    #[arg(long, env = "VAULT_TOKEN_PATH", default_value = DEFAULT_TOKEN_PATH)]
    pub vault_token_path: PathBuf,

    /// Transit engine mount
    #[arg(long, env = "VAULT_TRANSIT_MOUNT", default_value = DEFAULT_TRANSIT_MOUNT)]
    pub vault_transit_mount: String,

    /// Vault namespace
    #[arg(long, env = "VAULT_NAMESPACE")]
    pub vault_namespace: Option<String>,

    /// Gateway mode: envelope or passthrough
    #[arg(long, env = "GATEWAY_MODE", default_value = "envelope")]
    pub mode: GatewayMode,

    /// Largest accepted request body in bytes
    #[arg(long, env = "BODY_LIMIT", default_value_t = DEFAULT_BODY_LIMIT)]
    pub body_limit: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log format: json or text
    #[arg(long, env = "LOG_FORMAT", default_value = "json")]
    pub log_format: LogFormat,

    #[command(flatten)]
    pub build: BuildArgs,
}

/// Build metadata injected by the release pipeline
#[derive(Args, Debug, Clone)]
pub struct BuildArgs {
    #[arg(long, env = "VERSION", default_value = "dev", hide = true)]
    pub build_version: String,

    #[arg(long, env = "COMMIT", default_value = "none", hide = true)]
    pub build_commit: String,

    #[arg(long, env = "DATE", default_value = "unknown", hide = true)]
    pub build_date: String,

    #[arg(long, env = "BUILT_BY", default_value = "unknown", hide = true)]
    pub built_by: String,
}

impl BuildArgs {
    pub fn into_build_info(self) -> BuildInfo {
        BuildInfo {
            version: self.build_version,
            commit: self.build_commit,
            date: self.build_date,
            built_by: self.built_by,
        }
    }
}

impl ServeArgs {
    /// Assemble and validate the gateway configuration
    pub fn into_config(self) -> Result<GatewayConfig> {
        let mut backend = BackendConfig::new(self.s3_endpoint.trim());
        backend.ca_cert_path = self.s3_ca_cert_path.filter(|p| !p.as_os_str().is_empty());
        backend.scheme_policy = self.s3_scheme_policy;

        let mut vault = VaultConfig::new(self.vault_addr.trim());
        vault.token = self.vault_token;
        vault.token_path = self.vault_token_path;
        vault.transit_mount = self.vault_transit_mount;
        vault.namespace = self.vault_namespace.filter(|ns| !ns.trim().is_empty());

        let server = ServerConfig {
            listen: SocketAddr::new(self.listen_addr, self.port),
            body_limit: self.body_limit,
            ..ServerConfig::default()
        };

        let config = GatewayConfig {
            mode: self.mode,
            server,
            backend,
            vault,
            log: LogConfig {
                level: self.log_level,
                format: self.log_format,
            },
            build: self.build.into_build_info(),
        };

        let env_token = std::env::var("VAULT_TOKEN").is_ok_and(|t| !t.trim().is_empty());
        config
            .validate(env_token)
            .context("invalid gateway configuration")?;
        Ok(config)
    }
}

/// `serve` with every option taken from the environment or its default
pub fn default_serve_args() -> Result<ServeArgs> {
    #[derive(Parser)]
    struct ServeOnly {
        #[command(flatten)]
        args: ServeArgs,
    }
    let parsed = ServeOnly::try_parse_from(["s3vault"]).context("invalid environment configuration")?;
    Ok(parsed.args)
}
