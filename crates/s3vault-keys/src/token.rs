//! Vault session token and its startup sources
//!
//! Priority: token file, then explicit value, then `VAULT_TOKEN`.

use s3vault_core::{Error, Result};
use std::fmt;
use std::path::Path;
use tracing::{debug, info};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// A Vault token, zeroed on drop and never printed
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SessionToken {
    inner: String,
}

impl SessionToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            inner: value.into(),
        }
    }

    /// The raw token (use with caution)
    pub fn expose(&self) -> &str {
        &self.inner
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionToken([REDACTED {} bytes])", self.len())
    }
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

/// Where the active token came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenOrigin {
    File,
    Value,
    Env,
}

impl fmt::Display for TokenOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File => write!(f, "file"),
            Self::Value => write!(f, "value"),
            Self::Env => write!(f, "env"),
        }
    }
}

/// Read a token file; `None` when it is missing, unreadable or blank
pub async fn read_token_file(path: &Path) -> Option<SessionToken> {
    match tokio::fs::read_to_string(path).await {
        Ok(mut content) => {
            let trimmed = content.trim();
            let token = (!trimmed.is_empty()).then(|| SessionToken::new(trimmed));
            content.zeroize();
            token
        }
        Err(e) => {
            debug!(path = %path.display(), error = %e, "token file not readable");
            None
        }
    }
}

fn non_blank(value: Option<String>) -> Option<SessionToken> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .map(SessionToken::new)
}

/// Resolve the startup token using the process environment as the last source
pub async fn resolve_initial_token(
    token_path: &Path,
    token: Option<&str>,
) -> Result<(SessionToken, TokenOrigin)> {
    resolve_initial_token_with(token_path, token, || std::env::var("VAULT_TOKEN").ok()).await
}

/// Resolve the startup token with an injectable environment lookup
pub async fn resolve_initial_token_with<F>(
    token_path: &Path,
    token: Option<&str>,
    env_token: F,
) -> Result<(SessionToken, TokenOrigin)>
where
    F: FnOnce() -> Option<String>,
{
    if let Some(token) = read_token_file(token_path).await {
        info!(path = %token_path.display(), "using Vault token from file");
        return Ok((token, TokenOrigin::File));
    }

    if let Some(token) = non_blank(token.map(str::to_string)) {
        info!("using Vault token from configuration");
        return Ok((token, TokenOrigin::Value));
    }

    if let Some(token) = non_blank(env_token()) {
        info!("using Vault token from VAULT_TOKEN");
        return Ok((token, TokenOrigin::Env));
    }

    Err(Error::invalid_config(format!(
        "no Vault token available: {} is missing or blank and no token value or VAULT_TOKEN is set",
        token_path.display()
    )))
}
