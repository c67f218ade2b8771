//! Live Vault client session with hot-swappable token

use crate::token::SessionToken;
use s3vault_core::config::VaultConfig;
use s3vault_core::{Error, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::info;
use vaultrs::client::{VaultClient, VaultClientSettingsBuilder};

/// One immutable generation of the session: a client bound to one token
pub struct SessionState {
    client: VaultClient,
    token: SessionToken,
}

impl SessionState {
    pub fn client(&self) -> &VaultClient {
        &self.client
    }

    pub fn token(&self) -> &SessionToken {
        &self.token
    }
}

/// Shared Vault session.
///
/// Callers take a snapshot of the current generation and keep using it for
/// the whole operation, so a concurrent token swap never affects a call in
/// flight. A swap replaces the generation in one step.
pub struct VaultSession {
    address: String,
    namespace: Option<String>,
    timeout: Duration,
    state: RwLock<Arc<SessionState>>,
}

impl VaultSession {
    pub fn new(config: &VaultConfig, token: SessionToken) -> Result<Self> {
        let address = config.address.trim_end_matches('/').to_string();
        let state = build_state(&address, config.namespace.as_deref(), config.timeout, token)?;

        info!(address = %address, namespace = ?config.namespace, "created Vault session");

        Ok(Self {
            address,
            namespace: config.namespace.clone(),
            timeout: config.timeout,
            state: RwLock::new(Arc::new(state)),
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// Per-request timeout for Vault calls
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Current generation
    pub async fn snapshot(&self) -> Arc<SessionState> {
        Arc::clone(&*self.state.read().await)
    }

    /// True when `candidate` is the token currently in use
    pub async fn is_current(&self, candidate: &SessionToken) -> bool {
        self.state.read().await.token == *candidate
    }

    /// Install a new token for every subsequent operation
    pub async fn replace_token(&self, token: SessionToken) -> Result<()> {
        let next = build_state(&self.address, self.namespace.as_deref(), self.timeout, token)?;
        *self.state.write().await = Arc::new(next);
        Ok(())
    }
}

impl std::fmt::Debug for VaultSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultSession")
            .field("address", &self.address)
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

fn build_state(
    address: &str,
    namespace: Option<&str>,
    timeout: Duration,
    token: SessionToken,
) -> Result<SessionState> {
    // The settings builder panics on a malformed address, so check first.
    let parsed = url::Url::parse(address)
        .map_err(|e| Error::invalid_config(format!("invalid Vault address '{address}': {e}")))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(Error::invalid_config(format!(
            "Vault address '{address}' must use http or https"
        )));
    }

    let mut settings = VaultClientSettingsBuilder::default();
    settings.address(address);
    settings.token(token.expose());
    settings.timeout(Some(timeout));
    if let Some(ns) = namespace {
        settings.namespace(Some(ns.to_string()));
    }

    let settings = settings
        .build()
        .map_err(|e| Error::invalid_config(format!("Vault client settings: {e}")))?;
    let client = VaultClient::new(settings)
        .map_err(|e| Error::invalid_config(format!("Vault client: {e}")))?;

    Ok(SessionState { client, token })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_replace_token_swaps_generation() {
        let config = VaultConfig::new("http://127.0.0.1:8200/");
        let session = VaultSession::new(&config, SessionToken::new("s.one")).unwrap();
        assert_eq!(session.address(), "http://127.0.0.1:8200");

        let before = session.snapshot().await;
        session.replace_token(SessionToken::new("s.two")).await.unwrap();

        assert_eq!(before.token().expose(), "s.one");
        assert_eq!(session.snapshot().await.token().expose(), "s.two");
        assert!(session.is_current(&SessionToken::new("s.two")).await);
    }

    #[test]
    fn test_invalid_address_is_rejected() {
        let config = VaultConfig::new("vault without scheme");
        assert!(VaultSession::new(&config, SessionToken::new("s.x")).is_err());

        let config = VaultConfig::new("ftp://vault");
        assert!(VaultSession::new(&config, SessionToken::new("s.x")).is_err());
    }
}
