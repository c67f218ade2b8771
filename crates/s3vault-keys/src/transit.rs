//! Transit engine operations behind a narrow capability trait

use crate::session::VaultSession;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use s3vault_core::{Error, Result, TransitKeyName};
use std::sync::Arc;
use tracing::debug;
use vaultrs::transit;

/// Statuses of `sys/health` that mean Vault is up (active, standby, perf standby)
const HEALTHY_STATUSES: &[u16] = &[200, 429, 473];

const NAMESPACE_HEADER: &str = "X-Vault-Namespace";

/// Key brokering operations the gateway depends on
#[async_trait]
pub trait KeyService: Send + Sync {
    /// Validate a KMS key ARN and derive its transit key name
    fn resolve_transit_key(&self, arn: &str) -> Result<TransitKeyName> {
        TransitKeyName::from_arn(arn)
    }

    /// Encrypt `plaintext`, returning the opaque ciphertext envelope
    async fn encrypt(&self, plaintext: &[u8], key: &TransitKeyName) -> Result<String>;

    /// Decrypt a ciphertext envelope produced by [`KeyService::encrypt`]
    async fn decrypt(&self, ciphertext: &str, key: &TransitKeyName) -> Result<Vec<u8>>;

    /// Reachability probe used by readiness
    async fn health_check(&self) -> Result<()>;

    /// Configured service address, empty when unconfigured
    fn address(&self) -> String;
}

/// Vault transit client
pub struct VaultTransit {
    session: Option<Arc<VaultSession>>,
    mount: String,
    http: reqwest::Client,
}

impl VaultTransit {
    pub fn new(session: Arc<VaultSession>, mount: impl Into<String>) -> Self {
        Self {
            session: Some(session),
            mount: mount.into(),
            http: reqwest::Client::new(),
        }
    }

    /// A client with no session; every operation fails with `NotConfigured`
    pub fn unconfigured() -> Self {
        Self {
            session: None,
            mount: String::new(),
            http: reqwest::Client::new(),
        }
    }

    pub fn mount(&self) -> &str {
        &self.mount
    }

    fn session(&self) -> Result<&Arc<VaultSession>> {
        self.session
            .as_ref()
            .ok_or_else(|| Error::not_configured("vault"))
    }
}

#[async_trait]
impl KeyService for VaultTransit {
    async fn encrypt(&self, plaintext: &[u8], key: &TransitKeyName) -> Result<String> {
        let session = self.session()?;
        let state = session.snapshot().await;
        let encoded = STANDARD.encode(plaintext);

        let response = transit::data::encrypt(state.client(), &self.mount, key.as_str(), &encoded, None)
            .await
            .map_err(|e| Error::encryption_failed(key, e))?;

        if response.ciphertext.is_empty() {
            return Err(Error::encryption_failed(key, "response has no ciphertext"));
        }

        debug!(transit_key = %key, plaintext_len = plaintext.len(), "encrypted object data");
        Ok(response.ciphertext)
    }

    async fn decrypt(&self, ciphertext: &str, key: &TransitKeyName) -> Result<Vec<u8>> {
        let session = self.session()?;
        let state = session.snapshot().await;

        let response = transit::data::decrypt(state.client(), &self.mount, key.as_str(), ciphertext, None)
            .await
            .map_err(|e| Error::decryption_failed(key, e))?;

        let plaintext = STANDARD
            .decode(response.plaintext.as_bytes())
            .map_err(|e| Error::decryption_failed(key, format!("plaintext is not valid base64: {e}")))?;

        debug!(transit_key = %key, plaintext_len = plaintext.len(), "decrypted object data");
        Ok(plaintext)
    }

    async fn health_check(&self) -> Result<()> {
        let session = self.session()?;
        let url = format!("{}/v1/sys/health", session.address());

        let mut request = self.http.get(&url).timeout(session.timeout());
        if let Some(namespace) = session.namespace() {
            request = request.header(NAMESPACE_HEADER, namespace);
        }
        let response = request
            .send()
            .await
            .map_err(|e| Error::unreachable("vault", e))?;

        let status = response.status().as_u16();
        if HEALTHY_STATUSES.contains(&status) {
            Ok(())
        } else {
            Err(Error::unreachable(
                "vault",
                format!("health check returned HTTP {status}"),
            ))
        }
    }

    fn address(&self) -> String {
        self.session
            .as_ref()
            .map(|s| s.address().to_string())
            .unwrap_or_default()
    }
}
