//! Key gateway bootstrap: token resolution, session, transit client, watcher

use crate::session::VaultSession;
use crate::token::{resolve_initial_token, TokenOrigin};
use crate::transit::VaultTransit;
use crate::watcher::TokenWatcher;
use s3vault_core::config::VaultConfig;
use s3vault_core::Result;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

/// A connected key gateway
pub struct KeyGateway {
    pub transit: Arc<VaultTransit>,
    pub session: Arc<VaultSession>,
    pub origin: TokenOrigin,
    /// Present when the token came from a file and is being watched
    pub watcher: Option<JoinHandle<()>>,
}

impl KeyGateway {
    /// Resolve the token, build the session, and start watching the token
    /// file when that is where the token came from
    pub async fn connect(config: &VaultConfig, shutdown: watch::Receiver<bool>) -> Result<Self> {
        let (token, origin) =
            resolve_initial_token(&config.token_path, config.token.as_deref()).await?;
        let session = Arc::new(VaultSession::new(config, token)?);
        let transit = Arc::new(VaultTransit::new(
            Arc::clone(&session),
            config.transit_mount.clone(),
        ));

        let watcher = (origin == TokenOrigin::File).then(|| {
            let watcher = TokenWatcher::new(&config.token_path, Arc::clone(&session));
            tokio::spawn(watcher.run(config.watch_interval, shutdown))
        });

        info!(
            address = %session.address(),
            mount = %config.transit_mount,
            token_source = %origin,
            watching = watcher.is_some(),
            "key gateway ready"
        );

        Ok(Self {
            transit,
            session,
            origin,
            watcher,
        })
    }
}
