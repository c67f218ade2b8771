//! Periodic re-read of the Vault token file

use crate::session::VaultSession;
use crate::token::SessionToken;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use zeroize::Zeroize;

/// Result of one watch cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchOutcome {
    Unchanged,
    Rotated,
    /// File exists but is blank; the previous token stays active
    Blank,
    /// File could not be read; the previous token stays active
    ReadFailed,
    /// New token could not be installed; the previous token stays active
    SwapFailed,
}

pub struct TokenWatcher {
    path: PathBuf,
    session: Arc<VaultSession>,
}

impl TokenWatcher {
    pub fn new(path: impl Into<PathBuf>, session: Arc<VaultSession>) -> Self {
        Self {
            path: path.into(),
            session,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the file once and swap the token if it changed
    pub async fn check_once(&self) -> WatchOutcome {
        let mut content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "failed to read Vault token file");
                return WatchOutcome::ReadFailed;
            }
        };

        let candidate = SessionToken::new(content.trim());
        content.zeroize();
        if candidate.is_empty() {
            warn!(path = %self.path.display(), "Vault token file is blank, keeping current token");
            return WatchOutcome::Blank;
        }

        if self.session.is_current(&candidate).await {
            debug!(path = %self.path.display(), "Vault token unchanged");
            return WatchOutcome::Unchanged;
        }

        match self.session.replace_token(candidate).await {
            Ok(()) => {
                info!(path = %self.path.display(), "Vault token updated from file");
                WatchOutcome::Rotated
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "failed to install new Vault token");
                WatchOutcome::SwapFailed
            }
        }
    }

    /// Check every `period` until `shutdown` turns true or its sender is dropped
    pub async fn run(self, period: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            path = %self.path.display(),
            interval_secs = period.as_secs(),
            "watching Vault token file"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.check_once().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        debug!("token watcher stopped");
                        return;
                    }
                }
            }
        }
    }
}
