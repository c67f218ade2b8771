//! Vault transit key brokering
//!
//! Resolves KMS key ARNs to transit key names, encrypts and decrypts object
//! data through the transit engine, and keeps the Vault token current when it
//! is rotated on disk.

pub mod gateway;
pub mod session;
pub mod token;
pub mod transit;
pub mod watcher;

pub use gateway::KeyGateway;
pub use session::VaultSession;
pub use token::{resolve_initial_token, SessionToken, TokenOrigin};
pub use transit::{KeyService, VaultTransit};
pub use watcher::{TokenWatcher, WatchOutcome};
