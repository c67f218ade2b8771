//! s3vault gateway: S3 handlers, routing and the HTTP/1.1 listener

pub mod handlers;
pub mod http;
pub mod logging;
pub mod router;
pub mod version;

use handlers::{HealthHandler, S3Handler};
use router::Gateway;
use s3vault_core::GatewayMode;
use s3vault_forward::Backend;
use s3vault_keys::KeyService;
use std::sync::Arc;
use version::VersionInfo;

/// Assemble the request surface from its collaborators
pub fn build_gateway(
    backend: Arc<dyn Backend>,
    keys: Arc<dyn KeyService>,
    mode: GatewayMode,
    version: VersionInfo,
) -> Gateway {
    let s3 = S3Handler::new(backend, Arc::clone(&keys), mode);
    let health = HealthHandler::new(keys, version);
    Gateway::new(s3, health)
}
