//! Liveness, readiness and build information

use crate::http::GatewayResponse;
use crate::version::VersionInfo;
use s3vault_keys::KeyService;
use serde_json::json;
use std::sync::Arc;
use tracing::warn;

pub struct HealthHandler {
    keys: Arc<dyn KeyService>,
    version: VersionInfo,
}

impl HealthHandler {
    pub fn new(keys: Arc<dyn KeyService>, version: VersionInfo) -> Self {
        Self { keys, version }
    }

    /// GET `/health`
    pub fn health(&self) -> GatewayResponse {
        GatewayResponse::json(
            200,
            &json!({
                "status": "healthy",
                "vault": self.keys.address(),
                "version": self.version.version,
            }),
        )
    }

    /// GET `/ready`
    pub async fn ready(&self) -> GatewayResponse {
        match self.keys.health_check().await {
            Ok(()) => GatewayResponse::json(
                200,
                &json!({ "status": "ready", "version": self.version.version }),
            ),
            Err(e) => {
                warn!(error = %e, "readiness check failed");
                GatewayResponse::json(
                    503,
                    &json!({ "status": "not ready", "error": "vault unreachable" }),
                )
            }
        }
    }

    /// GET `/version`
    pub fn version(&self) -> GatewayResponse {
        GatewayResponse::json(200, &self.version)
    }
}
