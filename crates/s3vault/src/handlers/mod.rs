//! S3 operation handlers

mod buckets;
pub mod health;
mod objects;

use crate::http::{GatewayResponse, InboundRequest};
use s3vault_core::sidecar::SidecarRecord;
use s3vault_core::{GatewayMode, KMS_KEY_HEADER};
use s3vault_forward::{Backend, ForwardRequest, HeaderList};
use s3vault_keys::KeyService;
use s3vault_metadata::MetadataOverlay;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::error;

pub use health::HealthHandler;

/// Server-side encryption marker returned on managed objects
pub const SSE_HEADER: &str = "x-amz-server-side-encryption";
pub const SSE_KMS: &str = "aws:kms";

/// Prefix of user metadata headers
const USER_META_PREFIX: &str = "x-amz-meta-";

pub struct S3Handler {
    backend: Arc<dyn Backend>,
    keys: Arc<dyn KeyService>,
    overlay: MetadataOverlay,
    mode: GatewayMode,
}

impl S3Handler {
    pub fn new(backend: Arc<dyn Backend>, keys: Arc<dyn KeyService>, mode: GatewayMode) -> Self {
        Self {
            overlay: MetadataOverlay::new(Arc::clone(&backend)),
            backend,
            keys,
            mode,
        }
    }

    pub fn mode(&self) -> GatewayMode {
        self.mode
    }

    /// Forward `request`; transport failures become a 500 with `failure`
    async fn forward_or_500(
        &self,
        request: ForwardRequest,
        failure: &str,
    ) -> Result<s3vault_forward::BackendResponse, GatewayResponse> {
        self.backend.forward(request).await.map_err(|e| {
            error!(error = %e, "{failure}");
            GatewayResponse::internal_error(failure)
        })
    }

    /// Forward the inbound request unchanged and relay whatever comes back
    async fn relay(&self, request: &InboundRequest, failure: &str) -> GatewayResponse {
        match self.forward_or_500(request.to_forward(), failure).await {
            Ok(response) => GatewayResponse::relay(response),
            Err(response) => response,
        }
    }
}

/// KMS key ARN from the request, if present and non-blank
fn kms_key_arn(request: &InboundRequest) -> Option<&str> {
    request
        .header(KMS_KEY_HEADER)
        .map(str::trim)
        .filter(|arn| !arn.is_empty())
}

/// `x-amz-meta-*` headers, names lowercased
fn user_metadata(headers: &HeaderList) -> BTreeMap<String, String> {
    headers
        .iter()
        .filter(|(name, _)| {
            name.len() > USER_META_PREFIX.len()
                && name.as_bytes()[..USER_META_PREFIX.len()]
                    .eq_ignore_ascii_case(USER_META_PREFIX.as_bytes())
        })
        .map(|(name, value)| (name.to_ascii_lowercase(), value.to_string()))
        .collect()
}

/// Response headers describing a managed object
fn record_headers(response: GatewayResponse, record: &SidecarRecord) -> GatewayResponse {
    let mut response = response
        .with_header("Content-Type", record.content_type.clone())
        .with_header("Content-Length", record.content_length.to_string())
        .with_header("ETag", record.etag.clone())
        .with_header("Last-Modified", record.last_modified_header())
        .with_header(SSE_HEADER, SSE_KMS)
        .with_header(&KMS_KEY_HEADER.to_ascii_lowercase(), record.kms_key_arn.clone());
    for (name, value) in &record.custom_meta {
        response = response.with_header(name, value.clone());
    }
    response
}

/// Bucket and decoded key of an object path `/<bucket>/<key>`
fn object_location(path: &str) -> (String, String) {
    let trimmed = path.strip_prefix('/').unwrap_or(path);
    let (bucket, key) = trimmed.split_once('/').unwrap_or((trimmed, ""));
    (
        s3vault_metadata::decode_key(bucket).into_owned(),
        s3vault_metadata::decode_key(key).into_owned(),
    )
}
