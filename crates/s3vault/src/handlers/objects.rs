//! Object operations: put, get, head, delete

use super::{
    kms_key_arn, object_location, record_headers, user_metadata, S3Handler, SSE_HEADER, SSE_KMS,
};
use crate::http::{GatewayResponse, InboundRequest};
use chrono::Utc;
use http::Method;
use s3vault_core::{Error, GatewayMode, SidecarRecord, KMS_KEY_HEADER};
use s3vault_forward::{ForwardRequest, ResponseBody};
use tracing::{debug, error, info, warn};

/// Payload hashes that describe an aws-chunked body rather than the object
const STREAMING_PAYLOAD_PREFIX: &str = "STREAMING-";

impl S3Handler {
    /// PUT `/<bucket>/<key>`
    pub async fn put_object(&self, request: &InboundRequest) -> GatewayResponse {
        let (bucket, key) = object_location(&request.path);
        if bucket.is_empty() || key.is_empty() {
            return GatewayResponse::invalid_request("Missing bucket or key");
        }

        let Some(arn) = kms_key_arn(request) else {
            warn!(bucket = %bucket, key = %key, "missing KMS key in request");
            return GatewayResponse::invalid_request(
                "KMS key ARN is required (x-amz-server-side-encryption-aws-kms-key-id header)",
            );
        };

        let transit_key = match self.keys.resolve_transit_key(arn) {
            Ok(transit_key) => transit_key,
            Err(e) => {
                error!(error = %e, kms_arn = arn, "invalid KMS ARN format");
                return GatewayResponse::from_error(&e);
            }
        };

        info!(
            bucket = %bucket,
            key = %key,
            kms_arn = arn,
            transit_key = %transit_key,
            "mapped KMS ARN to Vault transit key"
        );

        match self.mode {
            GatewayMode::Passthrough => self.put_passthrough(request, arn).await,
            GatewayMode::Envelope => {
                self.put_envelope(request, &bucket, &key, arn, &transit_key)
                    .await
            }
        }
    }

    async fn put_passthrough(&self, request: &InboundRequest, arn: &str) -> GatewayResponse {
        let response = match self
            .forward_or_500(request.to_forward(), "Failed to store object")
            .await
        {
            Ok(response) => response,
            Err(response) => return response,
        };

        if !response.is_success() {
            error!(status_code = response.status, "S3 storage failed");
            return GatewayResponse::relay(response);
        }

        let mut stored = GatewayResponse::relay(response);
        stored.body = ResponseBody::Empty;
        stored.headers.remove("Content-Length");
        stored
            .with_header(SSE_HEADER, SSE_KMS)
            .with_header(&KMS_KEY_HEADER.to_ascii_lowercase(), arn)
    }

    async fn put_envelope(
        &self,
        request: &InboundRequest,
        bucket: &str,
        key: &str,
        arn: &str,
        transit_key: &s3vault_core::TransitKeyName,
    ) -> GatewayResponse {
        if request.body.is_empty() {
            return GatewayResponse::invalid_request("Request body is empty");
        }
        if request
            .header("x-amz-content-sha256")
            .is_some_and(|hash| hash.starts_with(STREAMING_PAYLOAD_PREFIX))
        {
            return GatewayResponse::invalid_request(
                "Streaming payload signatures cannot be used with gateway encryption; sign with UNSIGNED-PAYLOAD",
            );
        }

        let ciphertext = match self.keys.encrypt(&request.body, transit_key).await {
            Ok(ciphertext) => ciphertext,
            Err(e) => {
                error!(error = %e, bucket, key, "failed to encrypt object");
                return GatewayResponse::internal_error("Failed to encrypt object");
            }
        };

        let mut headers = request.headers.clone();
        headers.replace_body_length(ciphertext.len() as u64);
        let primary = ForwardRequest::new(Method::PUT, request.path.clone())
            .with_query(request.query.clone())
            .with_headers(headers)
            .with_body(ciphertext.into_bytes());

        let response = match self.forward_or_500(primary, "Failed to store object").await {
            Ok(response) => response,
            Err(response) => return response,
        };
        if !response.is_success() {
            error!(status_code = response.status, bucket, key, "S3 storage failed");
            return GatewayResponse::relay(response);
        }
        // Drain so the connection can be reused.
        let _ = response.body.collect().await;

        let record = SidecarRecord::for_plaintext(
            &request.body,
            request.header("Content-Type"),
            arn,
            user_metadata(&request.headers),
            Utc::now(),
        );

        if let Err(e) = self.overlay.store(bucket, key, &record, &request.headers).await {
            error!(error = %e, bucket, key, "failed to store object metadata, removing object");
            self.remove_orphan(request, bucket, key).await;
            return GatewayResponse::internal_error("Failed to store object metadata");
        }

        info!(
            bucket,
            key,
            plaintext_size = record.content_length,
            "stored encrypted object"
        );
        GatewayResponse::new(200)
            .with_header("ETag", record.etag)
            .with_header(SSE_HEADER, SSE_KMS)
            .with_header(&KMS_KEY_HEADER.to_ascii_lowercase(), arn)
    }

    /// Best-effort delete of a primary object whose sidecar could not be written
    async fn remove_orphan(&self, request: &InboundRequest, bucket: &str, key: &str) {
        let mut headers = request.headers.clone();
        headers.retain(|name, _| {
            !["Content-Length", "Content-MD5", "Content-Type", "Expect"]
                .iter()
                .any(|h| h.eq_ignore_ascii_case(name))
        });
        let cleanup = ForwardRequest::new(Method::DELETE, request.path.clone()).with_headers(headers);
        match self.backend.forward(cleanup).await {
            Ok(response) if response.is_success() => {
                debug!(bucket, key, "removed object without metadata");
            }
            Ok(response) => {
                warn!(bucket, key, status_code = response.status, "failed to remove object without metadata");
            }
            Err(e) => warn!(bucket, key, error = %e, "failed to remove object without metadata"),
        }
    }

    /// GET `/<bucket>/<key>`
    pub async fn get_object(&self, request: &InboundRequest) -> GatewayResponse {
        if self.mode == GatewayMode::Passthrough {
            return self.relay(request, "Failed to get object").await;
        }

        let (bucket, key) = object_location(&request.path);
        let record = match self.overlay.get(&bucket, &key, &request.headers).await {
            Ok(record) => record,
            Err(Error::NotFound { .. }) => {
                debug!(bucket = %bucket, key = %key, "object not managed, relaying");
                return self.relay(request, "Failed to get object").await;
            }
            Err(e) => return metadata_failure(&e, &bucket, &key),
        };

        // A byte range of the ciphertext cannot be decrypted on its own.
        let mut headers = request.headers.clone();
        if headers.remove("Range").is_some() {
            debug!(bucket = %bucket, key = %key, "ignoring Range on encrypted object");
        }
        let fetch = ForwardRequest::new(Method::GET, request.path.clone())
            .with_query(request.query.clone())
            .with_headers(headers);
        let response = match self.forward_or_500(fetch, "Failed to get object").await {
            Ok(response) => response,
            Err(response) => return response,
        };
        if !response.is_success() {
            return GatewayResponse::relay(response);
        }

        let ciphertext = match response.body.collect().await {
            Ok(body) => body,
            Err(e) => {
                error!(error = %e, bucket = %bucket, key = %key, "failed to read object");
                return GatewayResponse::internal_error("Failed to read object");
            }
        };
        let Ok(ciphertext) = std::str::from_utf8(&ciphertext) else {
            error!(bucket = %bucket, key = %key, "stored object is not a ciphertext envelope");
            return GatewayResponse::internal_error("Failed to decrypt object");
        };

        let plaintext = match self.decrypt_with_record(ciphertext, &record).await {
            Ok(plaintext) => plaintext,
            Err(e) => {
                error!(error = %e, bucket = %bucket, key = %key, "failed to decrypt object");
                return GatewayResponse::internal_error("Failed to decrypt object");
            }
        };

        let mut response = record_headers(GatewayResponse::new(200), &record).with_body(plaintext);
        // The body length is authoritative if the record disagrees.
        response.headers.remove("Content-Length");
        response
    }

    async fn decrypt_with_record(
        &self,
        ciphertext: &str,
        record: &SidecarRecord,
    ) -> s3vault_core::Result<Vec<u8>> {
        let transit_key = self.keys.resolve_transit_key(&record.kms_key_arn)?;
        self.keys.decrypt(ciphertext.trim(), &transit_key).await
    }

    /// HEAD `/<bucket>/<key>`
    pub async fn head_object(&self, request: &InboundRequest) -> GatewayResponse {
        if self.mode == GatewayMode::Passthrough {
            return self.relay(request, "Failed to head object").await;
        }

        let (bucket, key) = object_location(&request.path);
        match self.overlay.get(&bucket, &key, &request.headers).await {
            Ok(record) => {
                if self.overlay.exists(&bucket, &key, &request.headers).await {
                    record_headers(GatewayResponse::new(200), &record)
                } else {
                    GatewayResponse::s3_error(404, "NoSuchKey", "The specified key does not exist.")
                }
            }
            Err(Error::NotFound { .. }) => self.relay(request, "Failed to head object").await,
            Err(e) => metadata_failure(&e, &bucket, &key),
        }
    }

    /// DELETE `/<bucket>/<key>`
    pub async fn delete_object(&self, request: &InboundRequest) -> GatewayResponse {
        let (bucket, key) = object_location(&request.path);
        let response = match self
            .forward_or_500(request.to_forward(), "Failed to delete object")
            .await
        {
            Ok(response) => response,
            Err(response) => return response,
        };
        if !response.is_success() {
            error!(status_code = response.status, bucket = %bucket, key = %key, "failed to delete object");
            return GatewayResponse::relay(response);
        }
        let _ = response.body.collect().await;

        // Objects written before a switch to passthrough still have a sidecar.
        if let Err(e) = self.overlay.delete(&bucket, &key, &request.headers).await {
            warn!(error = %e, bucket = %bucket, key = %key, "failed to delete object metadata");
        }

        GatewayResponse::new(204)
    }
}

/// Response for a sidecar read that failed for a reason other than absence
fn metadata_failure(err: &Error, bucket: &str, key: &str) -> GatewayResponse {
    match err {
        Error::AccessDenied { .. } => {
            GatewayResponse::s3_error(403, "AccessDenied", "Access denied reading object metadata")
        }
        _ => {
            error!(error = %err, bucket, key, "failed to read object metadata");
            GatewayResponse::internal_error("Failed to read object metadata")
        }
    }
}
