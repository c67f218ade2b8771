//! Service and bucket operations

use super::S3Handler;
use crate::http::{GatewayResponse, InboundRequest, XML_CONTENT_TYPE};
use futures::future::join_all;
use s3vault_core::xml::{from_xml, to_xml, Content, ListBucketResult};
use s3vault_core::GatewayMode;
use s3vault_forward::{BackendResponse, HeaderList, ResponseBody};
use s3vault_metadata::{decode_key, decode_listing_key, filter_managed, filter_managed_xml};
use tracing::{debug, error, warn};

/// Sidecar reads in flight while enriching one listing
const ENRICH_CONCURRENCY: usize = 8;

impl S3Handler {
    /// GET `/`
    pub async fn list_buckets(&self, request: &InboundRequest) -> GatewayResponse {
        self.relay(request, "Failed to list buckets").await
    }

    /// PUT `/<bucket>`
    pub async fn create_bucket(&self, request: &InboundRequest) -> GatewayResponse {
        self.relay(request, "Failed to create bucket").await
    }

    /// GET `/<bucket>`
    pub async fn list_objects(&self, request: &InboundRequest) -> GatewayResponse {
        let bucket = decode_key(request.path.trim_matches('/')).into_owned();
        debug!(
            bucket = %bucket,
            query = request.query.as_deref().unwrap_or(""),
            host = request.header("Host").unwrap_or(""),
            "list objects"
        );

        let response = match self
            .forward_or_500(request.to_forward(), "Failed to list objects")
            .await
        {
            Ok(response) => response,
            Err(response) => return response,
        };
        if response.status >= 400 {
            return GatewayResponse::relay(response);
        }

        let status = response.status;
        let headers = response.headers;
        let body = match response.body.collect().await {
            Ok(body) => body,
            Err(e) => {
                error!(error = %e, bucket = %bucket, "failed to read list response");
                return GatewayResponse::internal_error("Failed to read list response");
            }
        };

        // Sub-resource queries such as `?location` return other documents.
        let text = std::str::from_utf8(&body)
            .ok()
            .filter(|text| text.contains("<ListBucketResult"));
        let listing = match text.map(|text| (text, from_xml::<ListBucketResult>(text))) {
            Some((_, Ok(listing))) => listing,
            Some((text, Err(e))) => {
                warn!(error = %e, bucket = %bucket, "unparseable object listing, filtering sidecars as text");
                let mut raw = GatewayResponse::relay(BackendResponse::new(status, headers, ResponseBody::Empty));
                raw.headers.remove("Content-Length");
                return raw.with_body(filter_managed_xml(text));
            }
            None => {
                debug!(bucket = %bucket, "response is not an object listing, relaying raw");
                let mut raw = GatewayResponse::relay(BackendResponse::new(status, headers, ResponseBody::Empty));
                raw.headers.remove("Content-Length");
                return raw.with_body(body.clone());
            }
        };

        let mut listing = filter_managed(listing);
        if self.mode == GatewayMode::Envelope {
            self.enrich(&bucket, &mut listing, &request.headers).await;
        }

        match to_xml(&listing) {
            Ok(xml) => GatewayResponse::new(200)
                .with_header("Content-Type", XML_CONTENT_TYPE)
                .with_body(xml),
            Err(e) => {
                error!(error = %e, bucket = %bucket, "failed to serialize listing");
                GatewayResponse::internal_error("Failed to list objects")
            }
        }
    }

    /// Replace ciphertext size and ETag with the plaintext values from each
    /// entry's sidecar; entries whose sidecar cannot be read stay as they are
    async fn enrich(&self, bucket: &str, listing: &mut ListBucketResult, headers: &HeaderList) {
        let keys: Vec<String> = if listing.is_url_encoded() {
            listing
                .contents
                .iter()
                .map(|entry| decode_listing_key(&entry.key).into_owned())
                .collect()
        } else {
            listing.contents.iter().map(|entry| entry.key.clone()).collect()
        };

        let mut records = Vec::with_capacity(keys.len());
        for batch in keys.chunks(ENRICH_CONCURRENCY) {
            let reads: Vec<_> = batch
                .iter()
                .map(|key| self.overlay.get(bucket, key, headers))
                .collect();
            records.extend(join_all(reads).await);
        }

        for (entry, record) in listing.contents.iter_mut().zip(records) {
            match record {
                Ok(record) => apply_record(entry, record.content_length, record.etag),
                Err(e) => debug!(bucket, key = %entry.key, error = %e, "listing entry left unenriched"),
            }
        }
    }
}

fn apply_record(entry: &mut Content, size: u64, etag: String) {
    entry.size = size;
    entry.etag = etag;
}
