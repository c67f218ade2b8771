//! Sidecar records stored through the forwarding layer

use crate::path::{encode_key, object_path};
use bytes::Bytes;
use http::Method;
use s3vault_core::sidecar::{is_sidecar_key, sidecar_key};
use s3vault_core::xml::ListBucketResult;
use s3vault_core::{Error, Result, SidecarRecord};
use s3vault_forward::{Backend, ForwardRequest, HeaderList};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Headers describing a request body; they never carry over to a sidecar request
const BODY_HEADERS: &[&str] = &["Content-Length", "Content-MD5", "Content-Type", "Expect"];

pub struct MetadataOverlay {
    backend: Arc<dyn Backend>,
}

impl MetadataOverlay {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    /// Write `<key>.metadata` with the caller's forwarded headers
    pub async fn store(
        &self,
        bucket: &str,
        key: &str,
        record: &SidecarRecord,
        headers: &HeaderList,
    ) -> Result<()> {
        let body = Bytes::from(serde_json::to_vec(record)?);
        let path = object_path(bucket, &sidecar_key(key));

        let mut headers = headers.clone();
        headers.remove("Expect");
        headers.replace_body_length(body.len() as u64);
        headers.set("Content-Type", "application/json");

        debug!(bucket, key, path = %path, "storing object metadata");
        let response = self
            .backend
            .forward(
                ForwardRequest::new(Method::PUT, path)
                    .with_headers(headers)
                    .with_body(body),
            )
            .await?;

        if !response.is_success() {
            let status = response.status;
            let body = response.body.collect().await.unwrap_or_default();
            error!(
                bucket,
                key,
                status_code = status,
                error_body = %String::from_utf8_lossy(&body),
                "failed to store metadata"
            );
            return Err(Error::StoreFailed {
                bucket: bucket.to_string(),
                key: key.to_string(),
                status,
            });
        }

        debug!(bucket, key, "stored object metadata");
        Ok(())
    }

    /// Read and decode `<key>.metadata`
    pub async fn get(&self, bucket: &str, key: &str, headers: &HeaderList) -> Result<SidecarRecord> {
        let path = object_path(bucket, &sidecar_key(key));
        let response = self
            .backend
            .forward(ForwardRequest::new(Method::GET, path.clone()).with_headers(without_body(headers)))
            .await
            .inspect_err(|e| error!(bucket, key, error = %e, "failed to forward metadata request"))?;

        let status = response.status;
        match status {
            404 => {
                debug!(path = %path, "no metadata for object");
                return Err(Error::not_found(bucket, key));
            }
            403 => {
                let body = response.body.collect().await.unwrap_or_default();
                warn!(
                    path = %path,
                    response_body = %String::from_utf8_lossy(&body),
                    "access denied reading metadata, check signature forwarding"
                );
                return Err(Error::AccessDenied {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                    status,
                });
            }
            s if s >= 400 => {
                let body = response.body.collect().await.unwrap_or_default();
                error!(
                    status_code = s,
                    response_body = %String::from_utf8_lossy(&body),
                    "failed to get metadata"
                );
                return Err(Error::StoreFailed {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                    status,
                });
            }
            _ => {}
        }

        let body = response.body.collect().await?;
        serde_json::from_slice(&body).map_err(|source| Error::InvalidMetadata {
            bucket: bucket.to_string(),
            key: key.to_string(),
            source,
        })
    }

    /// HEAD the primary object; true only on 200 or 204
    pub async fn exists(&self, bucket: &str, key: &str, headers: &HeaderList) -> bool {
        let response = match self
            .backend
            .head_object(bucket, &encode_key(key), &without_body(headers))
            .await
        {
            Ok(response) => response,
            Err(e) => {
                debug!(bucket, key, error = %e, "object existence check failed");
                return false;
            }
        };

        let exists = matches!(response.status, 200 | 204);
        debug!(bucket, key, exists, status_code = response.status, "object existence check");
        exists
    }

    /// Remove `<key>.metadata`; an absent record counts as removed
    pub async fn delete(&self, bucket: &str, key: &str, headers: &HeaderList) -> Result<()> {
        let path = object_path(bucket, &sidecar_key(key));
        let response = self
            .backend
            .forward(ForwardRequest::new(Method::DELETE, path).with_headers(without_body(headers)))
            .await?;

        match response.status {
            s if s < 400 || s == 404 => Ok(()),
            status => Err(Error::StoreFailed {
                bucket: bucket.to_string(),
                key: key.to_string(),
                status,
            }),
        }
    }
}

/// Drop sidecar entries from a listing, keeping the order of the rest
pub fn filter_managed(mut listing: ListBucketResult) -> ListBucketResult {
    let before = listing.contents.len();
    listing.contents.retain(|entry| !is_sidecar_key(&entry.key));
    let removed = (before - listing.contents.len()) as u64;
    if let Some(count) = listing.key_count.as_mut() {
        *count = count.saturating_sub(removed);
    }
    listing
}

/// Drop sidecar `<Contents>` entries from listing XML that did not parse
/// into a [`ListBucketResult`]. `KeyCount` is left as sent.
pub fn filter_managed_xml(xml: &str) -> String {
    const OPEN: &str = "<Contents>";
    const CLOSE: &str = "</Contents>";

    let mut filtered = String::with_capacity(xml.len());
    let mut rest = xml;
    while let Some(start) = rest.find(OPEN) {
        let Some(length) = rest[start..].find(CLOSE) else {
            break;
        };
        let end = start + length + CLOSE.len();
        let entry = &rest[start..end];
        filtered.push_str(&rest[..start]);
        if !entry_key(entry).is_some_and(is_sidecar_key) {
            filtered.push_str(entry);
        }
        rest = &rest[end..];
    }
    filtered.push_str(rest);
    filtered
}

fn entry_key(entry: &str) -> Option<&str> {
    let start = entry.find("<Key>")? + "<Key>".len();
    let length = entry[start..].find("</Key>")?;
    Some(&entry[start..start + length])
}

fn without_body(headers: &HeaderList) -> HeaderList {
    let mut headers = headers.clone();
    headers.retain(|name, _| !BODY_HEADERS.iter().any(|h| h.eq_ignore_ascii_case(name)));
    headers
}
