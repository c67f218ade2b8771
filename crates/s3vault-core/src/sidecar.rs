//! Sidecar metadata records
//!
//! Every object written through the gateway gets a companion object named
//! `<key>.metadata` in the same bucket. It carries the plaintext attributes
//! that cannot be recovered from the stored ciphertext.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Suffix appended to an object key to name its sidecar
pub const SIDECAR_SUFFIX: &str = ".metadata";

/// Content type recorded when the client declares none
pub const DEFAULT_CONTENT_TYPE: &str = "binary/octet-stream";

/// Plaintext attributes of a managed object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SidecarRecord {
    /// Plaintext length in bytes
    pub content_length: u64,
    pub content_type: String,
    /// Quoted hex MD5 digest of the plaintext
    pub etag: String,
    /// HTTP-date of the write
    pub last_modified: String,
    pub kms_key_arn: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub custom_meta: BTreeMap<String, String>,
}

impl SidecarRecord {
    /// Build the record for a plaintext body written at `now`
    pub fn for_plaintext(
        data: &[u8],
        content_type: Option<&str>,
        kms_key_arn: impl Into<String>,
        custom_meta: BTreeMap<String, String>,
        now: DateTime<Utc>,
    ) -> Self {
        let content_type = content_type
            .filter(|ct| !ct.is_empty())
            .unwrap_or(DEFAULT_CONTENT_TYPE);

        Self {
            content_length: data.len() as u64,
            content_type: content_type.to_string(),
            etag: plaintext_etag(data),
            last_modified: http_date(now),
            kms_key_arn: kms_key_arn.into(),
            custom_meta,
        }
    }

    /// Last-modified normalized to an HTTP-date, or the stored text verbatim
    /// when it does not parse
    pub fn last_modified_header(&self) -> String {
        DateTime::parse_from_rfc2822(&self.last_modified)
            .map(|t| http_date(t.with_timezone(&Utc)))
            .unwrap_or_else(|_| self.last_modified.clone())
    }

    /// Last-modified as a timestamp, if it parses
    pub fn last_modified_time(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc2822(&self.last_modified)
            .ok()
            .map(|t| t.with_timezone(&Utc))
    }
}

/// Key of the sidecar for `key`
pub fn sidecar_key(key: &str) -> String {
    format!("{key}{SIDECAR_SUFFIX}")
}

/// True for keys that name a sidecar rather than a primary object
pub fn is_sidecar_key(key: &str) -> bool {
    key.ends_with(SIDECAR_SUFFIX)
}

/// S3-style ETag for a plaintext body
pub fn plaintext_etag(data: &[u8]) -> String {
    format!("\"{:x}\"", md5::compute(data))
}

/// IMF-fixdate as used by `Last-Modified`
pub fn http_date(time: DateTime<Utc>) -> String {
    time.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}
