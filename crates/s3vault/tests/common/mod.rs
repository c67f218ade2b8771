//! In-memory collaborators shared by the gateway integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{TimeZone, Utc};
use http::Method;
use s3vault::build_gateway;
use s3vault::router::Gateway;
use s3vault::version::VersionInfo;
use s3vault_core::sidecar::plaintext_etag;
use s3vault_core::xml::{to_xml, Content, ListBucketResult, S3_XMLNS};
use s3vault_core::{Error, GatewayMode, Result, TransitKeyName};
use s3vault_forward::{Backend, BackendResponse, ForwardRequest, HeaderList, ResponseBody};
use s3vault_keys::KeyService;
use s3vault_metadata::decode_key;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const ARN: &str = "arn:aws:kms:us-east-1:123456789012:key/12345678-1234-1234-1234-123456789012";

/// Any request whose path contains this makes the backend panic
pub const PANIC_MARKER: &str = "explode";

#[derive(Debug, Clone)]
pub struct StoredObject {
    pub body: Bytes,
    pub headers: HeaderList,
}

/// S3 backend keeping objects in a map keyed by decoded path
#[derive(Default)]
pub struct MemoryBackend {
    objects: Mutex<BTreeMap<String, StoredObject>>,
    requests: Mutex<Vec<(Method, String)>>,
    fail_put_suffix: Mutex<Option<String>>,
    raw_listing: Mutex<Option<String>>,
}

impl MemoryBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// PUTs to paths ending in `suffix` answer 500
    pub fn fail_puts_ending_with(&self, suffix: &str) {
        *self.fail_put_suffix.lock().unwrap() = Some(suffix.to_string());
    }

    /// Bucket listings answer with `xml` instead of the stored objects
    pub fn serve_listing(&self, xml: &str) {
        *self.raw_listing.lock().unwrap() = Some(xml.to_string());
    }

    pub fn insert(&self, path: &str, body: impl Into<Bytes>) {
        self.objects.lock().unwrap().insert(
            path.to_string(),
            StoredObject {
                body: body.into(),
                headers: HeaderList::new(),
            },
        );
    }

    pub fn remove(&self, path: &str) {
        self.objects.lock().unwrap().remove(path);
    }

    pub fn object(&self, path: &str) -> Option<StoredObject> {
        self.objects.lock().unwrap().get(path).cloned()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.objects.lock().unwrap().contains_key(path)
    }

    pub fn requests(&self) -> Vec<(Method, String)> {
        self.requests.lock().unwrap().clone()
    }

    /// With `url_encoded`, keys are form-encoded the way S3 answers
    /// `encoding-type=url`
    fn listing(&self, bucket: &str, url_encoded: bool) -> String {
        if let Some(xml) = self.raw_listing.lock().unwrap().clone() {
            return xml;
        }
        let prefix = format!("/{bucket}/");
        let contents = self
            .objects
            .lock()
            .unwrap()
            .iter()
            .filter_map(|(path, object)| {
                path.strip_prefix(&prefix).map(|key| Content {
                    key: if url_encoded {
                        key.replace('+', "%2B").replace(' ', "+")
                    } else {
                        key.to_string()
                    },
                    last_modified: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
                    etag: plaintext_etag(&object.body),
                    size: object.body.len() as u64,
                    owner: None,
                    storage_class: "STANDARD".to_string(),
                })
            })
            .collect::<Vec<_>>();
        let listing = ListBucketResult {
            xmlns: Some(S3_XMLNS.to_string()),
            name: bucket.to_string(),
            max_keys: 1000,
            key_count: Some(contents.len() as u64),
            encoding_type: url_encoded.then(|| "url".to_string()),
            contents,
            ..Default::default()
        };
        to_xml(&listing).unwrap()
    }
}

fn xml_error(status: u16, code: &str) -> BackendResponse {
    let body = format!("<Error><Code>{code}</Code><Message>{code}</Message></Error>");
    let headers: HeaderList = [
        ("Content-Type", "application/xml".to_string()),
        ("Content-Length", body.len().to_string()),
    ]
    .into_iter()
    .collect();
    BackendResponse::new(status, headers, ResponseBody::Full(Bytes::from(body)))
}

fn full(status: u16, body: impl Into<Bytes>, content_type: &str) -> BackendResponse {
    let body = body.into();
    let headers: HeaderList = [
        ("Content-Type", content_type.to_string()),
        ("Content-Length", body.len().to_string()),
    ]
    .into_iter()
    .collect();
    BackendResponse::new(status, headers, ResponseBody::Full(body))
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn forward(&self, request: ForwardRequest) -> Result<BackendResponse> {
        if request.path.contains(PANIC_MARKER) {
            panic!("backend exploded");
        }

        let path = decode_key(&request.path).into_owned();
        self.requests
            .lock()
            .unwrap()
            .push((request.method.clone(), path.clone()));

        let trimmed = path.trim_start_matches('/');
        let (bucket, key) = trimmed.split_once('/').unwrap_or((trimmed, ""));

        if bucket.is_empty() {
            let body = format!(
                "<ListAllMyBucketsResult xmlns=\"{S3_XMLNS}\"><Buckets></Buckets></ListAllMyBucketsResult>"
            );
            return Ok(full(200, body, "application/xml"));
        }

        if key.is_empty() {
            return Ok(match request.method {
                Method::GET => {
                    let url_encoded = request
                        .query
                        .as_deref()
                        .is_some_and(|q| q.split('&').any(|p| p.eq_ignore_ascii_case("encoding-type=url")));
                    full(200, self.listing(bucket, url_encoded), "application/xml")
                }
                Method::PUT => BackendResponse::new(200, HeaderList::new(), ResponseBody::Empty),
                _ => xml_error(405, "MethodNotAllowed"),
            });
        }

        match request.method {
            Method::PUT => {
                let failing = self.fail_put_suffix.lock().unwrap().clone();
                if failing.is_some_and(|suffix| path.ends_with(&suffix)) {
                    return Ok(xml_error(500, "InternalError"));
                }
                let etag = plaintext_etag(&request.body);
                self.objects.lock().unwrap().insert(
                    path,
                    StoredObject {
                        body: request.body,
                        headers: request.headers,
                    },
                );
                let headers: HeaderList = [("ETag", etag)].into_iter().collect();
                Ok(BackendResponse::new(200, headers, ResponseBody::Empty))
            }
            Method::GET => Ok(match self.object(&path) {
                Some(object) => full(200, object.body, "binary/octet-stream"),
                None => xml_error(404, "NoSuchKey"),
            }),
            Method::HEAD => Ok(match self.object(&path) {
                Some(object) => {
                    let headers: HeaderList =
                        [("Content-Length", object.body.len().to_string())].into_iter().collect();
                    BackendResponse::new(200, headers, ResponseBody::Empty)
                }
                None => BackendResponse::new(404, HeaderList::new(), ResponseBody::Empty),
            }),
            Method::DELETE => {
                self.objects.lock().unwrap().remove(&path);
                Ok(BackendResponse::new(204, HeaderList::new(), ResponseBody::Empty))
            }
            _ => Ok(xml_error(405, "MethodNotAllowed")),
        }
    }
}

/// Transit stand-in: the envelope names the key and carries the bytes as JSON
pub struct MemoryTransit {
    healthy: AtomicBool,
    encrypts: AtomicUsize,
}

impl MemoryTransit {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            healthy: AtomicBool::new(true),
            encrypts: AtomicUsize::new(0),
        })
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    pub fn encrypt_calls(&self) -> usize {
        self.encrypts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KeyService for MemoryTransit {
    async fn encrypt(&self, plaintext: &[u8], key: &TransitKeyName) -> Result<String> {
        self.encrypts.fetch_add(1, Ordering::SeqCst);
        let bytes = serde_json::to_string(plaintext).map_err(|e| Error::encryption_failed(key, e))?;
        Ok(format!("vault:v1:{key}:{bytes}"))
    }

    async fn decrypt(&self, ciphertext: &str, key: &TransitKeyName) -> Result<Vec<u8>> {
        let rest = ciphertext
            .strip_prefix("vault:v1:")
            .ok_or_else(|| Error::decryption_failed(key, "not an envelope"))?;
        let (sealed_with, bytes) = rest
            .split_once(':')
            .ok_or_else(|| Error::decryption_failed(key, "truncated envelope"))?;
        if sealed_with != key.as_str() {
            return Err(Error::decryption_failed(key, "wrong key"));
        }
        serde_json::from_str(bytes).map_err(|e| Error::decryption_failed(key, e))
    }

    async fn health_check(&self) -> Result<()> {
        if self.healthy.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(Error::unreachable("vault", "connection refused"))
        }
    }

    fn address(&self) -> String {
        "http://vault.test:8200".to_string()
    }
}

pub fn version() -> VersionInfo {
    VersionInfo {
        version: "1.2.3".to_string(),
        commit: "abc1234".to_string(),
        date: "2024-01-01".to_string(),
        built_by: "tests".to_string(),
    }
}

pub struct Harness {
    pub gateway: Gateway,
    pub backend: Arc<MemoryBackend>,
    pub transit: Arc<MemoryTransit>,
}

pub fn harness(mode: GatewayMode) -> Harness {
    let backend = MemoryBackend::new();
    let transit = MemoryTransit::new();
    let gateway = build_gateway(backend.clone(), transit.clone(), mode, version());
    Harness {
        gateway,
        backend,
        transit,
    }
}

/// Headers of a signed PUT carrying the KMS key
pub fn put_headers(len: usize) -> HeaderList {
    [
        ("Host", "s3.local:9000".to_string()),
        ("X-Amz-Date", "20240101T000000Z".to_string()),
        ("X-Amz-Content-Sha256", "UNSIGNED-PAYLOAD".to_string()),
        (
            "Authorization",
            "AWS4-HMAC-SHA256 Credential=AKID/20240101/us-east-1/s3/aws4_request, SignedHeaders=host;x-amz-date, Signature=abc".to_string(),
        ),
        ("Content-Type", "text/plain".to_string()),
        ("Content-Length", len.to_string()),
        ("X-Amz-Server-Side-Encryption-Aws-Kms-Key-Id", ARN.to_string()),
        ("X-Amz-Meta-Owner", "alice".to_string()),
    ]
    .into_iter()
    .collect()
}
