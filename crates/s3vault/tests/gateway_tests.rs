//! Request-level tests of the gateway over in-memory collaborators

mod common;

use bytes::Bytes;
use common::{harness, put_headers, ARN};
use http::Method;
use s3vault::http::{GatewayResponse, InboundRequest};
use s3vault_core::xml::{from_xml, ErrorResponse, ListBucketResult};
use s3vault_core::{GatewayMode, SidecarRecord};
use s3vault_forward::HeaderList;

const BODY: &[u8] = b"0123456789";
const BODY_ETAG: &str = "\"781e5e245d69b566979b86e28d23f2c7\"";

async fn body(response: GatewayResponse) -> Bytes {
    response.body.collect().await.unwrap()
}

async fn error_code(response: GatewayResponse) -> String {
    let body = body(response).await;
    from_xml::<ErrorResponse>(std::str::from_utf8(&body).unwrap())
        .unwrap()
        .code
}

fn put(path: &str, data: &'static [u8]) -> InboundRequest {
    InboundRequest::new(Method::PUT, path)
        .with_headers(put_headers(data.len()))
        .with_body(data)
}

fn get(method: Method, path: &str) -> InboundRequest {
    let headers: HeaderList = [("Host", "s3.local:9000"), ("Authorization", "AWS4-HMAC-SHA256 x")]
        .into_iter()
        .collect();
    InboundRequest::new(method, path).with_headers(headers)
}

#[tokio::test]
async fn test_put_encrypts_and_writes_sidecar() {
    let h = harness(GatewayMode::Envelope);

    let response = h.gateway.handle(&put("/bucket1/file.txt", BODY)).await;
    assert_eq!(response.status, 200);
    assert_eq!(response.headers.get("ETag"), Some(BODY_ETAG));
    assert_eq!(response.headers.get("x-amz-server-side-encryption"), Some("aws:kms"));
    assert_eq!(
        response.headers.get("x-amz-server-side-encryption-aws-kms-key-id"),
        Some(ARN)
    );

    let primary = h.backend.object("/bucket1/file.txt").unwrap();
    assert!(primary.body.starts_with(b"vault:v1:"));
    assert_eq!(
        primary.headers.get("Content-Length"),
        Some(primary.body.len().to_string().as_str())
    );
    // Header spelling reaches the backend as the client sent it.
    assert_eq!(
        primary.headers.name_of("x-amz-date"),
        Some("X-Amz-Date")
    );

    let sidecar = h.backend.object("/bucket1/file.txt.metadata").unwrap();
    let record: SidecarRecord = serde_json::from_slice(&sidecar.body).unwrap();
    assert_eq!(record.content_length, 10);
    assert_eq!(record.content_type, "text/plain");
    assert_eq!(record.etag, BODY_ETAG);
    assert_eq!(record.kms_key_arn, ARN);
    assert_eq!(record.custom_meta["x-amz-meta-owner"], "alice");
    assert_eq!(sidecar.headers.get("Content-Type"), Some("application/json"));
}

#[tokio::test]
async fn test_get_decrypts_with_record_headers() {
    let h = harness(GatewayMode::Envelope);
    assert_eq!(h.gateway.handle(&put("/bucket1/file.txt", BODY)).await.status, 200);

    let mut request = get(Method::GET, "/bucket1/file.txt");
    request.headers.push("Range", "bytes=0-3");
    let response = h.gateway.handle(&request).await;
    assert_eq!(response.status, 200);
    assert_eq!(response.headers.get("Content-Type"), Some("text/plain"));
    assert_eq!(response.headers.get("ETag"), Some(BODY_ETAG));
    assert_eq!(response.headers.get("x-amz-meta-owner"), Some("alice"));
    assert!(response.headers.get("Last-Modified").is_some_and(|v| v.ends_with("GMT")));
    assert_eq!(&body(response).await[..], BODY);
}

#[tokio::test]
async fn test_listing_hides_sidecars_and_reports_plaintext() {
    let h = harness(GatewayMode::Envelope);
    assert_eq!(h.gateway.handle(&put("/bucket1/file.txt", BODY)).await.status, 200);

    let response = h.gateway.handle(&get(Method::GET, "/bucket1")).await;
    assert_eq!(response.status, 200);
    assert_eq!(response.headers.get("Content-Type"), Some("application/xml"));

    let body = body(response).await;
    let listing: ListBucketResult = from_xml(std::str::from_utf8(&body).unwrap()).unwrap();
    assert_eq!(listing.contents.len(), 1);
    assert_eq!(listing.contents[0].key, "file.txt");
    assert_eq!(listing.contents[0].size, 10);
    assert_eq!(listing.contents[0].etag, BODY_ETAG);
    assert_eq!(listing.key_count, Some(1));
}

#[tokio::test]
async fn test_url_encoded_listing_keys_are_enriched() {
    let h = harness(GatewayMode::Envelope);
    assert_eq!(h.gateway.handle(&put("/bucket1/my%20file.txt", BODY)).await.status, 200);
    assert_eq!(h.gateway.handle(&put("/bucket1/a%2Bb.txt", BODY)).await.status, 200);

    let response = h
        .gateway
        .handle(&get(Method::GET, "/bucket1?list-type=2&encoding-type=url"))
        .await;
    assert_eq!(response.status, 200);
    let text = body(response).await;
    let listing: ListBucketResult = from_xml(std::str::from_utf8(&text).unwrap()).unwrap();
    let keys: Vec<&str> = listing.contents.iter().map(|c| c.key.as_str()).collect();
    assert_eq!(keys, ["a%2Bb.txt", "my+file.txt"]);
    assert!(listing.contents.iter().all(|c| c.size == 10 && c.etag == BODY_ETAG));

    let sidecar_reads: Vec<String> = h
        .backend
        .requests()
        .into_iter()
        .filter(|(method, path)| method == Method::GET && path.ends_with(".metadata"))
        .map(|(_, path)| path)
        .collect();
    assert!(sidecar_reads.contains(&"/bucket1/my file.txt.metadata".to_string()));
    assert!(sidecar_reads.contains(&"/bucket1/a+b.txt.metadata".to_string()));
}

#[tokio::test]
async fn test_listing_without_last_modified_hides_sidecars() {
    let h = harness(GatewayMode::Passthrough);
    h.backend.serve_listing(
        "<ListBucketResult><Name>bucket1</Name><KeyCount>2</KeyCount>\
         <Contents><Key>a.txt</Key><Size>10</Size></Contents>\
         <Contents><Key>a.txt.metadata</Key><Size>120</Size></Contents>\
         </ListBucketResult>",
    );

    let response = h.gateway.handle(&get(Method::GET, "/bucket1")).await;
    assert_eq!(response.status, 200);
    let text = body(response).await;
    let listing: ListBucketResult = from_xml(std::str::from_utf8(&text).unwrap()).unwrap();
    assert_eq!(listing.contents.len(), 1);
    assert_eq!(listing.contents[0].key, "a.txt");
    assert_eq!(listing.key_count, Some(1));
}

#[tokio::test]
async fn test_unparseable_listing_still_hides_sidecars() {
    let h = harness(GatewayMode::Envelope);
    h.backend.serve_listing(
        "<ListBucketResult><Name>bucket1</Name>\
         <Contents><Key>a.txt</Key><LastModified>yesterday</LastModified><Size>70</Size></Contents>\
         <Contents><Key>a.txt.metadata</Key><LastModified>yesterday</LastModified><Size>120</Size></Contents>\
         </ListBucketResult>",
    );

    let response = h.gateway.handle(&get(Method::GET, "/bucket1")).await;
    assert_eq!(response.status, 200);
    let text = String::from_utf8(body(response).await.to_vec()).unwrap();
    assert!(text.contains("<Key>a.txt</Key>"));
    assert!(!text.contains("a.txt.metadata"));
}

#[tokio::test]
async fn test_unmanaged_objects_pass_through() {
    let h = harness(GatewayMode::Envelope);
    h.backend.insert("/bucket1/foreign.bin", "raw bytes");

    let listing = h.gateway.handle(&get(Method::GET, "/bucket1")).await;
    let text = body(listing).await;
    let listing: ListBucketResult = from_xml(std::str::from_utf8(&text).unwrap()).unwrap();
    assert_eq!(listing.contents[0].key, "foreign.bin");
    assert_eq!(listing.contents[0].size, 9);

    let response = h.gateway.handle(&get(Method::GET, "/bucket1/foreign.bin")).await;
    assert_eq!(response.status, 200);
    assert_eq!(&body(response).await[..], b"raw bytes");

    let head = h.gateway.handle(&get(Method::HEAD, "/bucket1/foreign.bin")).await;
    assert_eq!(head.status, 200);
    assert_eq!(head.headers.get("Content-Length"), Some("9"));
}

#[tokio::test]
async fn test_missing_object_relays_backend_error() {
    let h = harness(GatewayMode::Envelope);
    let response = h.gateway.handle(&get(Method::GET, "/bucket1/nothing")).await;
    assert_eq!(response.status, 404);
    assert_eq!(error_code(response).await, "NoSuchKey");
}

#[tokio::test]
async fn test_invalid_arn_is_rejected_before_any_backend_call() {
    let h = harness(GatewayMode::Envelope);
    let mut request = put("/bucket1/file.txt", BODY);
    request
        .headers
        .set("X-Amz-Server-Side-Encryption-Aws-Kms-Key-Id", "arn:aws:s3:::not-a-key");

    let response = h.gateway.handle(&request).await;
    assert_eq!(response.status, 400);
    assert_eq!(error_code(response).await, "InvalidRequest");
    assert!(h.backend.requests().is_empty());
    assert_eq!(h.transit.encrypt_calls(), 0);
}

#[tokio::test]
async fn test_missing_kms_header_is_rejected() {
    let h = harness(GatewayMode::Envelope);
    let mut request = put("/bucket1/file.txt", BODY);
    request.headers.remove("X-Amz-Server-Side-Encryption-Aws-Kms-Key-Id");

    let response = h.gateway.handle(&request).await;
    assert_eq!(response.status, 400);
    assert!(h.backend.requests().is_empty());
}

#[tokio::test]
async fn test_streaming_signature_is_rejected_in_envelope_mode() {
    let h = harness(GatewayMode::Envelope);
    let mut request = put("/bucket1/file.txt", BODY);
    request
        .headers
        .set("X-Amz-Content-Sha256", "STREAMING-AWS4-HMAC-SHA256-PAYLOAD");

    let response = h.gateway.handle(&request).await;
    assert_eq!(response.status, 400);
    assert_eq!(h.transit.encrypt_calls(), 0);
}

#[tokio::test]
async fn test_failed_sidecar_write_removes_primary() {
    let h = harness(GatewayMode::Envelope);
    h.backend.fail_puts_ending_with(".metadata");

    let response = h.gateway.handle(&put("/bucket1/file.txt", BODY)).await;
    assert_eq!(response.status, 500);
    assert_eq!(error_code(response).await, "InternalError");
    assert!(!h.backend.contains("/bucket1/file.txt"));
    assert!(h
        .backend
        .requests()
        .contains(&(Method::DELETE, "/bucket1/file.txt".to_string())));
}

#[tokio::test]
async fn test_primary_write_failure_is_relayed() {
    let h = harness(GatewayMode::Envelope);
    h.backend.fail_puts_ending_with("file.txt");

    let response = h.gateway.handle(&put("/bucket1/file.txt", BODY)).await;
    assert_eq!(response.status, 500);
    assert!(!h.backend.contains("/bucket1/file.txt.metadata"));
}

#[tokio::test]
async fn test_head_reports_plaintext_and_detects_missing_primary() {
    let h = harness(GatewayMode::Envelope);
    assert_eq!(h.gateway.handle(&put("/bucket1/file.txt", BODY)).await.status, 200);

    let head = h.gateway.handle(&get(Method::HEAD, "/bucket1/file.txt")).await;
    assert_eq!(head.status, 200);
    assert_eq!(head.headers.get("Content-Length"), Some("10"));
    assert_eq!(head.headers.get("ETag"), Some(BODY_ETAG));

    // Remove the primary behind the gateway's back; the sidecar stays.
    h.backend.remove("/bucket1/file.txt");

    let head = h.gateway.handle(&get(Method::HEAD, "/bucket1/file.txt")).await;
    assert_eq!(head.status, 404);
    assert_eq!(error_code(head).await, "NoSuchKey");
}

#[tokio::test]
async fn test_delete_removes_object_and_sidecar() {
    let h = harness(GatewayMode::Envelope);
    assert_eq!(h.gateway.handle(&put("/bucket1/file.txt", BODY)).await.status, 200);

    let response = h.gateway.handle(&get(Method::DELETE, "/bucket1/file.txt")).await;
    assert_eq!(response.status, 204);
    assert!(!h.backend.contains("/bucket1/file.txt"));
    assert!(!h.backend.contains("/bucket1/file.txt.metadata"));
}

#[tokio::test]
async fn test_delete_of_unmanaged_object_succeeds() {
    let h = harness(GatewayMode::Envelope);
    h.backend.insert("/bucket1/foreign.bin", "raw");

    let response = h.gateway.handle(&get(Method::DELETE, "/bucket1/foreign.bin")).await;
    assert_eq!(response.status, 204);
    assert!(!h.backend.contains("/bucket1/foreign.bin"));
}

#[tokio::test]
async fn test_passthrough_delete_removes_leftover_sidecar() {
    let h = harness(GatewayMode::Passthrough);
    h.backend.insert("/bucket1/a.txt", "ciphertext");
    h.backend.insert("/bucket1/a.txt.metadata", "{}");

    let response = h.gateway.handle(&get(Method::DELETE, "/bucket1/a.txt")).await;
    assert_eq!(response.status, 204);
    assert!(!h.backend.contains("/bucket1/a.txt"));
    assert!(!h.backend.contains("/bucket1/a.txt.metadata"));
}

#[tokio::test]
async fn test_passthrough_forwards_body_unchanged() {
    let h = harness(GatewayMode::Passthrough);

    let response = h.gateway.handle(&put("/bucket1/file.txt", BODY)).await;
    assert_eq!(response.status, 200);
    assert_eq!(response.headers.get("x-amz-server-side-encryption"), Some("aws:kms"));

    let stored = h.backend.object("/bucket1/file.txt").unwrap();
    assert_eq!(&stored.body[..], BODY);
    assert!(!h.backend.contains("/bucket1/file.txt.metadata"));
    assert_eq!(h.transit.encrypt_calls(), 0);

    let response = h.gateway.handle(&get(Method::GET, "/bucket1/file.txt")).await;
    assert_eq!(&body(response).await[..], BODY);
}

#[tokio::test]
async fn test_passthrough_still_validates_arn() {
    let h = harness(GatewayMode::Passthrough);
    let mut request = put("/bucket1/file.txt", BODY);
    request
        .headers
        .set("X-Amz-Server-Side-Encryption-Aws-Kms-Key-Id", "not-an-arn");

    let response = h.gateway.handle(&request).await;
    assert_eq!(response.status, 400);
    assert!(h.backend.requests().is_empty());
}

#[tokio::test]
async fn test_bucket_operations_are_relayed() {
    let h = harness(GatewayMode::Envelope);

    let buckets = h.gateway.handle(&get(Method::GET, "/")).await;
    assert_eq!(buckets.status, 200);
    assert!(String::from_utf8_lossy(&body(buckets).await).contains("ListAllMyBucketsResult"));

    let created = h.gateway.handle(&get(Method::PUT, "/bucket2")).await;
    assert_eq!(created.status, 200);
}

#[tokio::test]
async fn test_unsupported_method_is_405() {
    let h = harness(GatewayMode::Envelope);
    let response = h.gateway.handle(&get(Method::POST, "/bucket1/file.txt")).await;
    assert_eq!(response.status, 405);
    assert_eq!(error_code(response).await, "MethodNotAllowed");
}

#[tokio::test]
async fn test_health_ready_and_version() {
    let h = harness(GatewayMode::Envelope);

    let health = h.gateway.handle(&get(Method::GET, "/health")).await;
    assert_eq!(health.status, 200);
    let json: serde_json::Value = serde_json::from_slice(&body(health).await).unwrap();
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["vault"], "http://vault.test:8200");
    assert_eq!(json["version"], "1.2.3");

    let ready = h.gateway.handle(&get(Method::GET, "/ready")).await;
    assert_eq!(ready.status, 200);

    h.transit.set_healthy(false);
    let ready = h.gateway.handle(&get(Method::GET, "/ready")).await;
    assert_eq!(ready.status, 503);
    let json: serde_json::Value = serde_json::from_slice(&body(ready).await).unwrap();
    assert_eq!(json["status"], "not ready");
    assert_eq!(json["error"], "vault unreachable");

    let version = h.gateway.handle(&get(Method::GET, "/version")).await;
    let json: serde_json::Value = serde_json::from_slice(&body(version).await).unwrap();
    assert_eq!(json["commit"], "abc1234");
    assert_eq!(json["builtBy"], "tests");
}
