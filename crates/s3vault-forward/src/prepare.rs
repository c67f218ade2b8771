//! Outbound request construction
//!
//! The order of the header rules matters: copy with exact case, drop
//! hop-by-hop and edge headers, force the signed Host, keep the declared
//! Content-Length, then pick the backend scheme.

use crate::endpoint::BackendEndpoint;
use crate::headers::HeaderList;
use crate::policy::{self, Scheme};
use bytes::Bytes;
use http::Method;
use s3vault_core::{Error, Result, SchemePolicy};

/// A request the gateway wants the backend to see
#[derive(Debug, Clone)]
pub struct ForwardRequest {
    pub method: Method,
    /// Path as sent by the client, still percent-encoded
    pub path: String,
    /// Raw query string without the leading `?`
    pub query: Option<String>,
    pub headers: HeaderList,
    pub body: Bytes,
}

impl ForwardRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: None,
            headers: HeaderList::new(),
            body: Bytes::new(),
        }
    }

    pub fn with_headers(mut self, headers: HeaderList) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_query(mut self, query: Option<String>) -> Self {
        self.query = query.filter(|q| !q.is_empty());
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }
}

/// A request ready to be written to the wire
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    pub method: Method,
    /// Endpoint actually dialed, after any scheme upgrade
    pub endpoint: BackendEndpoint,
    pub target: String,
    pub headers: HeaderList,
    pub body: Bytes,
}

impl PreparedRequest {
    pub fn scheme(&self) -> Scheme {
        self.endpoint.scheme()
    }

    pub fn uri(&self) -> String {
        self.endpoint.request_uri(&self.target)
    }
}

fn has_line_break(s: &str) -> bool {
    s.bytes().any(|b| b == b'\r' || b == b'\n' || b == 0)
}

fn ensure_clean(what: &str, value: &str) -> Result<()> {
    if has_line_break(value) {
        return Err(Error::request_build(format!(
            "{what} contains a line break"
        )));
    }
    Ok(())
}

pub fn prepare(
    endpoint: &BackendEndpoint,
    scheme_policy: SchemePolicy,
    request: ForwardRequest,
) -> Result<PreparedRequest> {
    let ForwardRequest {
        method,
        path,
        query,
        headers: inbound,
        body,
    } = request;

    ensure_clean("request path", &path)?;
    if let Some(query) = &query {
        ensure_clean("query string", query)?;
    }
    if path.contains(' ') || query.as_deref().is_some_and(|q| q.contains(' ')) {
        return Err(Error::request_build("request target contains a space"));
    }

    let nominated = policy::connection_nominated(&inbound);
    let original_scheme = policy::original_scheme(&inbound);

    let mut host: Option<(String, String)> = None;
    let mut outbound = HeaderList::with_capacity(inbound.len() + 2);
    for (name, value) in inbound.iter() {
        if name.is_empty() || name.bytes().any(|b| b <= b' ' || b == b':') {
            return Err(Error::request_build(format!("invalid header name {name:?}")));
        }
        ensure_clean(name, value)?;

        if name.eq_ignore_ascii_case("host") {
            if host.is_none() {
                host = Some((name.to_string(), value.to_string()));
            }
            continue;
        }
        if policy::is_denied(name) || nominated.iter().any(|n| n.eq_ignore_ascii_case(name)) {
            continue;
        }
        outbound.push(name, value);
    }

    let effective = if scheme_policy == SchemePolicy::FollowClient
        && endpoint.scheme() == Scheme::Http
        && original_scheme == Scheme::Https
    {
        endpoint.upgraded()
    } else {
        endpoint.clone()
    };

    // The backend must see the Host the client signed, not the endpoint's.
    let (host_name, host_value) =
        host.unwrap_or_else(|| ("Host".to_string(), effective.authority()));
    let mut headers =
        HeaderList::with_capacity(outbound.len() + 2).with_wire_case(inbound.wire_case().clone());
    headers.push(host_name, host_value);
    for (name, value) in outbound {
        headers.push(name, value);
    }

    match headers.get("Content-Length") {
        Some(declared) => {
            let declared: u64 = declared.trim().parse().map_err(|_| {
                Error::request_build(format!("invalid Content-Length {declared:?}"))
            })?;
            if declared != body.len() as u64 {
                return Err(Error::request_build(format!(
                    "Content-Length {declared} does not match body of {} bytes",
                    body.len()
                )));
            }
        }
        None => {
            if !body.is_empty() || method == Method::PUT || method == Method::POST {
                headers.push("Content-Length", body.len().to_string());
            }
        }
    }

    Ok(PreparedRequest {
        target: effective.target(&path, query.as_deref()),
        endpoint: effective,
        method,
        headers,
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint() -> BackendEndpoint {
        BackendEndpoint::parse("http://minio:9000").unwrap()
    }

    fn signed_headers() -> HeaderList {
        [
            ("Host", "s3.example.com"),
            ("X-Amz-Date", "20240101T000000Z"),
            ("x-amz-content-sha256", "UNSIGNED-PAYLOAD"),
            ("Authorization", "AWS4-HMAC-SHA256 Credential=AKIA/20240101/us-east-1/s3/aws4_request"),
            ("Connection", "keep-alive"),
            ("Cf-Ray", "abc123"),
            ("X-Forwarded-For", "10.0.0.1"),
            ("X-Forwarded-Proto", "https"),
            ("X-Scheme", "https"),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_headers_keep_exact_case_and_drop_denied() {
        let request = ForwardRequest::new(Method::GET, "/bucket/key").with_headers(signed_headers());
        let prepared = prepare(&endpoint(), SchemePolicy::Endpoint, request).unwrap();

        let names: Vec<_> = prepared.headers.iter().map(|(n, _)| n).collect();
        assert_eq!(
            names,
            vec!["Host", "X-Amz-Date", "x-amz-content-sha256", "Authorization"]
        );
    }

    #[test]
    fn test_inbound_host_overrides_endpoint() {
        let request = ForwardRequest::new(Method::GET, "/bucket").with_headers(signed_headers());
        let prepared = prepare(&endpoint(), SchemePolicy::Endpoint, request).unwrap();

        assert_eq!(prepared.headers.get("host"), Some("s3.example.com"));
        assert_eq!(prepared.endpoint.host(), "minio");
    }

    #[test]
    fn test_host_spelling_is_preserved() {
        let headers: HeaderList = [("host", "s3.example.com:443")].into_iter().collect();
        let request = ForwardRequest::new(Method::GET, "/").with_headers(headers);
        let prepared = prepare(&endpoint(), SchemePolicy::Endpoint, request).unwrap();

        assert_eq!(prepared.headers.iter().next(), Some(("host", "s3.example.com:443")));
    }

    #[test]
    fn test_missing_host_uses_endpoint_authority() {
        let request = ForwardRequest::new(Method::GET, "/");
        let prepared = prepare(&endpoint(), SchemePolicy::Endpoint, request).unwrap();
        assert_eq!(prepared.headers.get("Host"), Some("minio:9000"));
        assert!(!prepared.headers.contains("Content-Length"));
    }

    #[test]
    fn test_content_length_is_preserved() {
        let headers: HeaderList = [("content-length", "5")].into_iter().collect();
        let request = ForwardRequest::new(Method::PUT, "/b/k")
            .with_headers(headers)
            .with_body(&b"hello"[..]);
        let prepared = prepare(&endpoint(), SchemePolicy::Endpoint, request).unwrap();

        let lengths: Vec<_> = prepared
            .headers
            .iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case("content-length"))
            .collect();
        assert_eq!(lengths, vec![("content-length", "5")]);
    }

    #[test]
    fn test_content_length_mismatch_is_rejected() {
        let headers: HeaderList = [("Content-Length", "7")].into_iter().collect();
        let request = ForwardRequest::new(Method::PUT, "/b/k")
            .with_headers(headers)
            .with_body(&b"hello"[..]);
        let err = prepare(&endpoint(), SchemePolicy::Endpoint, request).unwrap_err();
        assert!(matches!(err, Error::RequestBuildFailed { .. }));
    }

    #[test]
    fn test_empty_put_declares_zero_length() {
        let request = ForwardRequest::new(Method::PUT, "/bucket");
        let prepared = prepare(&endpoint(), SchemePolicy::Endpoint, request).unwrap();
        assert_eq!(prepared.headers.get("Content-Length"), Some("0"));
    }

    #[test]
    fn test_https_client_upgrades_http_endpoint() {
        let request = ForwardRequest::new(Method::GET, "/bucket").with_headers(signed_headers());
        let prepared = prepare(&endpoint(), SchemePolicy::FollowClient, request).unwrap();
        assert_eq!(prepared.scheme(), Scheme::Https);
        assert_eq!(prepared.endpoint.port(), 9000);
        assert!(!prepared.headers.contains("X-Forwarded-Proto"));
    }

    #[test]
    fn test_endpoint_policy_never_upgrades() {
        let request = ForwardRequest::new(Method::GET, "/bucket").with_headers(signed_headers());
        let prepared = prepare(&endpoint(), SchemePolicy::Endpoint, request).unwrap();
        assert_eq!(prepared.scheme(), Scheme::Http);
    }

    #[test]
    fn test_plain_client_keeps_http() {
        let headers: HeaderList = [("X-Forwarded-Proto", "http")].into_iter().collect();
        let request = ForwardRequest::new(Method::GET, "/bucket").with_headers(headers);
        let prepared = prepare(&endpoint(), SchemePolicy::FollowClient, request).unwrap();
        assert_eq!(prepared.scheme(), Scheme::Http);
    }

    #[test]
    fn test_query_is_appended_verbatim() {
        let request = ForwardRequest::new(Method::GET, "/bucket")
            .with_query(Some("list-type=2&prefix=a%2Fb".to_string()));
        let prepared = prepare(&endpoint(), SchemePolicy::Endpoint, request).unwrap();
        assert_eq!(prepared.target, "/bucket?list-type=2&prefix=a%2Fb");
    }

    #[test]
    fn test_line_breaks_are_rejected() {
        let headers: HeaderList = [("X-Evil", "a\r\nInjected: yes")].into_iter().collect();
        let request = ForwardRequest::new(Method::GET, "/b").with_headers(headers);
        assert!(prepare(&endpoint(), SchemePolicy::Endpoint, request).is_err());

        let request = ForwardRequest::new(Method::GET, "/b\r\nX: y");
        assert!(prepare(&endpoint(), SchemePolicy::Endpoint, request).is_err());
    }

    #[test]
    fn test_connection_nominated_headers_are_dropped() {
        let headers: HeaderList = [("Connection", "X-Hop"), ("X-Hop", "1"), ("X-Keep", "2")]
            .into_iter()
            .collect();
        let request = ForwardRequest::new(Method::GET, "/b").with_headers(headers);
        let prepared = prepare(&endpoint(), SchemePolicy::Endpoint, request).unwrap();
        assert!(!prepared.headers.contains("X-Hop"));
        assert_eq!(prepared.headers.get("X-Keep"), Some("2"));
    }
}
