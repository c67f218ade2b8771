//! Inbound request as the handlers see it

use bytes::Bytes;
use http::Method;
use s3vault_forward::{ForwardRequest, HeaderList};
use std::net::SocketAddr;

#[derive(Debug, Clone)]
pub struct InboundRequest {
    pub method: Method,
    /// Path exactly as received, still percent-encoded
    pub path: String,
    /// Raw query string without the leading `?`
    pub query: Option<String>,
    /// Headers in arrival order with their original spelling
    pub headers: HeaderList,
    pub body: Bytes,
    pub remote_addr: Option<SocketAddr>,
}

impl InboundRequest {
    pub fn new(method: Method, target: &str) -> Self {
        let (path, query) = split_target(target);
        Self {
            method,
            path,
            query,
            headers: HeaderList::new(),
            body: Bytes::new(),
            remote_addr: None,
        }
    }

    pub fn with_headers(mut self, headers: HeaderList) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// The request as received, for verbatim forwarding
    pub fn to_forward(&self) -> ForwardRequest {
        ForwardRequest::new(self.method.clone(), self.path.clone())
            .with_query(self.query.clone())
            .with_headers(self.headers.clone())
            .with_body(self.body.clone())
    }
}

/// Split a request target into path and query; absolute-form targets are
/// reduced to their path
pub fn split_target(target: &str) -> (String, Option<String>) {
    let target = match target.find("://") {
        Some(scheme_end) => {
            let rest = &target[scheme_end + 3..];
            rest.find('/').map(|i| &rest[i..]).unwrap_or("/")
        }
        None => target,
    };

    match target.split_once('?') {
        Some((path, query)) => (
            path.to_string(),
            (!query.is_empty()).then(|| query.to_string()),
        ),
        None => (target.to_string(), None),
    }
}
