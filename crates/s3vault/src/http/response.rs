//! Responses produced by the handlers

use bytes::Bytes;
use s3vault_core::xml::{to_xml, ErrorResponse};
use s3vault_core::Error;
use s3vault_forward::policy::is_hop_by_hop;
use s3vault_forward::{BackendResponse, HeaderList, ResponseBody};
use serde::Serialize;
use std::fmt;
use tracing::error;

pub const XML_CONTENT_TYPE: &str = "application/xml";
pub const JSON_CONTENT_TYPE: &str = "application/json";

pub struct GatewayResponse {
    pub status: u16,
    pub headers: HeaderList,
    pub body: ResponseBody,
}

impl GatewayResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: HeaderList::new(),
            body: ResponseBody::Empty,
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.set(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = ResponseBody::Full(body.into());
        self
    }

    /// An S3 `Error` document
    pub fn s3_error(status: u16, code: &str, message: impl Into<String>) -> Self {
        xml_document(status, &ErrorResponse::new(code, message))
    }

    /// The S3 error document for a gateway error
    pub fn from_error(err: &Error) -> Self {
        xml_document(err.http_status(), &ErrorResponse::from_error(err))
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::s3_error(500, "InternalError", message)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::s3_error(400, "InvalidRequest", message)
    }

    pub fn xml<T: Serialize>(status: u16, document: &T) -> Self {
        xml_document(status, document)
    }

    pub fn json<T: Serialize>(status: u16, value: &T) -> Self {
        match serde_json::to_vec(value) {
            Ok(body) => Self::new(status)
                .with_header("Content-Type", JSON_CONTENT_TYPE)
                .with_body(body),
            Err(e) => {
                error!(error = %e, "failed to serialize JSON response");
                Self::internal_error("failed to serialize response")
            }
        }
    }

    /// Relay a backend response: status and body unchanged, hop-by-hop
    /// headers dropped since the listener frames the body itself
    pub fn relay(response: BackendResponse) -> Self {
        let mut headers = response.headers;
        headers.retain(|name, _| !is_hop_by_hop(name));
        Self {
            status: response.status,
            headers,
            body: response.body,
        }
    }
}

impl fmt::Debug for GatewayResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("body", &self.body)
            .finish()
    }
}

fn xml_document<T: Serialize>(status: u16, document: &T) -> GatewayResponse {
    match to_xml(document) {
        Ok(body) => GatewayResponse::new(status)
            .with_header("Content-Type", XML_CONTENT_TYPE)
            .with_body(body),
        Err(e) => {
            error!(error = %e, "failed to serialize XML response");
            GatewayResponse::new(500)
                .with_header("Content-Type", XML_CONTENT_TYPE)
                .with_body(
                    "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<Error><Code>InternalError</Code><Message>failed to serialize response</Message></Error>",
                )
        }
    }
}
