//! Inbound HTTP/1.1: request and response types, CORS, and the listener

pub mod cors;
pub mod request;
pub mod response;
pub mod server;

pub use request::InboundRequest;
pub use response::{GatewayResponse, JSON_CONTENT_TYPE, XML_CONTENT_TYPE};
pub use server::{serve, ServerSettings};
