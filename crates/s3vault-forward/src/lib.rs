//! # s3vault-forward
//!
//! Forwards S3 requests to the backend without disturbing their signatures:
//! - Ordered header list that keeps the client's header-name spelling
//! - Hop-by-hop and edge header filtering, original scheme detection
//! - Pooled hyper client over TCP or TLS

pub mod client;
pub mod endpoint;
pub mod headers;
pub mod policy;
pub mod prepare;
pub mod tls;

pub use client::{Backend, BackendClient, BackendResponse, BodyStream, PoolConfig, ResponseBody};
pub use endpoint::BackendEndpoint;
pub use headers::HeaderList;
pub use policy::Scheme;
pub use prepare::{prepare, ForwardRequest, PreparedRequest};
