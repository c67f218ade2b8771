//! Pooled backend client
//!
//! Built on hyper-util's pooled client over an https-or-http rustls
//! connector. Outgoing requests carry the extensions of the inbound request,
//! so hyper writes header names with the spelling the client signed.

use crate::endpoint::BackendEndpoint;
use crate::headers::HeaderList;
use crate::prepare::{prepare, ForwardRequest, PreparedRequest};
use crate::tls;
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::Stream;
use http::Method;
use http_body_util::{BodyExt, Full, Limited};
use hyper::body::{Body, Incoming};
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::{TokioExecutor, TokioTimer};
use s3vault_core::config::BackendConfig;
use s3vault_core::{Error, Result, SchemePolicy};
use std::error::Error as StdError;
use std::fmt;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

type HttpsClient = Client<HttpsConnector<HttpConnector>, Full<Bytes>>;

/// Error bodies larger than this are not buffered
const MAX_ERROR_BODY: usize = 8 * 1024 * 1024;

/// Part of an error body included in the warning log
const LOGGED_ERROR_BODY: usize = 1024;

/// Capability the gateway needs from the S3 backend
#[async_trait]
pub trait Backend: Send + Sync {
    /// Send `request` to the backend and return its response unmodified
    async fn forward(&self, request: ForwardRequest) -> Result<BackendResponse>;

    /// HEAD `/<bucket>/<key>`; `key` is already in path form
    async fn head_object(
        &self,
        bucket: &str,
        key: &str,
        headers: &HeaderList,
    ) -> Result<BackendResponse> {
        let request =
            ForwardRequest::new(Method::HEAD, format!("/{bucket}/{key}")).with_headers(headers.clone());
        self.forward(request).await
    }
}

/// Backend response: status and headers as received, body buffered or streamed
#[derive(Debug)]
pub struct BackendResponse {
    pub status: u16,
    pub headers: HeaderList,
    pub body: ResponseBody,
}

impl BackendResponse {
    pub fn new(status: u16, headers: HeaderList, body: ResponseBody) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

pub enum ResponseBody {
    Empty,
    /// Fully buffered; always the case for error responses
    Full(Bytes),
    Stream(BodyStream),
}

impl ResponseBody {
    pub async fn collect(self) -> Result<Bytes> {
        match self {
            Self::Empty => Ok(Bytes::new()),
            Self::Full(bytes) => Ok(bytes),
            Self::Stream(stream) => stream.collect().await,
        }
    }
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "Empty"),
            Self::Full(bytes) => write!(f, "Full({} bytes)", bytes.len()),
            Self::Stream(_) => write!(f, "Stream"),
        }
    }
}

/// Success body read from the backend as it arrives.
///
/// Reads share the deadline of the request that produced them. The
/// connection returns to the pool once the body has been read to the end.
pub struct BodyStream {
    body: Incoming,
    deadline: Instant,
    target: String,
}

impl BodyStream {
    pub async fn next_chunk(&mut self) -> Result<Option<Bytes>> {
        loop {
            let frame = tokio::time::timeout_at(self.deadline, self.body.frame())
                .await
                .map_err(|_| Error::unreachable(&self.target, "response body timed out"))?;
            match frame {
                None => return Ok(None),
                Some(Ok(frame)) => {
                    // Trailers carry nothing the gateway relays.
                    if let Ok(data) = frame.into_data() {
                        return Ok(Some(data));
                    }
                }
                Some(Err(e)) => return Err(Error::unreachable(&self.target, e)),
            }
        }
    }

    pub async fn collect(mut self) -> Result<Bytes> {
        let mut body = BytesMut::new();
        while let Some(chunk) = self.next_chunk().await? {
            body.extend_from_slice(&chunk);
        }
        Ok(body.freeze())
    }

    /// Remaining chunks as a stream that ends after the first error
    pub fn into_stream(self) -> impl Stream<Item = Result<Bytes>> + Send {
        futures::stream::unfold(Some(self), |state| async move {
            let mut stream = state?;
            match stream.next_chunk().await {
                Ok(Some(chunk)) => Some((Ok(chunk), Some(stream))),
                Ok(None) => None,
                Err(e) => Some((Err(e), None)),
            }
        })
    }
}

/// Connection pool settings for the backend client
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Idle connections kept per backend host. The backend is a single
    /// host, so this also bounds the whole pool.
    pub max_idle_per_host: usize,
    pub idle_timeout: Duration,
    pub connect_timeout: Duration,
    /// Interval of TCP keepalive probes on pooled sockets
    pub tcp_keepalive: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_idle_per_host: 10,
            idle_timeout: Duration::from_secs(90),
            connect_timeout: Duration::from_secs(10),
            tcp_keepalive: Duration::from_secs(60),
        }
    }
}

fn build_client(tls_config: rustls::ClientConfig, pool: &PoolConfig) -> HttpsClient {
    let mut connector = HttpConnector::new();
    connector.set_connect_timeout(Some(pool.connect_timeout));
    connector.set_keepalive(Some(pool.tcp_keepalive));
    connector.set_nodelay(true);
    connector.enforce_http(false);

    let connector = HttpsConnectorBuilder::new()
        .with_tls_config(tls_config)
        .https_or_http()
        .enable_http1()
        .wrap_connector(connector);

    Client::builder(TokioExecutor::new())
        .pool_idle_timeout(pool.idle_timeout)
        .pool_max_idle_per_host(pool.max_idle_per_host)
        .pool_timer(TokioTimer::new())
        .http1_preserve_header_case(true)
        .build(connector)
}

fn build_request(prepared: PreparedRequest) -> Result<http::Request<Full<Bytes>>> {
    let uri: http::Uri = prepared.uri().parse().map_err(|e| {
        Error::request_build(format!("invalid request target {}: {e}", prepared.target))
    })?;
    let headers = prepared.headers.to_header_map()?;

    let mut request = http::Request::builder()
        .method(prepared.method)
        .uri(uri)
        .body(Full::new(prepared.body))
        .map_err(|e| Error::request_build(e.to_string()))?;
    *request.headers_mut() = headers;
    *request.extensions_mut() = prepared.headers.wire_case().clone();
    Ok(request)
}

/// Error text including the causes hyper-util keeps in the source chain
fn describe(err: &(dyn StdError + 'static)) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

/// Client for the single configured backend
pub struct BackendClient {
    endpoint: BackendEndpoint,
    scheme_policy: SchemePolicy,
    timeout: Duration,
    client: RwLock<Option<HttpsClient>>,
}

impl BackendClient {
    pub fn new(config: &BackendConfig) -> Result<Self> {
        Self::with_pool_config(config, PoolConfig::default())
    }

    pub fn with_pool_config(config: &BackendConfig, pool: PoolConfig) -> Result<Self> {
        let endpoint = BackendEndpoint::parse(&config.endpoint)?;
        let tls_config = tls::client_config(config.ca_cert_path.as_deref())?;

        info!(
            endpoint = %endpoint.url(),
            scheme_policy = %config.scheme_policy,
            timeout_secs = config.timeout.as_secs(),
            max_idle_per_host = pool.max_idle_per_host,
            idle_timeout_secs = pool.idle_timeout.as_secs(),
            "initialized S3 backend client"
        );

        Ok(Self {
            endpoint,
            scheme_policy: config.scheme_policy,
            timeout: config.timeout,
            client: RwLock::new(Some(build_client(tls_config, &pool))),
        })
    }

    pub fn endpoint(&self) -> &BackendEndpoint {
        &self.endpoint
    }

    /// Drop the connection pool. Idle connections close now, in-flight ones
    /// once their response is done; later requests fail as unreachable.
    pub fn close(&self) {
        let released = self
            .client
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        debug!(released = released.is_some(), "closed backend connection pool");
    }

    async fn execute(&self, prepared: PreparedRequest) -> Result<BackendResponse> {
        let deadline = Instant::now() + self.timeout;
        let authority = format!("{}://{}", prepared.scheme(), prepared.endpoint.authority());
        let timed_out = || {
            Error::unreachable(
                &authority,
                format!("request timed out after {}s", self.timeout.as_secs()),
            )
        };

        let client = self
            .client
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| Error::unreachable(&authority, "backend client is closed"))?;

        debug!(
            method = %prepared.method,
            target = %prepared.target,
            backend = %authority,
            host = prepared.headers.get("Host").unwrap_or_default(),
            header_count = prepared.headers.len(),
            has_authorization = prepared.headers.contains("Authorization"),
            "forwarding request to S3 backend"
        );

        let method = prepared.method.clone();
        let target = prepared.target.clone();
        let request = build_request(prepared)?;

        let response = tokio::time::timeout_at(deadline, client.request(request))
            .await
            .map_err(|_| timed_out())?
            .map_err(|e| Error::unreachable(&authority, describe(&e)))?;

        let (parts, body) = response.into_parts();
        let status = parts.status.as_u16();
        let headers = HeaderList::from_parts(&parts.headers, parts.extensions)
            .map_err(|e| Error::unreachable(&authority, format!("invalid response header: {e}")))?;

        if body.is_end_stream() {
            debug!(status, method = %method, "S3 response received");
            return Ok(BackendResponse::new(status, headers, ResponseBody::Empty));
        }

        if status >= 400 {
            let collected =
                tokio::time::timeout_at(deadline, Limited::new(body, MAX_ERROR_BODY).collect())
                    .await
                    .map_err(|_| timed_out())?
                    .map_err(|e| {
                        Error::unreachable(&authority, format!("reading error body: {e}"))
                    })?;
            let body = collected.to_bytes();

            let preview = &body[..body.len().min(LOGGED_ERROR_BODY)];
            warn!(
                status_code = status,
                method = %method,
                target = %target,
                error_body = %String::from_utf8_lossy(preview),
                "S3 error response"
            );
            return Ok(BackendResponse::new(status, headers, ResponseBody::Full(body)));
        }

        debug!(status, method = %method, "S3 response received");
        Ok(BackendResponse::new(
            status,
            headers,
            ResponseBody::Stream(BodyStream {
                body,
                deadline,
                target: authority,
            }),
        ))
    }
}

#[async_trait]
impl Backend for BackendClient {
    async fn forward(&self, request: ForwardRequest) -> Result<BackendResponse> {
        let prepared = prepare(&self.endpoint, self.scheme_policy, request)?;
        self.execute(prepared).await
    }
}

impl fmt::Debug for BackendClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendClient")
            .field("endpoint", &self.endpoint.url())
            .field("scheme_policy", &self.scheme_policy)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
