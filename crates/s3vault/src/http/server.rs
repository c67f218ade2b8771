//! HTTP/1.1 listener
//!
//! Connections are served by hyper with `preserve_header_case`, so each
//! request's headers carry the spelling the client signed on to the backend.

use super::cors;
use super::request::InboundRequest;
use super::response::GatewayResponse;
use crate::router::Gateway;
use bytes::Bytes;
use futures::{FutureExt, TryStreamExt};
use http::{Method, Request, Response, StatusCode, Version};
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Empty, Full, LengthLimitError, Limited, StreamBody};
use hyper::body::{Body, Frame, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::{TokioIo, TokioTimer};
use hyper_util::server::graceful::GracefulShutdown;
use s3vault_core::config::ServerConfig;
use s3vault_forward::{HeaderList, ResponseBody};
use std::convert::Infallible;
use std::error::Error as StdError;
use std::io;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Body type of every response the listener writes
pub type ResponseBytes = UnsyncBoxBody<Bytes, io::Error>;

/// Per-connection limits derived from [`ServerConfig`]
#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub body_limit: usize,
    /// Longest wait for a complete request head
    pub idle_timeout: Duration,
    pub read_timeout: Duration,
    pub shutdown_timeout: Duration,
    /// Value of the `Server` response header
    pub server_name: String,
}

impl ServerSettings {
    pub fn new(config: &ServerConfig, version: &str) -> Self {
        Self {
            body_limit: config.body_limit,
            idle_timeout: config.idle_timeout,
            read_timeout: config.read_timeout,
            shutdown_timeout: config.shutdown_timeout,
            server_name: format!("s3vault/{version}"),
        }
    }
}

/// Accept connections until `shutdown` fires, then give open connections
/// `shutdown_timeout` to finish their current request
pub async fn serve(
    listener: TcpListener,
    gateway: Arc<Gateway>,
    settings: ServerSettings,
    mut shutdown: watch::Receiver<bool>,
) -> io::Result<()> {
    let settings = Arc::new(settings);
    let graceful = GracefulShutdown::new();

    let mut builder = http1::Builder::new();
    builder
        .preserve_header_case(true)
        .keep_alive(true)
        .timer(TokioTimer::new())
        .header_read_timeout(settings.idle_timeout);

    info!(addr = %listener.local_addr()?, "listening");

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, remote)) => {
                    if let Err(e) = stream.set_nodelay(true) {
                        debug!(remote = %remote, error = %e, "failed to set TCP_NODELAY");
                    }

                    let gateway = Arc::clone(&gateway);
                    let conn_settings = Arc::clone(&settings);
                    let service = service_fn(move |request: Request<Incoming>| {
                        let gateway = Arc::clone(&gateway);
                        let settings = Arc::clone(&conn_settings);
                        async move {
                            Ok::<_, Infallible>(handle(request, remote, &gateway, &settings).await)
                        }
                    });

                    let connection =
                        graceful.watch(builder.serve_connection(TokioIo::new(stream), service));
                    tokio::spawn(async move {
                        if let Err(e) = connection.await {
                            log_connection_error(&e, remote);
                        }
                    });
                }
                Err(e) => {
                    warn!(error = %e, "failed to accept connection");
                    // Back off when out of file descriptors.
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            },
            _ = shutdown.changed() => break,
        }
    }

    drop(listener);
    info!("draining connections");
    tokio::select! {
        _ = graceful.shutdown() => info!("all connections closed"),
        _ = tokio::time::sleep(settings.shutdown_timeout) => {
            warn!(
                timeout_secs = settings.shutdown_timeout.as_secs(),
                "shutdown timeout reached, abandoning open connections"
            );
        }
    }
    info!("server stopped");
    Ok(())
}

fn log_connection_error(err: &hyper::Error, remote: SocketAddr) {
    if err.is_incomplete_message() || err.is_closed() || err.is_canceled() {
        debug!(remote = %remote, error = %err, "connection closed mid-message");
    } else if err.is_parse() {
        debug!(remote = %remote, error = %err, "malformed request head");
    } else if err.is_timeout() {
        debug!(remote = %remote, "connection timed out waiting for a request head");
    } else {
        warn!(remote = %remote, error = %err, "connection error");
    }
}

async fn handle(
    request: Request<Incoming>,
    remote: SocketAddr,
    gateway: &Gateway,
    settings: &ServerSettings,
) -> Response<ResponseBytes> {
    let started = Instant::now();
    let (parts, body) = request.into_parts();
    let method = parts.method;
    let path = parts.uri.path().to_string();
    let query = parts.uri.query().filter(|q| !q.is_empty()).map(str::to_string);

    let headers = match HeaderList::from_parts(&parts.headers, parts.extensions) {
        Ok(headers) => headers,
        Err(_) => {
            let response =
                GatewayResponse::s3_error(400, "BadRequest", "Header values must be valid UTF-8");
            return reject(&method, &path, remote, response, settings);
        }
    };
    let keep_alive = wants_keep_alive(parts.version, &headers);

    let body = match read_body(body, &headers, settings).await {
        Ok(body) => body,
        Err(response) => return reject(&method, &path, remote, response, settings),
    };

    let request = InboundRequest {
        method,
        path,
        query,
        headers,
        body,
        remote_addr: Some(remote),
    };

    let mut response = if request.method == Method::OPTIONS {
        cors::preflight()
    } else {
        dispatch(gateway, &request).await
    };
    cors::apply(&mut response);

    info!(
        method = %request.method,
        path = %request.path,
        status = response.status,
        latency_ms = started.elapsed().as_millis() as u64,
        remote = %remote,
        response_bytes = body_length(&response),
        user_agent = request.header("User-Agent").unwrap_or(""),
        auth_present = request.headers.contains("Authorization"),
        kms_key_present = request.headers.contains(s3vault_core::KMS_KEY_HEADER),
        "HTTP request processed"
    );

    into_http(response, &request.method, keep_alive, settings)
}

/// Answer a request that never reached the handlers and close the connection
fn reject(
    method: &Method,
    path: &str,
    remote: SocketAddr,
    response: GatewayResponse,
    settings: &ServerSettings,
) -> Response<ResponseBytes> {
    info!(method = %method, path = %path, status = response.status, remote = %remote, "request rejected");
    into_http(response, method, false, settings)
}

fn wants_keep_alive(version: Version, headers: &HeaderList) -> bool {
    if headers.has_token("Connection", "close") {
        return false;
    }
    version != Version::HTTP_10 || headers.has_token("Connection", "keep-alive")
}

/// Run the handler; a panic becomes a 500 and the connection stays usable
async fn dispatch(gateway: &Gateway, request: &InboundRequest) -> GatewayResponse {
    match AssertUnwindSafe(gateway.handle(request)).catch_unwind().await {
        Ok(response) => response,
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            error!(
                method = %request.method,
                path = %request.path,
                panic = %message,
                "handler panicked"
            );
            GatewayResponse::internal_error("Internal server error")
        }
    }
}

/// Collect the request body within the size and time limits.
///
/// hyper answers `Expect: 100-continue` once the body is first polled, so a
/// declared length over the limit is refused before the client sends it.
async fn read_body<B>(
    body: B,
    headers: &HeaderList,
    settings: &ServerSettings,
) -> Result<Bytes, GatewayResponse>
where
    B: Body<Data = Bytes>,
    B::Error: Into<Box<dyn StdError + Send + Sync>>,
{
    if headers
        .content_length()
        .is_some_and(|length| length > settings.body_limit as u64)
    {
        return Err(too_large(settings.body_limit));
    }

    let read = Limited::new(body, settings.body_limit).collect();
    match tokio::time::timeout(settings.read_timeout, read).await {
        Ok(Ok(collected)) => Ok(collected.to_bytes()),
        Ok(Err(e)) if e.downcast_ref::<LengthLimitError>().is_some() => {
            Err(too_large(settings.body_limit))
        }
        Ok(Err(e)) => Err(GatewayResponse::s3_error(400, "IncompleteBody", e.to_string())),
        Err(_) => Err(GatewayResponse::s3_error(
            408,
            "RequestTimeout",
            "Your socket connection to the server was not read from or written to within the timeout period.",
        )),
    }
}

fn too_large(limit: usize) -> GatewayResponse {
    GatewayResponse::s3_error(
        413,
        "EntityTooLarge",
        format!("Your proposed upload exceeds the maximum allowed size of {limit} bytes"),
    )
}

fn body_length(response: &GatewayResponse) -> Option<u64> {
    match &response.body {
        ResponseBody::Empty => Some(0),
        ResponseBody::Full(bytes) => Some(bytes.len() as u64),
        ResponseBody::Stream(_) => response.headers.content_length(),
    }
}

fn empty() -> ResponseBytes {
    Empty::<Bytes>::new()
        .map_err(|never| match never {})
        .boxed_unsync()
}

/// Turn a handler response into the hyper response written to the client.
///
/// A streamed body keeps the backend's `Content-Length` when it sent one and
/// is chunked otherwise.
pub fn into_http(
    response: GatewayResponse,
    method: &Method,
    keep_alive: bool,
    settings: &ServerSettings,
) -> Response<ResponseBytes> {
    let GatewayResponse {
        status,
        mut headers,
        body,
    } = response;

    headers.set("Server", settings.server_name.clone());
    headers.set("Connection", if keep_alive { "keep-alive" } else { "close" });

    let no_content = status == 204 || status == 304 || status < 200;
    if no_content {
        headers.remove("Content-Length");
    }

    let head = *method == Method::HEAD;
    let body = match body {
        _ if no_content => empty(),
        ResponseBody::Empty => {
            if !head && !headers.contains("Content-Length") {
                headers.set("Content-Length", "0");
            }
            empty()
        }
        ResponseBody::Full(bytes) if head => {
            if !headers.contains("Content-Length") {
                headers.set("Content-Length", bytes.len().to_string());
            }
            empty()
        }
        ResponseBody::Full(bytes) => {
            headers.set("Content-Length", bytes.len().to_string());
            Full::new(bytes).map_err(|never| match never {}).boxed_unsync()
        }
        ResponseBody::Stream(_) if head => empty(),
        ResponseBody::Stream(stream) => {
            let frames = stream
                .into_stream()
                .map_ok(Frame::data)
                .map_err(|e| io::Error::other(e.to_string()));
            StreamBody::new(frames).boxed_unsync()
        }
    };

    let header_map = match headers.to_header_map() {
        Ok(map) => map,
        Err(e) => {
            error!(error = %e, status, "response carries an invalid header");
            let mut response = Response::new(empty());
            *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            return response;
        }
    };

    let mut response = Response::new(body);
    *response.status_mut() = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    *response.headers_mut() = header_map;
    *response.extensions_mut() = headers.wire_case().clone();
    response
}
