//! Cross-origin headers for browser-based S3 clients

use super::GatewayResponse;

pub const ALLOW_ORIGIN: &str = "*";
pub const ALLOW_METHODS: &str = "GET, POST, PUT, DELETE, HEAD, OPTIONS";
pub const ALLOW_HEADERS: &str =
    "Origin, Content-Type, Accept, Authorization, X-Amz-Date, X-Amz-Content-Sha256, X-Amz-Security-Token";

/// Preflight answers are cached for 24 hours
pub const MAX_AGE_SECS: u32 = 86_400;

/// Answer to an `OPTIONS` preflight
pub fn preflight() -> GatewayResponse {
    GatewayResponse::new(204)
        .with_header("Access-Control-Allow-Origin", ALLOW_ORIGIN)
        .with_header("Access-Control-Allow-Methods", ALLOW_METHODS)
        .with_header("Access-Control-Allow-Headers", ALLOW_HEADERS)
        .with_header("Access-Control-Max-Age", MAX_AGE_SECS.to_string())
        .with_header("Vary", "Origin")
}

/// Mark a response as readable from any origin
pub fn apply(response: &mut GatewayResponse) {
    response
        .headers
        .set("Access-Control-Allow-Origin", ALLOW_ORIGIN);
}
