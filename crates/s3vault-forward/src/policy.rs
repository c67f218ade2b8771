//! Which inbound headers may reach the backend, and the client's original scheme

use crate::headers::HeaderList;
use std::fmt;

/// Connection-management headers that only concern the immediate hop
pub const HOP_BY_HOP_HEADERS: &[&str] = &[
    "Connection",
    "Transfer-Encoding",
    "Upgrade",
    "Proxy-Connection",
    "TE",
    "Trailer",
    "Keep-Alive",
];

/// Metadata injected by edges and CDNs, never signed by the client
pub const EDGE_HEADERS: &[&str] = &["Cf-Visitor", "X-Real-Ip", "X-Request-Id", "Cdn-Loop"];

/// Header families injected by edges and CDNs
pub const EDGE_HEADER_PREFIXES: &[&str] = &["x-forwarded-", "cf-"];

/// Scheme hints that are always stripped once a scheme has been chosen
pub const SCHEME_HINT_HEADERS: &[&str] = &["X-Forwarded-Proto", "X-Forwarded-Scheme", "X-Scheme"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Https => "https",
        }
    }

    pub fn default_port(&self) -> u16 {
        match self {
            Self::Http => 80,
            Self::Https => 443,
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn in_list(list: &[&str], name: &str) -> bool {
    list.iter().any(|h| h.eq_ignore_ascii_case(name))
}

fn has_prefix_ignore_case(name: &str, prefix: &str) -> bool {
    name.len() >= prefix.len()
        && name.as_bytes()[..prefix.len()].eq_ignore_ascii_case(prefix.as_bytes())
}

pub fn is_hop_by_hop(name: &str) -> bool {
    in_list(HOP_BY_HOP_HEADERS, name)
}

pub fn is_edge_header(name: &str) -> bool {
    in_list(EDGE_HEADERS, name)
        || EDGE_HEADER_PREFIXES
            .iter()
            .any(|prefix| has_prefix_ignore_case(name, prefix))
}

pub fn is_scheme_hint(name: &str) -> bool {
    in_list(SCHEME_HINT_HEADERS, name)
}

/// True for headers that must never be forwarded
pub fn is_denied(name: &str) -> bool {
    is_hop_by_hop(name) || is_edge_header(name) || is_scheme_hint(name)
}

/// Extra hop-by-hop names nominated by the `Connection` header
pub fn connection_nominated(headers: &HeaderList) -> Vec<String> {
    headers
        .get_all("Connection")
        .flat_map(|v| v.split(','))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Scheme the client used to reach the outermost edge.
///
/// `Cf-Visitor` carries `{"scheme":"https"}`; `X-Forwarded-Proto` may be a
/// comma-separated chain whose first element is the client-facing hop.
pub fn original_scheme(headers: &HeaderList) -> Scheme {
    if let Some(visitor) = headers.get("Cf-Visitor") {
        let https = match serde_json::from_str::<serde_json::Value>(visitor) {
            Ok(value) => value
                .get("scheme")
                .and_then(|s| s.as_str())
                .is_some_and(|s| s.eq_ignore_ascii_case("https")),
            Err(_) => visitor.contains("\"https\""),
        };
        if https {
            return Scheme::Https;
        }
    }

    let forwarded_https = headers
        .get("X-Forwarded-Proto")
        .and_then(|v| v.split(',').next())
        .is_some_and(|proto| proto.trim().eq_ignore_ascii_case("https"));
    if forwarded_https {
        return Scheme::Https;
    }

    Scheme::Http
}
