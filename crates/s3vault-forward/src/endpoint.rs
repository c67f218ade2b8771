//! The fixed S3 backend endpoint

use crate::policy::Scheme;
use s3vault_core::{Error, Result};
use url::{Host, Url};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendEndpoint {
    scheme: Scheme,
    /// Host as used for connecting (no IPv6 brackets)
    host: String,
    /// Host as written in an authority (IPv6 bracketed)
    authority_host: String,
    explicit_port: Option<u16>,
    base_path: String,
}

impl BackendEndpoint {
    pub fn parse(endpoint: &str) -> Result<Self> {
        let url = Url::parse(endpoint.trim()).map_err(|e| {
            Error::invalid_config(format!("invalid S3 endpoint '{endpoint}': {e}"))
        })?;

        let scheme = match url.scheme() {
            "http" => Scheme::Http,
            "https" => Scheme::Https,
            other => {
                return Err(Error::invalid_config(format!(
                    "unsupported S3 endpoint scheme '{other}'"
                )))
            }
        };

        let (host, authority_host) = match url.host() {
            Some(Host::Ipv6(addr)) => (addr.to_string(), format!("[{addr}]")),
            Some(Host::Ipv4(addr)) => (addr.to_string(), addr.to_string()),
            Some(Host::Domain(domain)) => (domain.to_string(), domain.to_string()),
            None => {
                return Err(Error::invalid_config(format!(
                    "S3 endpoint '{endpoint}' has no host"
                )))
            }
        };

        Ok(Self {
            scheme,
            host,
            authority_host,
            explicit_port: url.port(),
            base_path: url.path().trim_end_matches('/').to_string(),
        })
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Port to connect to
    pub fn port(&self) -> u16 {
        self.explicit_port
            .unwrap_or_else(|| self.scheme.default_port())
    }

    /// `host[:port]` as it would appear in a `Host` header
    pub fn authority(&self) -> String {
        match self.explicit_port {
            Some(port) => format!("{}:{port}", self.authority_host),
            None => self.authority_host.clone(),
        }
    }

    /// Same host over https. An explicit port is kept.
    pub fn upgraded(&self) -> Self {
        Self {
            scheme: Scheme::Https,
            ..self.clone()
        }
    }

    /// Request target for `path` and an optional raw query string
    pub fn target(&self, path: &str, query: Option<&str>) -> String {
        let mut target = String::with_capacity(self.base_path.len() + path.len() + 1);
        target.push_str(&self.base_path);
        if !path.starts_with('/') {
            target.push('/');
        }
        target.push_str(path);
        if let Some(query) = query.filter(|q| !q.is_empty()) {
            target.push('?');
            target.push_str(query);
        }
        target
    }

    /// Absolute URI for a request target, used to dial the endpoint
    pub fn request_uri(&self, target: &str) -> String {
        format!("{}://{}{}", self.scheme, self.authority(), target)
    }

    pub fn url(&self) -> String {
        format!("{}://{}{}", self.scheme, self.authority(), self.base_path)
    }
}
