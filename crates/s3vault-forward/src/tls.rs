//! TLS trust for backend connections
//!
//! System roots are always loaded; an optional PEM bundle adds private CAs on
//! top of them.

use rustls::pki_types::CertificateDer;
use rustls::{ClientConfig, RootCertStore};
use s3vault_core::{Error, Result};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Read every certificate from a PEM file
pub fn load_pem_certificates(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let file = File::open(path)?;
    let certs = rustls_pemfile::certs(&mut BufReader::new(file)).collect::<std::io::Result<Vec<_>>>()?;
    if certs.is_empty() {
        return Err(Error::invalid_config(format!(
            "no PEM certificates found in {}",
            path.display()
        )));
    }
    Ok(certs)
}

fn system_roots() -> RootCertStore {
    let mut roots = RootCertStore::empty();
    let native = rustls_native_certs::load_native_certs();
    for err in &native.errors {
        warn!(error = %err, "failed to load a system trust root");
    }
    let (added, ignored) = roots.add_parsable_certificates(native.certs);
    debug!(added, ignored, "loaded system trust roots");
    roots
}

/// Client configuration trusting the system roots plus `ca_cert_path`.
///
/// A CA file that cannot be read or parsed is logged and skipped so the
/// gateway still starts against publicly trusted endpoints.
pub fn client_config(ca_cert_path: Option<&Path>) -> Result<ClientConfig> {
    let mut roots = system_roots();

    if let Some(path) = ca_cert_path {
        match load_pem_certificates(path) {
            Ok(certs) => {
                let (added, ignored) = roots.add_parsable_certificates(certs);
                info!(
                    ca_path = %path.display(),
                    added,
                    ignored,
                    "configured backend trust with custom CA"
                );
            }
            Err(e) => {
                error!(ca_path = %path.display(), error = %e, "failed to load CA certificate");
            }
        }
    }

    let provider = Arc::new(rustls::crypto::aws_lc_rs::default_provider());
    let config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| Error::invalid_config(format!("TLS configuration: {e}")))?
        .with_root_certificates(roots)
        .with_no_client_auth();

    Ok(config)
}
