//! Error types for the S3 Vault gateway

use thiserror::Error;

/// Result type alias using s3vault-core's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Gateway error taxonomy shared by every component
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed KMS key identifier (client fault)
    #[error("invalid KMS key ARN '{arn}': {reason}")]
    InvalidArn { arn: String, reason: &'static str },

    /// Operation invoked on a client that was never configured
    #[error("{component} client not configured")]
    NotConfigured { component: &'static str },

    /// Network failure, DNS failure or timeout towards the backend or Vault
    #[error("{target} unreachable: {message}")]
    Unreachable { target: String, message: String },

    /// The outbound request could not be assembled
    #[error("failed to build backend request: {message}")]
    RequestBuildFailed { message: String },

    /// Transit encrypt returned an unusable response
    #[error("vault encryption failed for key {key}: {message}")]
    EncryptionFailed { key: String, message: String },

    /// Transit decrypt returned an unusable response
    #[error("vault decryption failed for key {key}: {message}")]
    DecryptionFailed { key: String, message: String },

    /// Sidecar metadata record absent
    #[error("metadata not found for object {bucket}/{key}")]
    NotFound { bucket: String, key: String },

    /// Backend answered 403 on the metadata path
    #[error("access denied reading metadata for {bucket}/{key}: HTTP {status}")]
    AccessDenied {
        bucket: String,
        key: String,
        status: u16,
    },

    /// Backend answered any other non-2xx status on the metadata path
    #[error("metadata operation failed for {bucket}/{key}: HTTP {status}")]
    StoreFailed {
        bucket: String,
        key: String,
        status: u16,
    },

    /// A 2xx sidecar body that does not decode as a metadata record
    #[error("invalid metadata record for {bucket}/{key}: {source}")]
    InvalidMetadata {
        bucket: String,
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// Invalid configuration
    #[error("invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// S3 XML document could not be read or written
    #[error("XML error: {message}")]
    Xml { message: String },

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create an invalid ARN error
    pub fn invalid_arn(arn: impl Into<String>, reason: &'static str) -> Self {
        Self::InvalidArn {
            arn: arn.into(),
            reason,
        }
    }

    /// Create a not configured error
    pub fn not_configured(component: &'static str) -> Self {
        Self::NotConfigured { component }
    }

    /// Create an unreachable error
    pub fn unreachable(target: impl Into<String>, message: impl ToString) -> Self {
        Self::Unreachable {
            target: target.into(),
            message: message.to_string(),
        }
    }

    /// Create a request build error
    pub fn request_build(message: impl Into<String>) -> Self {
        Self::RequestBuildFailed {
            message: message.into(),
        }
    }

    /// Create an encryption failure
    pub fn encryption_failed(key: impl ToString, message: impl ToString) -> Self {
        Self::EncryptionFailed {
            key: key.to_string(),
            message: message.to_string(),
        }
    }

    /// Create a decryption failure
    pub fn decryption_failed(key: impl ToString, message: impl ToString) -> Self {
        Self::DecryptionFailed {
            key: key.to_string(),
            message: message.to_string(),
        }
    }

    /// Create a metadata not found error
    pub fn not_found(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self::NotFound {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// Create an invalid config error
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Create an XML error
    pub fn xml(message: impl ToString) -> Self {
        Self::Xml {
            message: message.to_string(),
        }
    }

    /// True when the sidecar record is simply absent
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// S3 error code reported to clients for this error
    pub fn s3_code(&self) -> &'static str {
        match self {
            Self::InvalidArn { .. } => "InvalidRequest",
            Self::NotFound { .. } => "NoSuchKey",
            Self::AccessDenied { .. } => "AccessDenied",
            Self::Unreachable { .. } => "ServiceUnavailable",
            _ => "InternalError",
        }
    }

    /// HTTP status reported to clients for this error
    pub fn http_status(&self) -> u16 {
        match self {
            Self::InvalidArn { .. } => 400,
            Self::NotFound { .. } => 404,
            Self::AccessDenied { .. } => 403,
            Self::Unreachable { .. } => 503,
            _ => 500,
        }
    }
}
