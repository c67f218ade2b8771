//! # s3vault-core
//!
//! Shared types for the S3 Vault gateway:
//! - KMS key ARN validation and transit key name derivation
//! - Sidecar metadata records
//! - S3 XML documents (listings, errors)
//! - Error taxonomy and gateway configuration

pub mod arn;
pub mod config;
pub mod error;
pub mod sidecar;
pub mod xml;

pub use arn::{KmsKeyArn, TransitKeyName, KMS_KEY_HEADER};
pub use config::{GatewayConfig, GatewayMode, SchemePolicy};
pub use error::{Error, Result};
pub use sidecar::SidecarRecord;
