//! KMS key ARNs and the transit key names derived from them
//!
//! A client names its key as `arn:aws:kms:<region>:<account>:key/<uuid>`.
//! The transit engine addresses the same key as `<region>_<account>_<uuid>`
//! because colons and slashes are not valid in transit key names.

use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// Literal prefix every accepted key ARN starts with
pub const KMS_ARN_PREFIX: &str = "arn:aws:kms:";

/// Header clients use to declare the per-object key
pub const KMS_KEY_HEADER: &str = "X-Amz-Server-Side-Encryption-Aws-Kms-Key-Id";

/// A validated KMS key ARN
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KmsKeyArn {
    raw: String,
    region: String,
    account: String,
    key_id: String,
}

impl KmsKeyArn {
    /// Parse and validate an ARN. Never returns a partially valid value.
    pub fn parse(arn: &str) -> Result<Self> {
        if arn.is_empty() {
            return Err(Error::invalid_arn(arn, "KMS key ARN is required"));
        }

        if !arn.starts_with(KMS_ARN_PREFIX) {
            return Err(Error::invalid_arn(arn, "invalid KMS ARN format"));
        }

        let parts: Vec<&str> = arn.split(':').collect();
        if parts.len() != 6 {
            return Err(Error::invalid_arn(
                arn,
                "invalid KMS ARN format, expected 6 parts",
            ));
        }

        let key_parts: Vec<&str> = parts[5].split('/').collect();
        if key_parts.len() != 2 || key_parts[0] != "key" {
            return Err(Error::invalid_arn(
                arn,
                "invalid KMS ARN key format, expected 'key/uuid'",
            ));
        }

        let (region, account, key_id) = (parts[3], parts[4], key_parts[1]);
        if region.is_empty() || account.is_empty() || key_id.is_empty() {
            return Err(Error::invalid_arn(
                arn,
                "missing required ARN components (region/account/key)",
            ));
        }

        Ok(Self {
            raw: arn.to_string(),
            region: region.to_string(),
            account: account.to_string(),
            key_id: key_id.to_string(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// The transit key this ARN maps to
    pub fn transit_key(&self) -> TransitKeyName {
        TransitKeyName(format!("{}_{}_{}", self.region, self.account, self.key_id))
    }
}

impl FromStr for KmsKeyArn {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for KmsKeyArn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Name of a key inside the transit engine
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TransitKeyName(String);

impl TransitKeyName {
    /// Validate `arn` and derive its transit key name
    pub fn from_arn(arn: &str) -> Result<Self> {
        KmsKeyArn::parse(arn).map(|arn| arn.transit_key())
    }

    /// Wrap an already-derived name, used by tests and diagnostics
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransitKeyName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for TransitKeyName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
