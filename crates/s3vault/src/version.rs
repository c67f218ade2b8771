//! Version information for the s3vault gateway

use s3vault_core::config::BuildInfo;
use serde::{Deserialize, Serialize};

/// Version information reported by `/version` and `s3vault version`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo {
    pub version: String,
    pub commit: String,
    pub date: String,
    #[serde(rename = "builtBy")]
    pub built_by: String,
}

impl VersionInfo {
    /// Build info with the crate version standing in for an unset `VERSION`
    pub fn from_build(build: &BuildInfo) -> Self {
        let version = if build.version.is_empty() || build.version == "dev" {
            env!("CARGO_PKG_VERSION").to_string()
        } else {
            build.version.clone()
        };
        Self {
            version,
            commit: build.commit.clone(),
            date: build.date.clone(),
            built_by: build.built_by.clone(),
        }
    }

    pub fn display(&self) -> String {
        let mut line = format!("s3vault {}", self.version);
        if self.commit != "none" && !self.commit.is_empty() {
            line.push_str(&format!(" ({})", self.commit));
        }
        line
    }
}

impl std::fmt::Display for VersionInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display())
    }
}
