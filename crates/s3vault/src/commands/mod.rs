//! CLI command implementations

pub mod resolve_key;
pub mod serve;
pub mod version;
