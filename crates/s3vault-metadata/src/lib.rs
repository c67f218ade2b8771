//! # s3vault-metadata
//!
//! Keeps plaintext size, ETag and content type of managed objects in a
//! `<key>.metadata` sidecar next to the ciphertext, and hides those sidecars
//! from listings.

pub mod overlay;
pub mod path;

pub use overlay::{filter_managed, filter_managed_xml, MetadataOverlay};
pub use path::{decode_key, decode_listing_key, encode_key, object_path};
