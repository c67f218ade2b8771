//! Object key <-> request path conversion

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use std::borrow::Cow;

/// Everything except RFC 3986 unreserved characters and `/`
const KEY_PATH: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'/');

/// Percent-encode an object key for use in a request path
pub fn encode_key(key: &str) -> Cow<'_, str> {
    utf8_percent_encode(key, KEY_PATH).into()
}

/// Decode a percent-encoded key; invalid UTF-8 is replaced
pub fn decode_key(raw: &str) -> Cow<'_, str> {
    percent_decode_str(raw).decode_utf8_lossy()
}

/// Decode a key from a listing sent with `EncodingType=url`.
///
/// S3 form-encodes these keys: a space arrives as `+`, a literal plus as `%2B`.
pub fn decode_listing_key(raw: &str) -> Cow<'_, str> {
    if raw.contains('+') {
        Cow::Owned(decode_key(&raw.replace('+', " ")).into_owned())
    } else {
        decode_key(raw)
    }
}

/// `/<bucket>/<key>` with the key encoded
pub fn object_path(bucket: &str, key: &str) -> String {
    format!("/{bucket}/{}", encode_key(key))
}
