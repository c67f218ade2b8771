//! Ordered, case-preserving header multimap
//!
//! Lookups compare names ASCII case-insensitively but never rewrite them.
//! A list read from a hyper message also carries that message's extensions,
//! where hyper records the header-name spelling it received when
//! `preserve_header_case` is on. Handing those extensions to an outgoing
//! message makes hyper write the same spelling back out.

use http::header::{HeaderMap, HeaderName, HeaderValue, ToStrError};
use http::Extensions;
use s3vault_core::{Error, Result};
use std::fmt;

#[derive(Clone, Default)]
pub struct HeaderList {
    entries: Vec<(String, String)>,
    wire_case: Extensions,
}

impl HeaderList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            wire_case: Extensions::new(),
        }
    }

    /// Headers of a message hyper parsed, with the extensions holding the
    /// spelling it recorded
    pub fn from_parts(
        headers: &HeaderMap,
        extensions: Extensions,
    ) -> std::result::Result<Self, ToStrError> {
        let mut list = Self::with_capacity(headers.len());
        for (name, value) in headers {
            list.push(name.as_str(), value.to_str()?);
        }
        list.wire_case = extensions;
        Ok(list)
    }

    /// Extensions to attach to an outgoing message; empty for a hand-built list
    pub fn wire_case(&self) -> &Extensions {
        &self.wire_case
    }

    pub fn with_wire_case(mut self, extensions: Extensions) -> Self {
        self.wire_case = extensions;
        self
    }

    /// Header map for an outgoing hyper message, entries in list order
    pub fn to_header_map(&self) -> Result<HeaderMap> {
        let mut map = HeaderMap::with_capacity(self.entries.len());
        for (name, value) in &self.entries {
            let header = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| Error::request_build(format!("invalid header name {name:?}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|_| Error::request_build(format!("invalid value for header {name}")))?;
            map.append(header, value);
        }
        Ok(map)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append a header, keeping any existing entries with the same name
    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    /// First value for `name`
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Every value for `name`, in order
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.entries
            .iter()
            .filter(move |(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Name of the first entry matching `name`, spelled as stored
    pub fn name_of(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(n, _)| n.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Replace every value for `name` with a single `value`.
    ///
    /// The first existing entry keeps its position and spelling; a new
    /// entry is appended when none exists.
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self
            .entries
            .iter()
            .position(|(n, _)| n.eq_ignore_ascii_case(name))
        {
            Some(index) => {
                self.entries[index].1 = value;
                let mut i = 0;
                self.entries.retain(|(n, _)| {
                    let keep = i <= index || !n.eq_ignore_ascii_case(name);
                    i += 1;
                    keep
                });
            }
            None => self.entries.push((name.to_string(), value)),
        }
    }

    /// Remove every entry for `name`, returning the first value
    pub fn remove(&mut self, name: &str) -> Option<String> {
        let mut first = None;
        self.entries.retain(|(n, v)| {
            if n.eq_ignore_ascii_case(name) {
                if first.is_none() {
                    first = Some(v.clone());
                }
                false
            } else {
                true
            }
        });
        first
    }

    pub fn retain(&mut self, mut keep: impl FnMut(&str, &str) -> bool) {
        self.entries.retain(|(n, v)| keep(n, v));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Declared `Content-Length`, if present and numeric
    pub fn content_length(&self) -> Option<u64> {
        self.get("Content-Length")
            .and_then(|v| v.trim().parse().ok())
    }

    /// Rewrite the length headers for a body that replaces the signed one.
    ///
    /// `Content-MD5` no longer matches the new body and is dropped.
    pub fn replace_body_length(&mut self, length: u64) {
        self.remove("Content-MD5");
        self.set("Content-Length", length.to_string());
    }

    /// True when a comma-separated header carries `token`
    pub fn has_token(&self, name: &str, token: &str) -> bool {
        self.get_all(name)
            .flat_map(|v| v.split(','))
            .any(|t| t.trim().eq_ignore_ascii_case(token))
    }
}

impl PartialEq for HeaderList {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl Eq for HeaderList {}

impl fmt::Debug for HeaderList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (name, value) in &self.entries {
            if name.eq_ignore_ascii_case("authorization") || name.eq_ignore_ascii_case("x-vault-token")
            {
                map.entry(name, &"[REDACTED]");
            } else {
                map.entry(name, value);
            }
        }
        map.finish()
    }
}

impl<N: Into<String>, V: Into<String>> FromIterator<(N, V)> for HeaderList {
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(n, v)| (n.into(), v.into()))
                .collect(),
            wire_case: Extensions::new(),
        }
    }
}

impl IntoIterator for HeaderList {
    type Item = (String, String);
    type IntoIter = std::vec::IntoIter<(String, String)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}
