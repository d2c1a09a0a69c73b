//! Call metadata: an ordered multimap with append-only semantics.

use axum::http::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CONTENT_LENGTH, CONTENT_TYPE, HOST};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;

use super::{is_binary_header, HeaderError, BIN_SUFFIX, HEADER_TIMEOUT, HOST_METADATA_KEY};

/// Headers owned by the protocol; never copied from outgoing metadata.
const RESERVED_PREFIX: &str = "x-prpc-";

/// Ordered string → values multimap. Keys are lower case.
///
/// Values are raw bytes; for `-bin` keys they are the decoded payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    entries: Vec<(String, Vec<Bytes>)>,
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a value after any existing values for `key`.
    pub fn append(&mut self, key: impl AsRef<str>, value: impl Into<Bytes>) {
        let key = key.as_ref().to_ascii_lowercase();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, values)) => values.push(value),
            None => self.entries.push((key, vec![value])),
        }
    }

    /// Appends every entry of `other`, keeping existing values first.
    pub fn extend(&mut self, other: Metadata) {
        for (key, values) in other.entries {
            for value in values {
                self.append(&key, value);
            }
        }
    }

    /// First value for `key`.
    pub fn get(&self, key: &str) -> Option<&Bytes> {
        self.get_all(key).first()
    }

    /// First value for `key` as UTF-8.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(|v| std::str::from_utf8(v).ok())
    }

    /// All values for `key`, in insertion order.
    pub fn get_all(&self, key: &str) -> &[Bytes] {
        let key = key.to_ascii_lowercase();
        self.entries
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, values)| values.as_slice())
            .unwrap_or(&[])
    }

    pub fn contains_key(&self, key: &str) -> bool {
        !self.get_all(key).is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Bytes])> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Folds inbound request headers into `metadata`.
///
/// Content-Type, Accept and the timeout header are consumed elsewhere and
/// skipped. `-bin` values are base64-decoded. The Host header (or the
/// request target's authority) lands under the `host` key.
pub fn fold_request_headers(
    headers: &HeaderMap,
    authority: Option<&str>,
    metadata: &mut Metadata,
) -> Result<(), HeaderError> {
    for (name, value) in headers {
        let key = name.as_str();
        if *name == CONTENT_TYPE || *name == ACCEPT || *name == HOST || key == HEADER_TIMEOUT {
            continue;
        }
        append_header(metadata, key, value)?;
    }

    let host = headers
        .get(HOST)
        .map(|h| Bytes::copy_from_slice(h.as_bytes()))
        .or_else(|| authority.map(|a| Bytes::copy_from_slice(a.as_bytes())));
    if let Some(host) = host {
        metadata.append(HOST_METADATA_KEY, host);
    }
    Ok(())
}

/// Folds response headers into `metadata`, skipping protocol headers.
pub fn fold_response_headers(headers: &HeaderMap, metadata: &mut Metadata) -> Result<(), HeaderError> {
    for (name, value) in headers {
        let key = name.as_str();
        if is_reserved(key) {
            continue;
        }
        append_header(metadata, key, value)?;
    }
    Ok(())
}

/// Writes outgoing metadata as request headers.
///
/// Keys ending in `-bin` are base64-encoded. Keys holding values that are
/// not printable ASCII get the `-bin` suffix added.
pub fn write_metadata(metadata: &Metadata, headers: &mut HeaderMap) -> Result<(), HeaderError> {
    for (key, values) in metadata.iter() {
        if is_reserved(key) {
            continue;
        }

        let binary = is_binary_header(key);
        let needs_suffix = !binary && !values.iter().all(|v| is_printable(v));
        let header_key = if needs_suffix {
            format!("{key}{BIN_SUFFIX}")
        } else {
            key.to_string()
        };
        let name = HeaderName::from_bytes(header_key.as_bytes())
            .map_err(|e| HeaderError::new(&header_key, e.to_string()))?;

        for value in values {
            let value = if binary || needs_suffix {
                HeaderValue::try_from(STANDARD.encode(value))
            } else {
                HeaderValue::from_bytes(value)
            }
            .map_err(|e| HeaderError::new(&header_key, e.to_string()))?;
            headers.append(name.clone(), value);
        }
    }
    Ok(())
}

fn append_header(metadata: &mut Metadata, key: &str, value: &HeaderValue) -> Result<(), HeaderError> {
    if is_binary_header(key) {
        let decoded = STANDARD
            .decode(value.as_bytes())
            .map_err(|e| HeaderError::new(key, e.to_string()))?;
        metadata.append(key, decoded);
    } else {
        metadata.append(key, Bytes::copy_from_slice(value.as_bytes()));
    }
    Ok(())
}

fn is_reserved(key: &str) -> bool {
    key.starts_with(RESERVED_PREFIX)
        || key == HOST_METADATA_KEY
        || key == CONTENT_TYPE.as_str()
        || key == ACCEPT.as_str()
        || key == CONTENT_LENGTH.as_str()
}

fn is_printable(value: &[u8]) -> bool {
    value.iter().all(|b| (0x20..0x7f).contains(b) || *b == b'\t')
}
