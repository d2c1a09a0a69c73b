//! Wire format model and media type negotiation.
//!
//! # Data Flow
//! ```text
//! Content-Type header
//!     → negotiate.rs (parse media type)
//!     → MediaType registry (this file)
//!     → request Format
//!
//! Accept header
//!     → negotiate.rs (split media ranges, read q=)
//!     → MediaType registry
//!     → max quality, tie-break BINARY > JSONPB > TEXT
//!     → response Format
//! ```
//!
//! # Design Decisions
//! - `Format` is a closed enum; its preference rank is explicit, not
//!   derived from iteration order
//! - Wildcards mean "the default format", never "any format"
//! - The registry is a pure function over static strings: no shared state

pub mod negotiate;

use std::collections::HashMap;
use std::fmt;

use axum::http::StatusCode;
use thiserror::Error;

pub use negotiate::{parse_media_type, select_request_format, select_response_format, MediaRange};

/// Base media type of the protocol.
pub const MEDIA_TYPE_PRPC: &str = "application/prpc";

/// Generic JSON media type, served as `JsonPb`.
pub const MEDIA_TYPE_JSON: &str = "application/json";

/// Media type parameter selecting the encoding of `application/prpc`.
pub const ENCODING_PARAM: &str = "encoding";

/// Content types emitted for each format.
pub const CONTENT_TYPE_BINARY: &str = "application/prpc; encoding=binary";
pub const CONTENT_TYPE_JSONPB: &str = "application/prpc; encoding=json";
pub const CONTENT_TYPE_TEXT: &str = "application/prpc; encoding=text";

/// Wire encoding of a message body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Format {
    /// Raw protobuf bytes.
    #[default]
    Binary,
    /// Canonical protobuf JSON behind an XSSI guard.
    JsonPb,
    /// Protobuf text format.
    Text,
}

impl Format {
    /// All formats, most preferred first.
    pub const PREFERENCE: [Format; 3] = [Format::Binary, Format::JsonPb, Format::Text];

    /// Tie-break rank; lower wins.
    pub fn rank(self) -> usize {
        match self {
            Format::Binary => 0,
            Format::JsonPb => 1,
            Format::Text => 2,
        }
    }

    /// Content type written for bodies of this format.
    pub fn content_type(self) -> &'static str {
        match self {
            Format::Binary => CONTENT_TYPE_BINARY,
            Format::JsonPb => CONTENT_TYPE_JSONPB,
            Format::Text => CONTENT_TYPE_TEXT,
        }
    }

    /// Value of the `encoding` parameter for this format.
    pub fn encoding(self) -> &'static str {
        match self {
            Format::Binary => "binary",
            Format::JsonPb => "json",
            Format::Text => "text",
        }
    }

    /// Resolves a parsed media type through the registry.
    ///
    /// `params` must not contain the `q` parameter. Returns `None` for
    /// media types this protocol does not serve. `application/prpc`
    /// without an `encoding` is binary.
    pub fn from_media_type(media_type: &str, params: &HashMap<String, String>) -> Option<Format> {
        match media_type {
            MEDIA_TYPE_PRPC => {
                if params.keys().any(|k| k != ENCODING_PARAM) {
                    return None;
                }
                match params.get(ENCODING_PARAM).map(String::as_str) {
                    None | Some("binary") => Some(Format::Binary),
                    Some("json") => Some(Format::JsonPb),
                    Some("text") => Some(Format::Text),
                    _ => None,
                }
            }
            MEDIA_TYPE_JSON => Some(Format::JsonPb),
            "*/*" | "application/*" => Some(Format::default()),
            _ => None,
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.encoding())
    }
}

impl std::str::FromStr for Format {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "binary" => Ok(Format::Binary),
            "json" | "jsonpb" => Ok(Format::JsonPb),
            "text" => Ok(Format::Text),
            other => Err(format!("unknown format {other:?}")),
        }
    }
}

/// Failure to agree on a wire format.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NegotiationError {
    /// Header value is not valid media type syntax.
    #[error("{header} header: {reason}")]
    Malformed { header: &'static str, reason: String },

    /// No media range in Accept names a supported format.
    #[error("Accept header: specified media types are not supported")]
    NotAcceptable,

    /// Content-Type names a format this protocol does not speak.
    #[error("Content-Type header: unsupported media type: {0}")]
    UnsupportedMediaType(String),
}

impl NegotiationError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Malformed { .. } => StatusCode::BAD_REQUEST,
            Self::NotAcceptable => StatusCode::NOT_ACCEPTABLE,
            Self::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
        }
    }
}
