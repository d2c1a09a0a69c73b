//! Message codec for the three wire formats.
//!
//! # Data Flow
//! ```text
//! Encode: message → Format
//!     Binary → prost bytes
//!     JsonPb → ")]}'\n" + canonical JSON + "\n"   (json.rs)
//!     Text   → text format + "\n"
//!
//! Decode: body + Format → target message
//!     Binary/Text: empty body → zero value
//!     JsonPb:      empty body → error
//! ```
//!
//! # Design Decisions
//! - Any `prost_reflect::ReflectMessage` can be encoded, including
//!   `DynamicMessage`; JSON and text go through a `DynamicMessage`
//! - Decoding replaces the target's contents
//! - Status details (`Any`) reuse the same encoders without body framing

pub mod json;

use axum::http::StatusCode;
use bytes::Bytes;
use prost::Message;
use prost_reflect::{DescriptorPool, DynamicMessage, MessageDescriptor, ReflectMessage};
use prost_types::Any;
use thiserror::Error;

use crate::format::{select_request_format, Format, NegotiationError};

pub use json::XSSI_PREAMBLE;

const ANY_TYPE_NAME: &str = "google.protobuf.Any";

/// Failure to turn bytes into a message or back.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("could not decode body: {0}")]
    Decode(String),

    #[error("could not encode message: {0}")]
    Encode(String),

    #[error("unsupported media type: {0}")]
    UnsupportedMediaType(String),
}

impl CodecError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Decode(_) => StatusCode::BAD_REQUEST,
            Self::Encode(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
        }
    }
}

/// Decoding knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeOptions {
    /// Ignore JSON fields the message does not define instead of failing.
    pub discard_unknown_fields: bool,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            discard_unknown_fields: true,
        }
    }
}

/// Encodes `msg` as a response or request body.
///
/// Returns the body and the content type to send with it.
pub fn encode<M: ReflectMessage>(msg: &M, format: Format) -> Result<(Bytes, &'static str), CodecError> {
    let body = match format {
        Format::Binary => msg.encode_to_vec(),
        Format::JsonPb | Format::Text => encode_dynamic(&msg.transcode_to_dynamic(), format, true)?,
    };
    Ok((Bytes::from(body), format.content_type()))
}

/// Decodes `body` into `target` with default options.
pub fn decode<M: ReflectMessage>(body: &[u8], format: Format, target: &mut M) -> Result<(), CodecError> {
    decode_with_options(body, format, target, &DecodeOptions::default())
}

/// Decodes `body` into `target`, replacing its contents.
pub fn decode_with_options<M: ReflectMessage>(
    body: &[u8],
    format: Format,
    target: &mut M,
    options: &DecodeOptions,
) -> Result<(), CodecError> {
    match format {
        Format::Binary => {
            target.clear();
            target
                .merge(body)
                .map_err(|e| CodecError::Decode(e.to_string()))
        }
        Format::JsonPb | Format::Text => {
            let dynamic = decode_dynamic(body, format, target.descriptor(), options)?;
            target.clear();
            target
                .merge(dynamic.encode_to_vec().as_slice())
                .map_err(|e| CodecError::Decode(e.to_string()))
        }
    }
}

/// Decodes a body whose format is given by a Content-Type value.
pub fn decode_content<M: ReflectMessage>(
    body: &[u8],
    content_type: &str,
    target: &mut M,
    options: &DecodeOptions,
) -> Result<Format, CodecError> {
    let format = select_request_format(content_type).map_err(|e| match e {
        NegotiationError::UnsupportedMediaType(ct) => CodecError::UnsupportedMediaType(ct),
        other => CodecError::Decode(other.to_string()),
    })?;
    decode_with_options(body, format, target, options)?;
    Ok(format)
}

/// Encodes a status detail wrapper without body framing.
///
/// JSON and text expand the wrapped message, so its type must be known
/// to `pool`.
pub fn encode_any(any: &Any, format: Format, pool: &DescriptorPool) -> Result<Vec<u8>, CodecError> {
    match format {
        Format::Binary => Ok(any.encode_to_vec()),
        Format::JsonPb | Format::Text => {
            let dynamic = DynamicMessage::decode(any_descriptor(pool), any.encode_to_vec().as_slice())
                .map_err(|e| CodecError::Encode(e.to_string()))?;
            encode_dynamic(&dynamic, format, false)
        }
    }
}

/// Reverse of [`encode_any`].
pub fn decode_any(bytes: &[u8], format: Format, pool: &DescriptorPool) -> Result<Any, CodecError> {
    match format {
        Format::Binary => Any::decode(bytes).map_err(|e| CodecError::Decode(e.to_string())),
        Format::JsonPb | Format::Text => {
            decode_dynamic(bytes, format, any_descriptor(pool), &DecodeOptions::default())?
                .transcode_to::<Any>()
                .map_err(|e| CodecError::Decode(e.to_string()))
        }
    }
}

fn any_descriptor(pool: &DescriptorPool) -> MessageDescriptor {
    pool.get_message_by_name(ANY_TYPE_NAME)
        .unwrap_or_else(|| Any::default().descriptor())
}

fn encode_dynamic(msg: &DynamicMessage, format: Format, framed: bool) -> Result<Vec<u8>, CodecError> {
    match format {
        Format::Binary => Ok(msg.encode_to_vec()),
        Format::JsonPb => json::encode(msg, framed),
        Format::Text => {
            let mut out = msg.to_text_format().into_bytes();
            if framed {
                out.push(b'\n');
            }
            Ok(out)
        }
    }
}

fn decode_dynamic(
    body: &[u8],
    format: Format,
    desc: MessageDescriptor,
    options: &DecodeOptions,
) -> Result<DynamicMessage, CodecError> {
    match format {
        Format::Binary => {
            DynamicMessage::decode(desc, body).map_err(|e| CodecError::Decode(e.to_string()))
        }
        Format::JsonPb => json::decode(body, desc, options),
        Format::Text => {
            if body.is_empty() {
                return Ok(DynamicMessage::new(desc));
            }
            let text = std::str::from_utf8(body).map_err(|e| CodecError::Decode(e.to_string()))?;
            DynamicMessage::parse_text_format(desc, text)
                .map_err(|e| CodecError::Decode(e.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost_types::{Duration, FieldMask};

    fn sample() -> Duration {
        Duration {
            seconds: 90,
            nanos: 500_000_000,
        }
    }

    #[test]
    fn test_binary_round_trip() {
        let (body, content_type) = encode(&sample(), Format::Binary).unwrap();
        assert_eq!(content_type, "application/prpc; encoding=binary");
        assert_eq!(body.as_ref(), sample().encode_to_vec().as_slice());

        let mut out = Duration::default();
        decode(&body, Format::Binary, &mut out).unwrap();
        assert_eq!(out, sample());
    }

    #[test]
    fn test_json_framing() {
        let (body, content_type) = encode(&sample(), Format::JsonPb).unwrap();
        assert_eq!(content_type, "application/prpc; encoding=json");
        assert!(body.starts_with(b")]}'\n\""));
        assert!(body.ends_with(b"s\"\n"));

        let mut out = Duration::default();
        decode(&body, Format::JsonPb, &mut out).unwrap();
        assert_eq!(out, sample());
    }

    #[test]
    fn test_text_round_trip() {
        let (body, content_type) = encode(&sample(), Format::Text).unwrap();
        assert_eq!(content_type, "application/prpc; encoding=text");
        assert!(body.ends_with(b"\n"));

        let mut out = Duration::default();
        decode(&body, Format::Text, &mut out).unwrap();
        assert_eq!(out, sample());
    }

    #[test]
    fn test_empty_body() {
        let mut out = sample();
        decode(b"", Format::Binary, &mut out).unwrap();
        assert_eq!(out, Duration::default());

        let mut out = sample();
        decode(b"", Format::Text, &mut out).unwrap();
        assert_eq!(out, Duration::default());

        let mut out = FieldMask::default();
        let err = decode(b"", Format::JsonPb, &mut out).unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_malformed_body() {
        let mut out = Duration::default();
        let err = decode(b"\xff\xff\xff", Format::Binary, &mut out).unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);

        let err = decode(b"{not json", Format::JsonPb, &mut out).unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);

        let err = decode(b"seconds: \"abc\"", Format::Text, &mut out).unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_decode_content_type() {
        let mut out = Duration::default();
        let format = decode_content(
            b"\"1s\"",
            "application/json",
            &mut out,
            &DecodeOptions::default(),
        )
        .unwrap();
        assert_eq!(format, Format::JsonPb);
        assert_eq!(out.seconds, 1);

        let err = decode_content(b"", "text/html", &mut out, &DecodeOptions::default()).unwrap_err();
        assert_eq!(err.status_code(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    }

    #[test]
    fn test_any_round_trip_in_every_format() {
        let pool = DescriptorPool::global();
        let any = Any {
            type_url: "type.googleapis.com/google.protobuf.Duration".to_string(),
            value: sample().encode_to_vec(),
        };
        for format in Format::PREFERENCE {
            let bytes = encode_any(&any, format, &pool).unwrap();
            assert_eq!(decode_any(&bytes, format, &pool).unwrap(), any, "{format}");
        }
    }
}
