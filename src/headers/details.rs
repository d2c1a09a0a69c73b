//! Status detail headers.
//!
//! Each detail is encoded in the response's negotiated format, base64'd
//! and emitted as one value of a repeated header, in attachment order.

use axum::http::header::{HeaderMap, HeaderValue};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use prost_reflect::DescriptorPool;
use prost_types::Any;

use super::{HeaderError, HEADER_STATUS_DETAILS};
use crate::codec::{decode_any, encode_any, CodecError};
use crate::format::Format;

/// Appends one header value per detail.
///
/// A detail that cannot be expressed in `format`, typically because its
/// type is missing from `pool`, is left out. The failures are returned so
/// the caller can report them; the remaining details keep their order.
pub fn write_status_details(
    headers: &mut HeaderMap,
    details: &[Any],
    format: Format,
    pool: &DescriptorPool,
) -> Vec<CodecError> {
    let mut skipped = Vec::new();
    for detail in details {
        match encode_status_detail(detail, format, pool) {
            Ok(value) => {
                headers.append(HEADER_STATUS_DETAILS, value);
            }
            Err(e) => skipped.push(e),
        }
    }
    skipped
}

fn encode_status_detail(detail: &Any, format: Format, pool: &DescriptorPool) -> Result<HeaderValue, CodecError> {
    let encoded = STANDARD.encode(encode_any(detail, format, pool)?);
    HeaderValue::try_from(encoded).map_err(|e| CodecError::Encode(e.to_string()))
}

/// Reads the details written by [`write_status_details`], in order.
///
/// Fails on the first value that does not decode.
pub fn read_status_details(
    headers: &HeaderMap,
    format: Format,
    pool: &DescriptorPool,
) -> Result<Vec<Any>, HeaderError> {
    headers
        .get_all(HEADER_STATUS_DETAILS)
        .iter()
        .map(|value| decode_status_detail(value, format, pool))
        .collect()
}

/// Decodes one status detail header value.
pub fn decode_status_detail(value: &HeaderValue, format: Format, pool: &DescriptorPool) -> Result<Any, HeaderError> {
    let bytes = STANDARD
        .decode(value.as_bytes())
        .map_err(|e| HeaderError::new(HEADER_STATUS_DETAILS, e.to_string()))?;
    decode_any(&bytes, format, pool).map_err(|e| HeaderError::new(HEADER_STATUS_DETAILS, e.to_string()))
}
