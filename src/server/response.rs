//! Response construction.
//!
//! # Responsibilities
//! - Write successful responses in the negotiated format
//! - Write status errors, masking server faults from the caller
//! - Write protocol errors raised before a handler runs
//!
//! # Design Decisions
//! - Error bodies are always `text/plain`
//! - Client faults are logged at warn, server faults at error with the
//!   unmasked message
//! - Every response carries the status code header

use axum::body::Body;
use axum::http::header::{HeaderValue, CONTENT_TYPE};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use prost_reflect::DescriptorPool;
use thiserror::Error;

use crate::codec::CodecError;
use crate::format::{Format, NegotiationError};
use crate::headers::{write_status_details, HeaderError, HEADER_STATUS_CODE};
use crate::status::{code_to_http_status, is_client_fault, Code, Status, GENERIC_ERROR_MESSAGE};

const TEXT_PLAIN: &str = "text/plain; charset=utf-8";

/// A request the protocol layer refused before any handler ran.
///
/// Keeps its own HTTP status; the status code header says
/// `INVALID_ARGUMENT`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ProtocolError {
    pub status: StatusCode,
    pub message: String,
}

impl ProtocolError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn payload_too_large(limit: usize) -> Self {
        Self::new(
            StatusCode::PAYLOAD_TOO_LARGE,
            format!("request body exceeds {limit} bytes"),
        )
    }

    pub fn code(&self) -> Code {
        Code::InvalidArgument
    }

    /// Short label used for the rejection metric.
    pub fn reason(&self) -> &'static str {
        match self.status {
            StatusCode::UNSUPPORTED_MEDIA_TYPE => "unsupported_media_type",
            StatusCode::NOT_ACCEPTABLE => "not_acceptable",
            StatusCode::PAYLOAD_TOO_LARGE => "payload_too_large",
            _ => "bad_request",
        }
    }
}

impl From<NegotiationError> for ProtocolError {
    fn from(err: NegotiationError) -> Self {
        Self::new(err.status_code(), err.to_string())
    }
}

impl From<HeaderError> for ProtocolError {
    fn from(err: HeaderError) -> Self {
        Self::new(StatusCode::BAD_REQUEST, err.to_string())
    }
}

impl From<CodecError> for ProtocolError {
    fn from(err: CodecError) -> Self {
        Self::new(err.status_code(), err.to_string())
    }
}

impl IntoResponse for ProtocolError {
    fn into_response(self) -> Response {
        tracing::warn!(status = %self.status, error = %self.message, "Request rejected");
        plain_response(self.status, self.code(), Bytes::from(self.message))
    }
}

/// Writes a successful response.
pub fn write_message(body: Bytes, format: Format) -> Response {
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = StatusCode::OK;
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(format.content_type()));
    headers.insert(HEADER_STATUS_CODE, code_header(Code::Ok));
    response
}

/// Writes a status error.
///
/// Details are encoded in `format`, the format the caller accepts. A
/// detail that cannot be encoded is dropped; the code and message stand.
pub fn write_error(status: &Status, format: Format, pool: &DescriptorPool) -> Response {
    let code = match status.code() {
        Code::Ok => {
            tracing::error!(message = %status.message(), "Handler returned an error with code OK");
            Code::Internal
        }
        code => code,
    };

    let body = if is_client_fault(code) {
        tracing::warn!(code = %code, message = %status.message(), "Call failed");
        Bytes::from(status.message().to_string())
    } else {
        tracing::error!(code = %code, message = %status.message(), "Call failed");
        Bytes::from_static(GENERIC_ERROR_MESSAGE.as_bytes())
    };

    let mut response = plain_response(code_to_http_status(code), code, body);
    for e in write_status_details(response.headers_mut(), status.details(), format, pool) {
        tracing::error!(code = %code, format = %format, error = %e, "Dropped status detail");
    }
    response
}

fn plain_response(http_status: StatusCode, code: Code, body: Bytes) -> Response {
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = http_status;
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(TEXT_PLAIN));
    headers.insert(HEADER_STATUS_CODE, code_header(code));
    response
}

fn code_header(code: Code) -> HeaderValue {
    HeaderValue::from(code.as_i32())
}
