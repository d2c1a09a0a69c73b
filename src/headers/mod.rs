//! Header protocol: status, timeout, metadata and status details.
//!
//! # Data Flow
//! ```text
//! Inbound request headers
//!     → timeout.rs   (x-prpc-grpc-timeout → deadline)
//!     → metadata.rs  (everything else → ordered multimap, -bin decoded)
//!
//! Outbound error response
//!     → details.rs   (each Any → negotiated Format → base64 → repeated header)
//!
//! Client
//!     metadata.rs    (multimap → headers, -bin encoded)
//!     timeout.rs     (remaining time → x-prpc-grpc-timeout)
//!     details.rs     (repeated header → ordered Vec<Any>)
//! ```
//!
//! # Design Decisions
//! - Every header error names the offending header
//! - Binary values use the standard base64 alphabet with padding

pub mod details;
pub mod metadata;
pub mod timeout;

use thiserror::Error;

pub use details::{decode_status_detail, read_status_details, write_status_details};
pub use metadata::{fold_request_headers, fold_response_headers, write_metadata, Metadata};
pub use timeout::{decode_timeout, encode_timeout};

/// Numeric status code of the call, present on every response.
pub const HEADER_STATUS_CODE: &str = "x-prpc-grpc-code";

/// Request timeout in compact `<int><unit>` form.
pub const HEADER_TIMEOUT: &str = "x-prpc-grpc-timeout";

/// One base64 blob per status detail.
pub const HEADER_STATUS_DETAILS: &str = "x-prpc-status-details-bin";

/// Suffix marking base64-encoded binary metadata.
pub const BIN_SUFFIX: &str = "-bin";

/// Metadata key carrying the externally visible host name.
pub const HOST_METADATA_KEY: &str = "host";

/// A header that could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{header} header: {reason}")]
pub struct HeaderError {
    pub header: String,
    pub reason: String,
}

impl HeaderError {
    pub fn new(header: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            header: header.into(),
            reason: reason.into(),
        }
    }
}

/// Whether a header name carries base64 binary values.
pub fn is_binary_header(name: &str) -> bool {
    name.len() >= BIN_SUFFIX.len()
        && name
            .get(name.len() - BIN_SUFFIX.len()..)
            .is_some_and(|suffix| suffix.eq_ignore_ascii_case(BIN_SUFFIX))
}
