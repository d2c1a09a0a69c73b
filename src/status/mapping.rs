//! Status code to HTTP status mapping and the error message policy.
//!
//! # Responsibilities
//! - Map every protocol code to exactly one HTTP status
//! - Map HTTP statuses back to codes when no status header is present
//! - Decide which codes may expose their message to the caller
//!
//! # Design Decisions
//! - Tables are `match` expressions: total, immutable, lock-free
//! - Client-fault codes echo the handler message; all others are masked

use axum::http::StatusCode;

use super::Code;

/// Body written in place of the real message for masked codes.
pub const GENERIC_ERROR_MESSAGE: &str = "Internal Server Error";

/// HTTP status line for a protocol code.
pub fn code_to_http_status(code: Code) -> StatusCode {
    match code {
        Code::Ok => StatusCode::OK,
        // Non-standard "client closed request".
        Code::Canceled => StatusCode::from_u16(499).unwrap_or(StatusCode::BAD_REQUEST),
        Code::InvalidArgument => StatusCode::BAD_REQUEST,
        Code::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
        Code::NotFound => StatusCode::NOT_FOUND,
        Code::AlreadyExists => StatusCode::CONFLICT,
        Code::PermissionDenied => StatusCode::FORBIDDEN,
        Code::Unauthenticated => StatusCode::UNAUTHORIZED,
        Code::ResourceExhausted => StatusCode::TOO_MANY_REQUESTS,
        Code::FailedPrecondition => StatusCode::BAD_REQUEST,
        Code::Aborted => StatusCode::CONFLICT,
        Code::OutOfRange => StatusCode::BAD_REQUEST,
        Code::Unimplemented => StatusCode::NOT_IMPLEMENTED,
        Code::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        Code::Unknown | Code::Internal | Code::DataLoss => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Best-effort code for an HTTP status, used when a response carries no
/// status-code header.
pub fn http_status_to_code(status: StatusCode) -> Code {
    match status.as_u16() {
        200 => Code::Ok,
        400 => Code::InvalidArgument,
        401 => Code::Unauthenticated,
        403 => Code::PermissionDenied,
        404 => Code::NotFound,
        409 => Code::AlreadyExists,
        429 => Code::ResourceExhausted,
        499 => Code::Canceled,
        501 => Code::Unimplemented,
        502 | 503 => Code::Unavailable,
        504 => Code::DeadlineExceeded,
        500 => Code::Internal,
        _ => Code::Unknown,
    }
}

/// Whether a code's message can be shown to the caller verbatim.
///
/// These codes describe a problem with the request or the caller, so their
/// messages do not carry server-internal state.
pub fn is_client_fault(code: Code) -> bool {
    matches!(
        code,
        Code::Canceled
            | Code::InvalidArgument
            | Code::DeadlineExceeded
            | Code::NotFound
            | Code::AlreadyExists
            | Code::PermissionDenied
            | Code::Unauthenticated
            | Code::ResourceExhausted
            | Code::FailedPrecondition
            | Code::Aborted
            | Code::OutOfRange
            | Code::Unimplemented
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_code_has_http_status() {
        for value in 0..=16 {
            let code = Code::from_i32(value);
            let status = code_to_http_status(code);
            if code == Code::Ok {
                assert_eq!(status, StatusCode::OK);
            } else {
                assert!(status.is_client_error() || status.is_server_error(), "{code}");
            }
        }
    }

    #[test]
    fn test_common_codes() {
        assert_eq!(code_to_http_status(Code::NotFound), StatusCode::NOT_FOUND);
        assert_eq!(code_to_http_status(Code::Unauthenticated), StatusCode::UNAUTHORIZED);
        assert_eq!(code_to_http_status(Code::PermissionDenied), StatusCode::FORBIDDEN);
        assert_eq!(code_to_http_status(Code::Internal), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(code_to_http_status(Code::Unknown), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(code_to_http_status(Code::Canceled).as_u16(), 499);
    }

    #[test]
    fn test_http_to_code_round_trips_unambiguous_statuses() {
        for code in [
            Code::Ok,
            Code::Canceled,
            Code::InvalidArgument,
            Code::DeadlineExceeded,
            Code::NotFound,
            Code::AlreadyExists,
            Code::PermissionDenied,
            Code::Unauthenticated,
            Code::ResourceExhausted,
            Code::Unimplemented,
            Code::Unavailable,
            Code::Internal,
        ] {
            assert_eq!(http_status_to_code(code_to_http_status(code)), code);
        }
        assert_eq!(http_status_to_code(StatusCode::IM_A_TEAPOT), Code::Unknown);
    }

    #[test]
    fn test_masking_policy() {
        assert!(is_client_fault(Code::NotFound));
        assert!(is_client_fault(Code::InvalidArgument));
        assert!(is_client_fault(Code::AlreadyExists));
        assert!(is_client_fault(Code::PermissionDenied));
        assert!(!is_client_fault(Code::Internal));
        assert!(!is_client_fault(Code::Unknown));
        assert!(!is_client_fault(Code::DataLoss));
        assert!(!is_client_fault(Code::Unavailable));
    }
}
