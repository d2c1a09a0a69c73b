//! Per-request pipeline.
//!
//! ```text
//! lookup method            → 501 UNIMPLEMENTED
//! Content-Type → Format    → 400 / 415
//! headers → CallContext    → 400
//! Accept → Format          → 400 / 406
//! read body (capped)       → 413
//! decode body              → 400
//! interceptors + handler   → status error, masked per code
//! encode response          → 200
//! ```
//!
//! Steps run strictly in this order; the first failure ends the request.

use std::time::Instant;

use axum::body::{to_bytes, Body};
use axum::http::header::{ACCEPT, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderName, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use http_body_util::LengthLimitError;

use super::context::{CallContext, CallHeaders};
use super::interceptor::{Next, UnaryCall};
use super::response::{write_error, write_message, ProtocolError};
use super::ServerInner;
use crate::format::{select_request_format, select_response_format, Format, NegotiationError};
use crate::observability::metrics::record_rejected;
use crate::status::Status;

/// Runs one request through the pipeline.
pub(crate) async fn dispatch(server: &ServerInner, service: &str, method: &str, request: Request<Body>) -> Response {
    let Some(entry) = server.lookup(service, method) else {
        record_rejected("unimplemented");
        return write_error(
            &Status::unimplemented(format!("method {service}/{method} is not implemented")),
            Format::Binary,
            &server.pool,
        );
    };

    let (parts, body) = request.into_parts();

    let request_format = match header_str(&parts.headers, &CONTENT_TYPE)
        .and_then(|ct| select_request_format(ct).map_err(ProtocolError::from))
    {
        Ok(format) => format,
        Err(e) => return reject(e),
    };

    let call_headers = match CallHeaders::parse(&parts, request_format, server.max_timeout) {
        Ok(headers) => headers,
        Err(e) => return reject(e.into()),
    };

    let response_format = match header_str(&parts.headers, &ACCEPT)
        .and_then(|accept| select_response_format(accept).map_err(ProtocolError::from))
    {
        Ok(format) => format,
        Err(e) => return reject(e),
    };

    let body = match to_bytes(body, server.max_body_size).await {
        Ok(body) => body,
        Err(e) if exceeds_limit(&e) => return reject(ProtocolError::payload_too_large(server.max_body_size)),
        Err(e) => {
            return reject(ProtocolError::new(
                StatusCode::BAD_REQUEST,
                format!("could not read request body: {e}"),
            ))
        }
    };

    let request = match (entry.decode)(&body, call_headers.format, &server.decode_options) {
        Ok(request) => request,
        Err(e) => return reject(e.into()),
    };

    tracing::debug!(
        request_format = %call_headers.format,
        response_format = %response_format,
        body_len = body.len(),
        "Dispatching call"
    );

    let base = parts.extensions.get::<CallContext>().cloned().unwrap_or_default();
    let ctx = call_headers.into_context(base);
    let deadline = ctx.deadline();
    let call = UnaryCall {
        ctx,
        info: entry.info.clone(),
        request,
    };

    let start = Instant::now();
    let chain = Next::new(&server.interceptors, entry.handler.as_ref()).run(call);
    let result = match deadline {
        Some(deadline) => match tokio::time::timeout_at(deadline, chain).await {
            Ok(result) => result,
            Err(_) => Err(Status::deadline_exceeded("deadline exceeded")),
        },
        None => chain.await,
    };

    match result.and_then(|response| {
        (entry.encode)(&*response, response_format)
            .map_err(|e| Status::internal(e.to_string()))
    }) {
        Ok(body) => {
            tracing::debug!(elapsed = ?start.elapsed(), "Call succeeded");
            write_message(body, response_format)
        }
        Err(status) => write_error(&status, response_format, &server.pool),
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &HeaderName) -> Result<&'a str, ProtocolError> {
    match headers.get(name) {
        Some(value) => value.to_str().map_err(|e| {
            let header = if *name == CONTENT_TYPE { "Content-Type" } else { "Accept" };
            NegotiationError::Malformed {
                header,
                reason: e.to_string(),
            }
            .into()
        }),
        None => Ok(""),
    }
}

fn exceeds_limit(err: &axum::Error) -> bool {
    let mut source: Option<&(dyn std::error::Error + 'static)> = Some(err);
    while let Some(e) = source {
        if e.is::<LengthLimitError>() {
            return true;
        }
        source = e.source();
    }
    false
}

fn reject(err: ProtocolError) -> Response {
    record_rejected(err.reason());
    err.into_response()
}
