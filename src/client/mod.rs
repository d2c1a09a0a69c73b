//! pRPC client.
//!
//! # Data Flow
//! ```text
//! request message
//!     → codec (Format from CallOptions or client default)
//!     → headers: Content-Type, Accept, timeout, metadata
//!     → hyper-util client (POST http://<host>/prpc/<service>/<method>)
//!     → status code header
//!         0     → decode body per response Content-Type
//!         other → Status { code, body as message, detail headers }
//! ```
//!
//! # Design Decisions
//! - The effective deadline is the earlier of the context deadline and the
//!   call timeout; the same deadline bounds the HTTP exchange
//! - Responses are requested in the same format as the request body
//! - Connection failures surface as `ClientError::Transport`, never as a
//!   fabricated status
//! - A received status code is never replaced; details that fail to
//!   decode are dropped with a warning

pub mod error;
pub mod options;

use std::time::Duration;

use axum::http::header::{ACCEPT, CONTENT_TYPE, USER_AGENT};
use axum::http::{HeaderMap, HeaderValue, Method, Request, Response, StatusCode, Uri};
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client as HttpClient;
use hyper_util::rt::TokioExecutor;
use prost_reflect::ReflectMessage;
use prost_types::Any;
use tokio::time::Instant;

use crate::codec::{self, DecodeOptions};
use crate::format::{select_request_format, Format};
use crate::headers::{
    decode_status_detail, encode_timeout, fold_response_headers, write_metadata, HeaderError, Metadata,
    HEADER_STATUS_CODE, HEADER_STATUS_DETAILS, HEADER_TIMEOUT,
};
use crate::observability::metrics::record_client_call;
use crate::server::CallContext;
use crate::status::{http_status_to_code, Code, Status};

pub use error::ClientError;
pub use options::{CallOptions, ClientOptions};

/// Issues unary pRPC calls to one host.
#[derive(Clone)]
pub struct Client {
    http: HttpClient<HttpConnector, Full<Bytes>>,
    host: String,
    options: ClientOptions,
}

/// Response headers and body of a call, before decoding.
struct RawResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl Client {
    /// Client for `host` (e.g. `"localhost:8080"`) with default options.
    pub fn new(host: impl Into<String>) -> Self {
        Self::with_options(host, ClientOptions::default())
    }

    pub fn with_options(host: impl Into<String>, options: ClientOptions) -> Self {
        let http = HttpClient::builder(TokioExecutor::new()).build_http();
        Self {
            http,
            host: host.into(),
            options,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Calls `service.method`, returning a freshly decoded response.
    pub async fn call<Req, Res>(
        &self,
        ctx: &CallContext,
        service: &str,
        method: &str,
        request: &Req,
        opts: &CallOptions,
    ) -> Result<Res, ClientError>
    where
        Req: ReflectMessage,
        Res: ReflectMessage + Default,
    {
        let mut response = Res::default();
        self.call_into(ctx, service, method, request, &mut response, opts)
            .await?;
        Ok(response)
    }

    /// Calls `service.method`, decoding into `response`.
    ///
    /// Works with `DynamicMessage` targets. Returns the response metadata.
    pub async fn call_into<Req, Res>(
        &self,
        ctx: &CallContext,
        service: &str,
        method: &str,
        request: &Req,
        response: &mut Res,
        opts: &CallOptions,
    ) -> Result<Metadata, ClientError>
    where
        Req: ReflectMessage,
        Res: ReflectMessage,
    {
        let result = self
            .call_inner(ctx, service, method, request, response, opts)
            .await;
        let code = match &result {
            Ok(_) => Code::Ok,
            Err(e) => e.code(),
        };
        record_client_call(service, method, code);
        if let Err(e) = &result {
            tracing::debug!(service, method, code = %code, error = %e, "Call failed");
        }
        result
    }

    async fn call_inner<Req, Res>(
        &self,
        ctx: &CallContext,
        service: &str,
        method: &str,
        request: &Req,
        response: &mut Res,
        opts: &CallOptions,
    ) -> Result<Metadata, ClientError>
    where
        Req: ReflectMessage,
        Res: ReflectMessage,
    {
        let format = opts.format.unwrap_or(self.options.format);
        let deadline = self.deadline(ctx, opts);

        let (body, content_type) = codec::encode(request, format)?;
        let mut http_request = Request::builder()
            .method(Method::POST)
            .uri(self.uri(service, method)?)
            .body(Full::new(body))
            .map_err(|e| ClientError::InvalidRequest(e.to_string()))?;
        self.write_headers(http_request.headers_mut(), ctx, opts, format, content_type, deadline)?;

        let raw = match deadline {
            Some(deadline) => tokio::time::timeout_at(deadline, self.send(http_request))
                .await
                .map_err(|_| Status::deadline_exceeded("deadline exceeded before response was received"))??,
            None => self.send(http_request).await?,
        };

        let mut metadata = Metadata::new();
        fold_response_headers(&raw.headers, &mut metadata)?;

        match status_code_header(&raw)? {
            Some(Code::Ok) => {
                let content_type = raw
                    .headers
                    .get(CONTENT_TYPE)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("");
                let response_format = if content_type.is_empty() {
                    format
                } else {
                    select_request_format(content_type).map_err(|e| HeaderError::new("Content-Type", e.to_string()))?
                };
                codec::decode_with_options(&raw.body, response_format, response, &self.options.decode_options)?;
                Ok(metadata)
            }
            Some(code) => Err(Status::new(code, error_message(&raw.body))
                .with_details(self.status_details(&raw.headers, format))
                .into()),
            None => {
                let code = match http_status_to_code(raw.status) {
                    Code::Ok => Code::Internal,
                    code => code,
                };
                Err(Status::new(
                    code,
                    format!(
                        "response has no {HEADER_STATUS_CODE} header (HTTP {}): {}",
                        raw.status,
                        error_message(&raw.body)
                    ),
                )
                .into())
            }
        }
    }

    /// Details that decode; the others are logged and left out so the
    /// received code and message always reach the caller.
    fn status_details(&self, headers: &HeaderMap, format: Format) -> Vec<Any> {
        headers
            .get_all(HEADER_STATUS_DETAILS)
            .iter()
            .filter_map(|value| match decode_status_detail(value, format, &self.options.pool) {
                Ok(detail) => Some(detail),
                Err(e) => {
                    tracing::warn!(format = %format, error = %e, "Dropped undecodable status detail");
                    None
                }
            })
            .collect()
    }

    fn deadline(&self, ctx: &CallContext, opts: &CallOptions) -> Option<Instant> {
        let timeout = opts.timeout.or(self.options.timeout);
        let from_timeout = timeout.and_then(|t| Instant::now().checked_add(t));
        match (ctx.deadline(), from_timeout) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    fn uri(&self, service: &str, method: &str) -> Result<Uri, ClientError> {
        format!("http://{}/prpc/{}/{}", self.host, service, method)
            .parse()
            .map_err(|e: axum::http::uri::InvalidUri| ClientError::InvalidRequest(e.to_string()))
    }

    fn write_headers(
        &self,
        headers: &mut HeaderMap,
        ctx: &CallContext,
        opts: &CallOptions,
        format: Format,
        content_type: &'static str,
        deadline: Option<Instant>,
    ) -> Result<(), ClientError> {
        write_metadata(ctx.metadata(), headers)?;
        write_metadata(&opts.metadata, headers)?;

        headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
        headers.insert(ACCEPT, HeaderValue::from_static(format.content_type()));
        if !self.options.user_agent.is_empty() {
            let agent = HeaderValue::from_str(&self.options.user_agent)
                .map_err(|e| ClientError::InvalidRequest(format!("user agent: {e}")))?;
            headers.insert(USER_AGENT, agent);
        }

        if let Some(deadline) = deadline {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining == Duration::ZERO {
                return Err(Status::deadline_exceeded("deadline exceeded before the call was sent").into());
            }
            let value = HeaderValue::try_from(encode_timeout(remaining))
                .map_err(|e| ClientError::InvalidRequest(e.to_string()))?;
            headers.insert(HEADER_TIMEOUT, value);
        }
        Ok(())
    }

    async fn send(&self, request: Request<Full<Bytes>>) -> Result<RawResponse, ClientError> {
        let response: Response<Incoming> = self
            .http
            .request(request)
            .await
            .map_err(|e| ClientError::Transport(error_chain(&e)))?;
        let (parts, body) = response.into_parts();
        let body = body
            .collect()
            .await
            .map_err(|e: hyper::Error| ClientError::Transport(error_chain(&e)))?
            .to_bytes();
        Ok(RawResponse {
            status: parts.status,
            headers: parts.headers,
            body,
        })
    }
}

fn status_code_header(raw: &RawResponse) -> Result<Option<Code>, HeaderError> {
    let Some(value) = raw.headers.get(HEADER_STATUS_CODE) else {
        return Ok(None);
    };
    value
        .to_str()
        .ok()
        .and_then(|v| v.trim().parse::<i32>().ok())
        .map(|n| Some(Code::from_i32(n)))
        .ok_or_else(|| HeaderError::new(HEADER_STATUS_CODE, format!("invalid status code: {value:?}")))
}

fn error_message(body: &[u8]) -> String {
    String::from_utf8_lossy(body).trim_end_matches('\n').to_string()
}

fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(e) = source {
        message.push_str(": ");
        message.push_str(&e.to_string());
        source = e.source();
    }
    message
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("host", &self.host)
            .field("options", &self.options)
            .finish()
    }
}
