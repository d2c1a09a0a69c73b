//! Per-call context derived from the inbound request.
//!
//! # Responsibilities
//! - Parse timeout, metadata and host out of the raw request headers
//! - Merge them onto any context an outer layer attached to the request
//! - Expose the deadline and metadata to interceptors and handlers
//!
//! # Design Decisions
//! - Built once per request, read-only afterwards
//! - Metadata from headers is appended after inherited values
//! - The earliest of the inherited and the header deadline wins

use std::time::Duration;

use axum::http::request::Parts;
use tokio::time::Instant;

use crate::format::Format;
use crate::headers::{decode_timeout, fold_request_headers, HeaderError, Metadata, HEADER_TIMEOUT, HOST_METADATA_KEY};

/// Deadline and metadata of a call.
///
/// On the server this is what interceptors and handlers receive. On the
/// client its metadata is sent as headers and its deadline as the timeout
/// header.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    metadata: Metadata,
    deadline: Option<Instant>,
}

impl CallContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(current) if current < deadline => current,
            _ => deadline,
        });
        self
    }

    /// A timeout too large to represent as an instant sets no deadline.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.with_deadline(deadline),
            None => self,
        }
    }

    pub fn with_metadata(mut self, key: impl AsRef<str>, value: impl Into<bytes::Bytes>) -> Self {
        self.metadata.append(key, value);
        self
    }

    /// Context for a downstream call: same deadline, no inbound metadata.
    pub fn outgoing(&self) -> Self {
        Self {
            metadata: Metadata::new(),
            deadline: self.deadline,
        }
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline, zero once it has passed.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Host the caller addressed, as seen before any proxy rewrites.
    pub fn host(&self) -> Option<&str> {
        self.metadata.get_str(HOST_METADATA_KEY)
    }
}

/// Protocol view of the inbound request headers.
#[derive(Debug, Clone)]
pub struct CallHeaders {
    pub format: Format,
    pub host: Option<String>,
    pub deadline: Option<Instant>,
    pub metadata: Metadata,
}

impl CallHeaders {
    /// Parses the headers of a request whose body format is `format`.
    ///
    /// `max_timeout` caps the timeout a caller may ask for. A timeout past
    /// the representable range of `Instant` sets no deadline.
    pub fn parse(parts: &Parts, format: Format, max_timeout: Option<Duration>) -> Result<Self, HeaderError> {
        let deadline = match parts.headers.get(HEADER_TIMEOUT) {
            Some(value) => {
                let value = value
                    .to_str()
                    .map_err(|e| HeaderError::new(HEADER_TIMEOUT, e.to_string()))?;
                let mut timeout = decode_timeout(value)?;
                if let Some(max) = max_timeout {
                    timeout = timeout.min(max);
                }
                Instant::now().checked_add(timeout)
            }
            None => None,
        };

        let mut metadata = Metadata::new();
        fold_request_headers(&parts.headers, parts.uri.authority().map(|a| a.as_str()), &mut metadata)?;
        let host = metadata.get_str(HOST_METADATA_KEY).map(str::to_string);

        Ok(Self {
            format,
            host,
            deadline,
            metadata,
        })
    }

    /// Derives the call context, appending onto `base`.
    pub fn into_context(self, base: CallContext) -> CallContext {
        let mut ctx = base;
        ctx.metadata.extend(self.metadata);
        match self.deadline {
            Some(deadline) => ctx.with_deadline(deadline),
            None => ctx,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;

    fn parts(builder: axum::http::request::Builder) -> Parts {
        builder.body(Body::empty()).unwrap().into_parts().0
    }

    #[tokio::test]
    async fn test_parse_timeout_sets_deadline() {
        let p = parts(Request::post("/").header(HEADER_TIMEOUT, "1M"));
        let before = Instant::now();
        let headers = CallHeaders::parse(&p, Format::Binary, None).unwrap();
        let deadline = headers.deadline.unwrap();
        assert!(deadline >= before + Duration::from_secs(60));
        assert!(deadline <= Instant::now() + Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_timeout_is_capped() {
        let p = parts(Request::post("/").header(HEADER_TIMEOUT, "1H"));
        let headers = CallHeaders::parse(&p, Format::Binary, Some(Duration::from_secs(5))).unwrap();
        assert!(headers.deadline.unwrap() <= Instant::now() + Duration::from_secs(5));
    }

    #[test]
    fn test_no_timeout_no_deadline() {
        let p = parts(Request::post("/"));
        let headers = CallHeaders::parse(&p, Format::Binary, None).unwrap();
        assert!(headers.deadline.is_none());
    }

    #[test]
    fn test_unrepresentable_timeout_sets_no_deadline() {
        let p = parts(Request::post("/").header(HEADER_TIMEOUT, "9999999999999999999S"));
        let headers = CallHeaders::parse(&p, Format::Binary, None).unwrap();
        assert!(headers.deadline.is_none());

        let ctx = CallContext::new().with_timeout(Duration::MAX);
        assert!(ctx.deadline().is_none());
    }

    #[test]
    fn test_bad_timeout() {
        let p = parts(Request::post("/").header(HEADER_TIMEOUT, "1x"));
        let err = CallHeaders::parse(&p, Format::Binary, None).unwrap_err();
        assert_eq!(err.header, HEADER_TIMEOUT);
    }

    #[test]
    fn test_host_from_authority() {
        let p = parts(Request::post("http://builds.example.com/prpc/s/m"));
        let headers = CallHeaders::parse(&p, Format::Binary, None).unwrap();
        assert_eq!(headers.host.as_deref(), Some("builds.example.com"));
    }

    #[test]
    fn test_context_appends_to_base() {
        let base = CallContext::new().with_metadata("user", "from-auth");
        let p = parts(Request::post("/").header("user", "from-header"));
        let ctx = CallHeaders::parse(&p, Format::Binary, None)
            .unwrap()
            .into_context(base);

        let values: Vec<_> = ctx.metadata().get_all("user").iter().cloned().collect();
        assert_eq!(values, vec![bytes::Bytes::from("from-auth"), bytes::Bytes::from("from-header")]);
    }

    #[tokio::test]
    async fn test_earliest_deadline_wins() {
        let base = CallContext::new().with_timeout(Duration::from_secs(1));
        let p = parts(Request::post("/").header(HEADER_TIMEOUT, "1H"));
        let ctx = CallHeaders::parse(&p, Format::Binary, None)
            .unwrap()
            .into_context(base);
        assert!(ctx.remaining().unwrap() <= Duration::from_secs(1));
    }

    #[test]
    fn test_outgoing_drops_metadata() {
        let ctx = CallContext::new().with_metadata("k", "v");
        assert!(ctx.outgoing().metadata().is_empty());
    }
}
