//! Client and per-call options.

use std::time::Duration;

use bytes::Bytes;
use prost_reflect::DescriptorPool;

use crate::codec::DecodeOptions;
use crate::format::Format;
use crate::headers::Metadata;

/// Defaults applied to every call made by a client.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Request and response body format.
    pub format: Format,

    /// Timeout for calls that set none.
    pub timeout: Option<Duration>,

    /// Sent as `User-Agent`; empty sends none.
    pub user_agent: String,

    /// Resolves status detail types in JSON and text error responses.
    pub pool: DescriptorPool,

    pub decode_options: DecodeOptions,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            format: Format::Binary,
            timeout: None,
            user_agent: format!("prpc-rust/{}", env!("CARGO_PKG_VERSION")),
            pool: DescriptorPool::global(),
            decode_options: DecodeOptions::default(),
        }
    }
}

impl ClientOptions {
    pub fn format(mut self, format: Format) -> Self {
        self.format = format;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn descriptor_pool(mut self, pool: DescriptorPool) -> Self {
        self.pool = pool;
        self
    }
}

/// Overrides for a single call.
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    pub format: Option<Format>,
    pub timeout: Option<Duration>,

    /// Sent in addition to the context's metadata.
    pub metadata: Metadata,
}

impl CallOptions {
    pub fn format(mut self, format: Format) -> Self {
        self.format = Some(format);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn metadata(mut self, key: impl AsRef<str>, value: impl Into<Bytes>) -> Self {
        self.metadata.append(key, value);
        self
    }
}
