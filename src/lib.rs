//! pRPC: unary protobuf RPC over plain HTTP/1.1.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client                                   Server
//!     ──────                                   ──────
//!     message                                  POST /prpc/<service>/<method>
//!       → codec (Format)                         → format  (Content-Type, Accept)
//!       → headers (timeout, metadata)            → headers (timeout, metadata → CallContext)
//!       → HTTP POST ───────────────────────────▶ → codec   (body → request)
//!                                                → interceptors → handler
//!       ◀─────────────────────────────────────── → codec or status (masked, details)
//!       → status code header
//!       → codec or Status
//!
//!     Cross-cutting: config (TOML), observability (tracing, metrics)
//! ```
//!
//! Three body formats are spoken: binary protobuf, JSON with an XSSI
//! guard, and protobuf text format.

pub mod client;
pub mod codec;
pub mod config;
pub mod format;
pub mod headers;
pub mod observability;
pub mod server;
pub mod status;

pub use client::{CallOptions, Client, ClientError, ClientOptions};
pub use config::ServerConfig;
pub use format::Format;
pub use headers::Metadata;
pub use server::{CallContext, Interceptor, Server};
pub use status::{Code, Status};
