//! pRPC server.
//!
//! # Data Flow
//! ```text
//! POST /prpc/<service>/<method>
//!     → TraceLayer, x-request-id
//!     → dispatch.rs
//!         → context.rs     (headers → CallContext)
//!         → codec          (body → typed request)
//!         → interceptor.rs (application interceptors → panic recovery → handler)
//!         → response.rs    (typed response or Status → HTTP response)
//! ```
//!
//! # Design Decisions
//! - Handlers are plain async functions `(CallContext, Req) -> Result<Res, Status>`
//! - The method table is built once and shared read-only across requests
//! - Non-POST requests are answered by axum's method router with 405

pub mod context;
pub mod dispatch;
pub mod interceptor;
pub mod request_id;
pub mod response;

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::Request;
use axum::response::Response;
use axum::routing::post;
use axum::Router;
use bytes::Bytes;
use futures_util::future::BoxFuture;
use prost_reflect::{DescriptorPool, ReflectMessage};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::Instrument;

use crate::codec::{self, CodecError, DecodeOptions};
use crate::config::ServerConfig;
use crate::format::Format;
use crate::status::Status;

pub use context::{CallContext, CallHeaders};
pub use interceptor::{BoxMessage, CallResult, Interceptor, MethodInfo, Next, UnaryCall};
pub use request_id::{MakeRequestUuidV4, X_REQUEST_ID};
pub use response::{write_error, write_message, ProtocolError};

use interceptor::{HandlerFn, PanicRecovery};

type DecodeFn = fn(&[u8], Format, &DecodeOptions) -> Result<BoxMessage, CodecError>;
type EncodeFn = fn(&(dyn std::any::Any + Send), Format) -> Result<Bytes, CodecError>;

/// One registered method.
pub(crate) struct MethodEntry {
    pub(crate) info: MethodInfo,
    pub(crate) decode: DecodeFn,
    pub(crate) encode: EncodeFn,
    pub(crate) handler: Box<HandlerFn>,
}

pub(crate) struct ServerInner {
    methods: HashMap<String, HashMap<String, MethodEntry>>,
    pub(crate) interceptors: Vec<Arc<dyn Interceptor>>,
    pub(crate) pool: DescriptorPool,
    pub(crate) decode_options: DecodeOptions,
    pub(crate) max_body_size: usize,
    pub(crate) max_timeout: Option<Duration>,
}

impl ServerInner {
    pub(crate) fn lookup(&self, service: &str, method: &str) -> Option<&MethodEntry> {
        self.methods.get(service)?.get(method)
    }
}

/// A set of unary methods served over pRPC.
#[derive(Clone)]
pub struct Server {
    inner: Arc<ServerInner>,
}

impl Server {
    pub fn builder() -> ServerBuilder {
        ServerBuilder::default()
    }

    /// Registered `(service, method)` pairs, sorted.
    pub fn methods(&self) -> Vec<(String, String)> {
        let mut methods: Vec<_> = self
            .inner
            .methods
            .iter()
            .flat_map(|(service, methods)| methods.keys().map(move |m| (service.clone(), m.clone())))
            .collect();
        methods.sort();
        methods
    }

    /// Build the Axum router with all middleware layers.
    pub fn into_router(self) -> Router {
        Router::new()
            .route("/prpc/{service}/{method}", post(handle))
            .with_state(self)
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::x_request_id(MakeRequestUuidV4))
                    .layer(TraceLayer::new_for_http())
                    .layer(PropagateRequestIdLayer::x_request_id()),
            )
    }

    /// Serve on `listener` until Ctrl+C.
    pub async fn serve(self, listener: TcpListener) -> Result<(), std::io::Error> {
        self.serve_with_shutdown(listener, shutdown_signal()).await
    }

    /// Serve on `listener` until `signal` resolves.
    pub async fn serve_with_shutdown<F>(self, listener: TcpListener, signal: F) -> Result<(), std::io::Error>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, methods = self.inner.methods.values().map(HashMap::len).sum::<usize>(), "pRPC server starting");

        axum::serve(listener, self.into_router())
            .with_graceful_shutdown(signal)
            .await?;

        tracing::info!("pRPC server stopped");
        Ok(())
    }
}

async fn handle(
    State(server): State<Server>,
    Path((service, method)): Path<(String, String)>,
    request: Request<Body>,
) -> Response {
    let span = tracing::info_span!("prpc", service = %service, method = %method);
    dispatch::dispatch(&server.inner, &service, &method, request)
        .instrument(span)
        .await
}

/// Wait for shutdown signal (Ctrl+C).
async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Shutdown signal received"),
        Err(e) => {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    }
}

/// Collects methods, interceptors and limits for a [`Server`].
pub struct ServerBuilder {
    methods: HashMap<String, HashMap<String, MethodEntry>>,
    interceptors: Vec<Arc<dyn Interceptor>>,
    pool: DescriptorPool,
    decode_options: DecodeOptions,
    max_body_size: usize,
    max_timeout: Option<Duration>,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        let config = ServerConfig::default();
        Self {
            methods: HashMap::new(),
            interceptors: Vec::new(),
            pool: DescriptorPool::global(),
            decode_options: config.codec.decode_options(),
            max_body_size: config.limits.max_body_size,
            max_timeout: config.limits.max_timeout(),
        }
    }
}

impl ServerBuilder {
    /// Apply limits and codec settings from a loaded config.
    pub fn with_config(mut self, config: &ServerConfig) -> Self {
        self.decode_options = config.codec.decode_options();
        self.max_body_size = config.limits.max_body_size;
        self.max_timeout = config.limits.max_timeout();
        self
    }

    /// Pool used to expand status details in JSON and text responses.
    pub fn with_descriptor_pool(mut self, pool: DescriptorPool) -> Self {
        self.pool = pool;
        self
    }

    pub fn max_body_size(mut self, bytes: usize) -> Self {
        self.max_body_size = bytes;
        self
    }

    pub fn max_timeout(mut self, timeout: Duration) -> Self {
        self.max_timeout = Some(timeout);
        self
    }

    pub fn decode_options(mut self, options: DecodeOptions) -> Self {
        self.decode_options = options;
        self
    }

    /// Append an interceptor. The first one added runs outermost.
    pub fn interceptor(mut self, interceptor: impl Interceptor) -> Self {
        self.interceptors.push(Arc::new(interceptor));
        self
    }

    /// Register a unary method. A later registration of the same name
    /// replaces the earlier one.
    pub fn register<Req, Res, F, Fut>(mut self, service: &str, method: &str, handler: F) -> Self
    where
        Req: ReflectMessage + Default + 'static,
        Res: ReflectMessage + 'static,
        F: Fn(CallContext, Req) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Res, Status>> + Send + 'static,
    {
        let handler = Arc::new(handler);
        let erased: Box<HandlerFn> = Box::new(move |call: UnaryCall| -> BoxFuture<'static, CallResult> {
            let handler = handler.clone();
            Box::pin(async move {
                let UnaryCall { ctx, request, .. } = call;
                let request = request
                    .downcast::<Req>()
                    .map_err(|_| Status::internal("request replaced with a different message type"))?;
                let response = handler(ctx, *request).await?;
                Ok::<BoxMessage, Status>(Box::new(response))
            })
        });

        let entry = MethodEntry {
            info: MethodInfo::new(service, method),
            decode: decode_boxed::<Req>,
            encode: encode_boxed::<Res>,
            handler: erased,
        };
        self.methods
            .entry(service.to_string())
            .or_default()
            .insert(method.to_string(), entry);
        self
    }

    pub fn build(self) -> Server {
        let mut interceptors = self.interceptors;
        interceptors.push(Arc::new(PanicRecovery));
        Server {
            inner: Arc::new(ServerInner {
                methods: self.methods,
                interceptors,
                pool: self.pool,
                decode_options: self.decode_options,
                max_body_size: self.max_body_size,
                max_timeout: self.max_timeout,
            }),
        }
    }
}

fn decode_boxed<M: ReflectMessage + Default + 'static>(
    body: &[u8],
    format: Format,
    options: &DecodeOptions,
) -> Result<BoxMessage, CodecError> {
    let mut message = M::default();
    codec::decode_with_options(body, format, &mut message, options)?;
    Ok(Box::new(message))
}

fn encode_boxed<M: ReflectMessage + 'static>(
    message: &(dyn std::any::Any + Send),
    format: Format,
) -> Result<Bytes, CodecError> {
    let message = message
        .downcast_ref::<M>()
        .ok_or_else(|| CodecError::Encode("response replaced with a different message type".to_string()))?;
    codec::encode(message, format).map(|(body, _)| body)
}
