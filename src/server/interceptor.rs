//! Unary interceptor chain.
//!
//! # Responsibilities
//! - Define the interceptor seam around every handler invocation
//! - Run registered interceptors outermost first
//! - Turn a panic in application code into an `INTERNAL` status
//!
//! # Design Decisions
//! - Requests and responses travel type-erased; the dispatcher owns
//!   decoding and encoding so interceptors never see wire bytes
//! - Panic recovery is the innermost link and always present

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;

use super::context::CallContext;
use crate::status::Status;

/// A decoded request or a handler's response.
pub type BoxMessage = Box<dyn Any + Send>;

/// Outcome of one call through the chain.
pub type CallResult = Result<BoxMessage, Status>;

/// Type-erased handler at the end of the chain.
pub(crate) type HandlerFn = dyn Fn(UnaryCall) -> BoxFuture<'static, CallResult> + Send + Sync;

/// Service and method a call is addressed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodInfo {
    pub service: Arc<str>,
    pub method: Arc<str>,
}

impl MethodInfo {
    pub fn new(service: &str, method: &str) -> Self {
        Self {
            service: service.into(),
            method: method.into(),
        }
    }

    /// `/prpc/<service>/<method>`
    pub fn path(&self) -> String {
        format!("/prpc/{}/{}", self.service, self.method)
    }
}

/// A call in flight.
pub struct UnaryCall {
    pub ctx: CallContext,
    pub info: MethodInfo,
    pub request: BoxMessage,
}

impl UnaryCall {
    /// Typed view of the request, if it is an `M`.
    pub fn request<M: 'static>(&self) -> Option<&M> {
        self.request.downcast_ref()
    }
}

/// Code that wraps every handler invocation.
///
/// Call `next.run(call)` to continue down the chain, or return early to
/// short-circuit it.
pub trait Interceptor: Send + Sync + 'static {
    fn intercept<'a>(&'a self, call: UnaryCall, next: Next<'a>) -> BoxFuture<'a, CallResult>;
}

/// Remainder of the chain after the current interceptor.
pub struct Next<'a> {
    interceptors: &'a [Arc<dyn Interceptor>],
    handler: &'a HandlerFn,
}

impl<'a> Next<'a> {
    pub(crate) fn new(interceptors: &'a [Arc<dyn Interceptor>], handler: &'a HandlerFn) -> Self {
        Self {
            interceptors,
            handler,
        }
    }

    pub fn run(self, call: UnaryCall) -> BoxFuture<'a, CallResult> {
        match self.interceptors.split_first() {
            Some((first, rest)) => first.intercept(call, Next::new(rest, self.handler)),
            None => {
                let handler = self.handler;
                Box::pin(async move { handler(call).await })
            }
        }
    }
}

/// Converts a panic below it into `INTERNAL`.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct PanicRecovery;

impl Interceptor for PanicRecovery {
    fn intercept<'a>(&'a self, call: UnaryCall, next: Next<'a>) -> BoxFuture<'a, CallResult> {
        let info = call.info.clone();
        Box::pin(async move {
            match AssertUnwindSafe(next.run(call)).catch_unwind().await {
                Ok(result) => result,
                Err(panic) => {
                    let message = panic_message(panic.as_ref());
                    tracing::error!(
                        service = %info.service,
                        method = %info.method,
                        panic = %message,
                        "Handler panicked"
                    );
                    Err(Status::internal(format!("handler panicked: {message}")))
                }
            }
        })
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
