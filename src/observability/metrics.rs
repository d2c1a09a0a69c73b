//! Metrics collection and exposition.
//!
//! # Metrics
//! - `prpc_server_calls_total` (counter): calls by service, method, code
//! - `prpc_server_call_duration_seconds` (histogram): handler latency
//! - `prpc_server_rejected_total` (counter): requests refused before
//!   dispatch, by reason
//! - `prpc_client_calls_total` (counter): outgoing calls by service,
//!   method, code

use std::net::SocketAddr;
use std::time::Instant;

use futures_util::future::BoxFuture;
use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::server::{CallResult, Interceptor, MethodInfo, Next, UnaryCall};
use crate::status::Code;

/// Install the Prometheus recorder and its scrape endpoint on `addr`.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Record one completed server call.
pub fn record_call(info: &MethodInfo, code: Code, start: Instant) {
    counter!(
        "prpc_server_calls_total",
        "service" => info.service.to_string(),
        "method" => info.method.to_string(),
        "code" => code.as_str()
    )
    .increment(1);

    histogram!(
        "prpc_server_call_duration_seconds",
        "service" => info.service.to_string(),
        "method" => info.method.to_string()
    )
    .record(start.elapsed().as_secs_f64());
}

/// Record a request refused by the protocol layer.
pub fn record_rejected(reason: &'static str) {
    counter!("prpc_server_rejected_total", "reason" => reason).increment(1);
}

/// Record one outgoing call as seen by the client.
pub fn record_client_call(service: &str, method: &str, code: Code) {
    counter!(
        "prpc_client_calls_total",
        "service" => service.to_string(),
        "method" => method.to_string(),
        "code" => code.as_str()
    )
    .increment(1);
}

/// Interceptor recording per-call counters and latency.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsInterceptor;

impl Interceptor for MetricsInterceptor {
    fn intercept<'a>(&'a self, call: UnaryCall, next: Next<'a>) -> BoxFuture<'a, CallResult> {
        let info = call.info.clone();
        let start = Instant::now();
        Box::pin(async move {
            let result = next.run(call).await;
            let code = match &result {
                Ok(_) => Code::Ok,
                Err(status) => status.code(),
            };
            record_call(&info, code, start);
            result
        })
    }
}
