//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Dispatcher, interceptors, client produce:
//!     → logging.rs (structured log events via tracing)
//!     → metrics.rs (counters and histograms via the metrics facade)
//!
//! Consumers:
//!     → stdout (pretty or JSON lines)
//!     → Prometheus scrape endpoint
//! ```
//!
//! # Design Decisions
//! - Request ID is ordinary metadata, so it reaches handlers and logs alike
//! - Per-call metrics live in an interceptor; rejections that never reach
//!   interceptors are counted by the dispatcher

pub mod logging;
pub mod metrics;

pub use self::logging::init_logging;
pub use self::metrics::{init_metrics, MetricsInterceptor};

use crate::config::ObservabilityConfig;

/// Initialize logging and, when enabled, the metrics exporter.
///
/// Must be called from within a Tokio runtime if metrics are enabled.
pub fn init(config: &ObservabilityConfig) {
    init_logging(config);
    if config.metrics_enabled {
        match config.metrics_address.parse() {
            Ok(addr) => init_metrics(addr),
            Err(e) => tracing::error!(address = %config.metrics_address, error = %e, "Invalid metrics address"),
        }
    }
}
