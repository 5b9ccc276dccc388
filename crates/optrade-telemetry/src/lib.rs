//! Structured logging and Prometheus metrics, shared by every crate in the
//! workspace that needs to observe itself.

mod error;
pub mod metrics;
mod logging;

pub use error::{Result, TelemetryError};
pub use logging::init_logging;

/// Render every registered metric in the Prometheus text exposition format,
/// for a `/metrics` scrape handler.
pub fn render_metrics() -> Result<String> {
    use prometheus::Encoder;
    let families = prometheus::gather();
    let encoder = prometheus::TextEncoder::new();
    let mut buf = Vec::new();
    encoder
        .encode(&families, &mut buf)
        .map_err(|e| TelemetryError::Metrics(e.to_string()))?;
    String::from_utf8(buf).map_err(|e| TelemetryError::Metrics(e.to_string()))
}
