//! Logging and metrics.

mod logging;
mod metrics;

pub(crate) use logging::is_known_level;
pub use logging::{init_logging, LogConfig, LogFormat};
pub use metrics::{Counter, Gauge, MetricsRegistry, PortStats};
