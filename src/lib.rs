#![allow(clippy::neg_cmp_op_on_partial_ord)]

pub mod config;
pub mod error;
pub mod metrics;

// Re-export commonly used types
pub use config::MetricsConfig;
pub use error::{Error, Result};
pub use metrics::{
    registry, Manifest, Metric, MetricInput, MetricOutput, MetricRegistry, RegisteredMetric,
};

// Export version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
