pub mod metrics;
pub mod tracing_setup;

pub use metrics::{serve_metrics, LivenessChecking};
