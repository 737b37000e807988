//! Prometheus metrics for the Kubernetes secret provider
//!
//! Metrics are registered in the default registry; the host operator exposes them.

pub mod prometheus;

pub use self::prometheus::*;
