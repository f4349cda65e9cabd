//! # Metrics Module
//!
//! Prometheus metrics, organized by responsibility.
//!
//! ## Sub-modules
//!
//! - `registry` - Metrics registry setup and registration
//! - `controller_metrics` - Reconciliations, requeues and materialized artifacts
//! - `broker_metrics` - Requests to service brokers

pub mod broker_metrics;
pub mod controller_metrics;
pub mod registry;

pub use broker_metrics::*;
pub use controller_metrics::*;
pub use registry::*;
