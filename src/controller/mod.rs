//! # Controller
//!
//! Binding reconciliation, error backoff and the probe/metrics HTTP server.

pub mod backoff;
pub mod reconciler;
pub mod server;
