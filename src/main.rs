//! # Service Binding Controller
//!
//! Watches `Binding` resources in all namespaces and keeps them bound at their
//! service brokers.
//!
//! ## Configuration
//!
//! Environment variables (all optional): `CONTROLLER_NAME`,
//! `PROPAGATE_TRANSIENT_FAILURES`, `BROKER_ACCEPTS_INCOMPLETE`,
//! `BROKER_REQUEST_TIMEOUT_SECS`, `RESYNC_INTERVAL_SECS`, `BACKOFF_MIN_SECS`,
//! `BACKOFF_MAX_SECS`, `METRICS_PORT`, `RUST_LOG`.

use anyhow::Result;
use service_binding_controller::runtime::{initialize, run_watch_loop};

#[tokio::main]
async fn main() -> Result<()> {
    let init = initialize().await?;

    run_watch_loop(
        init.bindings,
        init.instances,
        init.reconciler,
        init.server_state,
    )
    .await
}
