//! # SBCTL CLI
//!
//! Command-line interface for the Service Binding Controller.
//!
//! ## Usage
//!
//! ```bash
//! # Trigger reconciliation for a Binding
//! sbctl reconcile --namespace shop --name orders-db
//!
//! # List Bindings
//! sbctl list
//!
//! # Show status of a Binding
//! sbctl status --namespace shop --name orders-db
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use kube::{
    api::{Api, ListParams, Patch, PatchParams},
    Client,
};
use serde_json::json;
use service_binding_controller::constants::{CONDITION_READY, RECONCILE_ANNOTATION};
use service_binding_controller::crd::{Binding, ConditionStatus};

/// Service Binding Controller CLI
#[derive(Parser)]
#[command(name = "sbctl")]
#[command(about = "Service Binding Controller CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Kubernetes namespace (defaults to `default` for single-resource commands)
    #[arg(short, long, global = true)]
    namespace: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Trigger reconciliation of a Binding
    Reconcile {
        /// Name of the Binding
        #[arg(long)]
        name: String,
    },
    /// List Bindings (all namespaces unless --namespace is given)
    List,
    /// Show status of a Binding
    Status {
        /// Name of the Binding
        #[arg(long)]
        name: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sbctl=info".into()),
        )
        .init();

    let cli = Cli::parse();

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client. Ensure kubeconfig is configured.")?;

    match cli.command {
        Commands::Reconcile { name } => reconcile_command(client, &name, cli.namespace).await,
        Commands::List => list_command(client, cli.namespace).await,
        Commands::Status { name } => status_command(client, &name, cli.namespace).await,
    }
}

/// Trigger reconciliation by updating an annotation the controller sees as a change
async fn reconcile_command(client: Client, name: &str, namespace: Option<String>) -> Result<()> {
    let ns = namespace.as_deref().unwrap_or("default");
    println!("Triggering reconciliation for Binding '{ns}/{name}'...");

    let api: Api<Binding> = Api::namespaced(client, ns);
    let timestamp = chrono::Utc::now().to_rfc3339();
    let mut annotations = serde_json::Map::new();
    annotations.insert(RECONCILE_ANNOTATION.to_string(), json!(timestamp));
    let patch = json!({ "metadata": { "annotations": annotations } });

    api.patch(name, &PatchParams::default(), &Patch::Merge(patch))
        .await
        .with_context(|| format!("Failed to trigger reconciliation for '{ns}/{name}'"))?;

    println!("✅ Reconciliation triggered successfully");
    println!("   Resource: {ns}/{name}");
    println!("   Timestamp: {timestamp}");
    Ok(())
}

fn ready_summary(binding: &Binding) -> (&'static str, String) {
    match binding.ready_condition() {
        Some(c) => {
            let status = match c.status {
                ConditionStatus::True => "True",
                ConditionStatus::False => "False",
                ConditionStatus::Unknown => "Unknown",
            };
            (status, c.reason.clone())
        }
        None => ("Unknown", "-".to_string()),
    }
}

async fn list_command(client: Client, namespace: Option<String>) -> Result<()> {
    let api: Api<Binding> = match namespace.as_deref() {
        Some(ns) => Api::namespaced(client, ns),
        None => Api::all(client),
    };

    let bindings = api
        .list(&ListParams::default())
        .await
        .context("Failed to list Binding resources")?;

    if bindings.items.is_empty() {
        println!("No Binding resources found.");
        return Ok(());
    }

    println!(
        "{:<30} {:<20} {:<25} {:<8} {:<30}",
        "NAME", "NAMESPACE", "INSTANCE", CONDITION_READY.to_uppercase(), "REASON"
    );
    for binding in &bindings.items {
        let (ready, reason) = ready_summary(binding);
        println!(
            "{:<30} {:<20} {:<25} {:<8} {:<30}",
            binding.metadata.name.as_deref().unwrap_or("<unknown>"),
            binding.metadata.namespace.as_deref().unwrap_or("<unknown>"),
            binding.spec.instance_ref.name,
            ready,
            reason
        );
    }
    Ok(())
}

async fn status_command(client: Client, name: &str, namespace: Option<String>) -> Result<()> {
    let ns = namespace.as_deref().unwrap_or("default");
    let api: Api<Binding> = Api::namespaced(client, ns);
    let binding = api
        .get(name)
        .await
        .with_context(|| format!("Failed to get Binding '{ns}/{name}'"))?;

    println!("Binding {}", binding.qualified_name());
    println!("  Instance:    {}", binding.qualified_instance_name());
    println!("  Secret:      {}", binding.spec.secret_name);
    println!("  External ID: {}", binding.spec.external_id);
    if let Some(preset) = &binding.spec.pod_preset_template {
        println!("  Pod preset:  {}", preset.name);
    }
    if binding.is_deleting() {
        println!("  Deleting:    yes");
    }

    let Some(status) = &binding.status else {
        println!("\nStatus: not reconciled yet");
        return Ok(());
    };

    if let Some(operation) = status.current_operation {
        println!(
            "\nOperation in progress: {} (key: {}, since {})",
            operation,
            status.operation_key.as_deref().unwrap_or("-"),
            status.operation_start_time.as_deref().unwrap_or("-")
        );
    }

    println!("\nConditions:");
    for condition in &status.conditions {
        println!("  {}: {:?}", condition.r#type, condition.status);
        println!("    Reason: {}", condition.reason);
        println!("    Message: {}", condition.message);
        if let Some(time) = &condition.last_transition_time {
            println!("    Last Transition: {time}");
        }
    }
    Ok(())
}
