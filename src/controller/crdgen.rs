//! # CRD Generator
//!
//! Prints the CustomResourceDefinitions as a multi-document YAML stream.
//!
//! ```bash
//! cargo run --bin crdgen > config/crd/servicecatalog.yaml
//! ```

use kube::CustomResourceExt;
use service_binding_controller::crd::{Binding, Broker, Instance, ServiceClass};

fn main() -> anyhow::Result<()> {
    let crds = [Broker::crd(), ServiceClass::crd(), Instance::crd(), Binding::crd()];
    for crd in crds {
        print!("---\n{}", serde_yaml::to_string(&crd)?);
    }
    Ok(())
}
