//! # Service Binding Controller
//!
//! A Kubernetes controller that binds applications to service Instances offered
//! by Open Service Brokers.
//!
//! For every `Binding` the controller resolves the referenced Instance,
//! ServiceClass, Plan and Broker, asks the broker to create a binding, and writes
//! the returned credentials into a Secret (plus an optional pod preset). When the
//! Binding is deleted it unbinds at the broker and removes those artifacts before
//! releasing its finalizer.
//!
//! Progress is reported through a single `Ready` condition on the Binding and a
//! matching Kubernetes Event.

pub mod broker;
pub mod cluster;
pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod error;
pub mod observability;
pub mod runtime;

pub use crd::{Binding, BindingSpec, BindingStatus};
