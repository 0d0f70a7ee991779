//! etcd Kubernetes Operator
//!
//! This operator manages etcd clusters and one-shot etcd backups in
//! Kubernetes using Custom Resource Definitions (CRDs).

pub mod controllers;
pub mod crd;
pub mod error;
pub mod metrics;
pub mod reconcilers;
pub mod resources;

pub use error::{Error, Result};
