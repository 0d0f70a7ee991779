//! Kubernetes controllers for the etcd operator CRDs
//!
//! This module contains the controller implementations that watch for CRD
//! changes and trigger reconciliation.

mod backup_controller;
mod cluster_controller;

pub use backup_controller::run as run_backup_controller;
pub use cluster_controller::run as run_cluster_controller;

use std::time::Duration;

use kube::Client;

/// Wall-clock bound on a single reconciliation pass
pub const RECONCILE_TIMEOUT: Duration = Duration::from_secs(60);

/// Shared context for all controllers
pub struct Context {
    /// Kubernetes client
    pub client: Client,
}

impl Context {
    /// Create a new context
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}
