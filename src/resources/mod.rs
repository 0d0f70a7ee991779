//! Desired-state builders
//!
//! Pure functions that turn a custom resource spec into the target shape of
//! its dependent objects. No API calls happen here; the reconcilers decide
//! whether and how the results are applied.

pub mod backup;
pub mod cluster;

pub use backup::pod_for_backup;
pub use cluster::{mutate_headless_service, mutate_stateful_set};
