//! Reconciliation engine
//!
//! State observation, the backup decision table, and the action executors.
//! Reconcilers compute once per pass and surface failures; retry and
//! backoff belong to the controller runtime.

pub mod action;
pub mod backup;
pub mod cluster;

pub use action::{create_or_update, Action, ApplyOutcome};
