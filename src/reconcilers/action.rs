//! Idempotent side effects selected by the reconcilers
//!
//! The decision table emits at most one [`Action`] per pass; executing it is
//! the only place a backup pass touches the API server. The cluster
//! reconciler goes through [`create_or_update`] instead, which re-asserts
//! desired shape unconditionally.

use std::fmt;

use k8s_openapi::api::core::v1::Pod;
use kube::api::PostParams;
use kube::{Api, Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info};

use crate::crd::EtcdBackup;
use crate::error::Result;

/// One side-effecting operation chosen for this pass
#[derive(Clone, Debug)]
pub enum Action {
    /// Status-only update, applied only if the two snapshots differ.
    ///
    /// `original` is the object as observed this pass and doubles as the
    /// optimistic-concurrency baseline; a concurrent writer makes the
    /// update fail with a conflict, which the caller surfaces as a
    /// retryable error.
    PatchStatus {
        original: EtcdBackup,
        updated: EtcdBackup,
    },

    /// Creation of the backup agent pod.
    ///
    /// Only emitted when the pod was observed absent; losing a create race
    /// to another actor is an error, not something to swallow.
    CreateObject { pod: Pod },
}

/// Whether a status patch would write nothing
pub fn status_unchanged(original: &EtcdBackup, updated: &EtcdBackup) -> bool {
    original.status == updated.status
}

impl Action {
    /// Execute the action against the API server
    pub async fn execute(self, client: &Client) -> Result<()> {
        match self {
            Action::PatchStatus { original, updated } => {
                if status_unchanged(&original, &updated) {
                    debug!(name = %updated.name_any(), "Status unchanged, skipping patch");
                    return Ok(());
                }
                let namespace = updated.namespace().unwrap_or_else(|| "default".to_string());
                let name = updated.name_any();
                let api: Api<EtcdBackup> = Api::namespaced(client.clone(), &namespace);
                // replace_status carries the observed resourceVersion, so a
                // concurrent writer fails this call with a 409.
                api.replace_status(&name, &PostParams::default(), serde_json::to_vec(&updated)?)
                    .await?;
                info!(name = %name, namespace = %namespace, "Patched backup status");
            }
            Action::CreateObject { pod } => {
                let namespace = pod.namespace().unwrap_or_else(|| "default".to_string());
                let name = pod.name_any();
                let api: Api<Pod> = Api::namespaced(client.clone(), &namespace);
                api.create(&PostParams::default(), &pod).await?;
                info!(name = %name, namespace = %namespace, "Created backup pod");
            }
        }
        Ok(())
    }
}

/// Outcome of a create-or-update application
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ApplyOutcome {
    Created,
    Updated,
    Unchanged,
}

impl fmt::Display for ApplyOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApplyOutcome::Created => f.write_str("created"),
            ApplyOutcome::Updated => f.write_str("updated"),
            ApplyOutcome::Unchanged => f.write_str("unchanged"),
        }
    }
}

/// Fetch-or-initialize an object by name, bring it to desired shape with
/// `mutate`, and persist the result.
///
/// The mutation function must be idempotent: applied to an already-converged
/// object it must produce an identical one, in which case no write is
/// issued. Updates go through `replace`, so the fetched resourceVersion
/// guards against concurrent writers.
pub async fn create_or_update<K, F>(api: &Api<K>, name: &str, mutate: F) -> Result<ApplyOutcome>
where
    K: Resource + Clone + fmt::Debug + Default + PartialEq + DeserializeOwned + Serialize,
    F: Fn(&mut K),
{
    match api.get_opt(name).await? {
        Some(existing) => {
            let mut desired = existing.clone();
            mutate(&mut desired);
            if desired == existing {
                return Ok(ApplyOutcome::Unchanged);
            }
            api.replace(name, &PostParams::default(), &desired).await?;
            Ok(ApplyOutcome::Updated)
        }
        None => {
            let mut desired = K::default();
            desired.meta_mut().name = Some(name.to_string());
            mutate(&mut desired);
            api.create(&PostParams::default(), &desired).await?;
            Ok(ApplyOutcome::Created)
        }
    }
}
