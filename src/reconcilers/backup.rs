//! EtcdBackup reconciler
//!
//! Each pass rebuilds a [`BackupState`] from scratch (the resource, the
//! observed agent pod, the desired agent pod) and feeds it to a decision
//! table that selects at most one [`Action`]. Nothing is cached between
//! passes; a pass with no matching row is a no-op and relies on the next
//! watch event to re-trigger reconciliation.

use chrono::Utc;
use k8s_openapi::api::core::v1::Pod;
use kube::{Api, Client, ResourceExt};
use tracing::{info, warn};

use crate::crd::{EtcdBackup, EtcdBackupPhase};
use crate::error::Result;
use crate::reconcilers::action::Action;
use crate::resources::pod_for_backup;

/// Observed and desired state for one EtcdBackup, rebuilt every pass
#[derive(Clone, Debug, Default)]
pub struct BackupState {
    /// The resource itself; `None` means it was deleted and the pass stops
    pub backup: Option<EtcdBackup>,

    /// The agent pod as observed; `None` means not started yet
    pub actual: Option<Pod>,

    /// The agent pod as it should look, synthesized from the spec
    pub desired: Option<Pod>,
}

/// Fetch the resource and its dependent pod
///
/// Not-found is a valid outcome at both levels: a missing resource yields an
/// empty state, a missing pod yields `actual: None`. Any other API error
/// fails the pass and is retried by the controller runtime.
pub async fn observe(client: &Client, namespace: &str, name: &str) -> Result<BackupState> {
    let backups: Api<EtcdBackup> = Api::namespaced(client.clone(), namespace);
    let Some(backup) = backups.get_opt(name).await? else {
        return Ok(BackupState::default());
    };

    let pods: Api<Pod> = Api::namespaced(client.clone(), namespace);
    let actual = pods.get_opt(name).await?;
    let desired = pod_for_backup(&backup)?;

    Ok(BackupState {
        backup: Some(backup),
        actual,
        desired: Some(desired),
    })
}

/// Select the next action for the observed state
///
/// Rows are evaluated in strict priority order and the first match wins:
/// deleted resource, deletion marker, unset phase, terminal phases, missing
/// pod, pod failed, pod succeeded. A still-running pod matches no row.
pub fn next_action(state: &BackupState) -> Option<Action> {
    let Some(backup) = &state.backup else {
        info!("Backup object not found, ignoring");
        return None;
    };
    let name = backup.name_any();

    if backup.metadata.deletion_timestamp.is_some() {
        info!(name = %name, "Backup object has been deleted, ignoring");
        return None;
    }

    match backup.status.as_ref().and_then(|s| s.phase) {
        None => {
            info!(name = %name, "Backup starting, updating status");
            Some(transition(backup, EtcdBackupPhase::BackingUp))
        }
        Some(EtcdBackupPhase::Failed) => {
            info!(name = %name, "Backup has failed, ignoring");
            None
        }
        Some(EtcdBackupPhase::Completed) => {
            info!(name = %name, "Backup has completed, ignoring");
            None
        }
        Some(EtcdBackupPhase::BackingUp) => match &state.actual {
            None => {
                info!(name = %name, "Backup pod does not exist, creating");
                let Some(pod) = state.desired.clone() else {
                    warn!(name = %name, "No desired pod computed, skipping pass");
                    return None;
                };
                Some(Action::CreateObject { pod })
            }
            Some(pod) => match pod_phase(pod) {
                Some("Failed") => {
                    info!(name = %name, "Backup pod failed, updating status");
                    Some(transition(backup, EtcdBackupPhase::Failed))
                }
                Some("Succeeded") => {
                    info!(name = %name, "Backup pod succeeded, updating status");
                    Some(transition(backup, EtcdBackupPhase::Completed))
                }
                _ => {
                    info!(name = %name, "Backup pod still running");
                    None
                }
            },
        },
    }
}

/// Build the status patch moving `backup` to `phase`
///
/// Stamps `startTime` when the backup begins and `completionTime` when it
/// reaches a terminal phase.
fn transition(backup: &EtcdBackup, phase: EtcdBackupPhase) -> Action {
    let mut updated = backup.clone();
    let status = updated.status.get_or_insert_with(Default::default);
    status.phase = Some(phase);
    if phase == EtcdBackupPhase::BackingUp {
        status.start_time = Some(Utc::now());
    }
    if phase.is_terminal() {
        status.completion_time = Some(Utc::now());
    }
    Action::PatchStatus {
        original: backup.clone(),
        updated,
    }
}

fn pod_phase(pod: &Pod) -> Option<&str> {
    pod.status.as_ref().and_then(|s| s.phase.as_deref())
}
