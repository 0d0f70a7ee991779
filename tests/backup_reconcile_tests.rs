//! Tests for the backup decision table and desired-state synthesis
//!
//! These cover the pure core of the backup reconciler: the priority order
//! of the decision table, the no-op guarantee of status patches, and the
//! shape of the synthesized agent pod.

use chrono::Utc;
use k8s_openapi::api::core::v1::{Pod, PodStatus};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};

use etcd_operator::crd::{
    BackupStorageType, EtcdBackup, EtcdBackupPhase, EtcdBackupSpec, EtcdBackupStatus,
    OssBackupSource, S3BackupSource,
};
use etcd_operator::reconcilers::action::status_unchanged;
use etcd_operator::reconcilers::backup::{next_action, BackupState};
use etcd_operator::reconcilers::Action;
use etcd_operator::resources::pod_for_backup;

// ============================================================================
// Test Helpers
// ============================================================================

fn s3_backup() -> EtcdBackup {
    EtcdBackup {
        metadata: ObjectMeta {
            name: Some("test-backup".to_string()),
            namespace: Some("default".to_string()),
            uid: Some("c1a7e0de-0000-4000-8000-000000000001".to_string()),
            ..Default::default()
        },
        spec: EtcdBackupSpec {
            etcd_url: "http://etcd-client:2379".to_string(),
            image: "oso/etcd-backup-agent:latest".to_string(),
            storage_type: BackupStorageType::S3,
            s3: Some(S3BackupSource {
                path: "bucket/key".to_string(),
                secret: "s3-creds".to_string(),
                endpoint: Some("http://minio:9000".to_string()),
            }),
            oss: None,
        },
        status: None,
    }
}

fn with_phase(mut backup: EtcdBackup, phase: EtcdBackupPhase) -> EtcdBackup {
    backup.status = Some(EtcdBackupStatus {
        phase: Some(phase),
        start_time: Some(Utc::now()),
        completion_time: None,
    });
    backup
}

fn pod_in_phase(phase: &str) -> Pod {
    Pod {
        metadata: ObjectMeta {
            name: Some("test-backup".to_string()),
            namespace: Some("default".to_string()),
            ..Default::default()
        },
        status: Some(PodStatus {
            phase: Some(phase.to_string()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn state_for(backup: Option<EtcdBackup>, actual: Option<Pod>) -> BackupState {
    let desired = backup.as_ref().map(|b| pod_for_backup(b).unwrap());
    BackupState {
        backup,
        actual,
        desired,
    }
}

// ============================================================================
// Decision Table Priority Order
// ============================================================================

#[test]
fn deleted_resource_yields_no_action() {
    let state = state_for(None, None);
    assert!(next_action(&state).is_none());
}

#[test]
fn deletion_marker_wins_over_unset_phase() {
    // Both "unset phase" and "marked for deletion" hold; deletion has the
    // higher priority and must win.
    let mut backup = s3_backup();
    backup.metadata.deletion_timestamp = Some(Time(Utc::now()));

    let state = state_for(Some(backup), None);
    assert!(next_action(&state).is_none());
}

#[test]
fn unset_phase_starts_backing_up() {
    let state = state_for(Some(s3_backup()), None);

    match next_action(&state) {
        Some(Action::PatchStatus { original, updated }) => {
            assert!(original.status.is_none());
            let status = updated.status.expect("status set");
            assert_eq!(status.phase, Some(EtcdBackupPhase::BackingUp));
            assert!(status.start_time.is_some());
            assert!(status.completion_time.is_none());
        }
        other => panic!("expected PatchStatus, got {:?}", other),
    }
}

#[test]
fn backing_up_without_pod_creates_agent_pod() {
    let backup = with_phase(s3_backup(), EtcdBackupPhase::BackingUp);
    let state = state_for(Some(backup), None);

    match next_action(&state) {
        Some(Action::CreateObject { pod }) => {
            let args = pod.spec.as_ref().unwrap().containers[0]
                .args
                .clone()
                .unwrap();
            assert_eq!(
                args,
                vec![
                    "--etcd-url",
                    "http://etcd-client:2379",
                    "--bucketname",
                    "s3://bucket/key",
                    "--objectname",
                    "snapshot.db",
                ]
            );
        }
        other => panic!("expected CreateObject, got {:?}", other),
    }
}

#[test]
fn running_pod_is_a_noop() {
    let backup = with_phase(s3_backup(), EtcdBackupPhase::BackingUp);
    let state = state_for(Some(backup), Some(pod_in_phase("Running")));
    assert!(next_action(&state).is_none());
}

#[test]
fn failed_pod_marks_backup_failed() {
    let backup = with_phase(s3_backup(), EtcdBackupPhase::BackingUp);
    let state = state_for(Some(backup), Some(pod_in_phase("Failed")));

    match next_action(&state) {
        Some(Action::PatchStatus { updated, .. }) => {
            let status = updated.status.expect("status set");
            assert_eq!(status.phase, Some(EtcdBackupPhase::Failed));
            assert!(status.completion_time.is_some());
        }
        other => panic!("expected PatchStatus, got {:?}", other),
    }
}

#[test]
fn succeeded_pod_marks_backup_completed() {
    let backup = with_phase(s3_backup(), EtcdBackupPhase::BackingUp);
    let state = state_for(Some(backup), Some(pod_in_phase("Succeeded")));

    match next_action(&state) {
        Some(Action::PatchStatus { updated, .. }) => {
            let status = updated.status.expect("status set");
            assert_eq!(status.phase, Some(EtcdBackupPhase::Completed));
            assert!(status.completion_time.is_some());
        }
        other => panic!("expected PatchStatus, got {:?}", other),
    }
}

#[test]
fn failed_phase_is_terminal() {
    // Even a succeeded pod must not move a Failed backup.
    let backup = with_phase(s3_backup(), EtcdBackupPhase::Failed);
    let state = state_for(Some(backup), Some(pod_in_phase("Succeeded")));
    assert!(next_action(&state).is_none());
}

#[test]
fn completed_phase_is_terminal() {
    let backup = with_phase(s3_backup(), EtcdBackupPhase::Completed);
    let state = state_for(Some(backup), Some(pod_in_phase("Failed")));
    assert!(next_action(&state).is_none());
}

// ============================================================================
// Status Patch No-Op Guard
// ============================================================================

#[test]
fn identical_snapshots_skip_the_patch() {
    let backup = with_phase(s3_backup(), EtcdBackupPhase::BackingUp);
    assert!(status_unchanged(&backup, &backup.clone()));
}

#[test]
fn differing_snapshots_require_a_patch() {
    let original = with_phase(s3_backup(), EtcdBackupPhase::BackingUp);
    let updated = with_phase(s3_backup(), EtcdBackupPhase::Completed);
    assert!(!status_unchanged(&original, &updated));
}

// ============================================================================
// Desired-State Synthesis
// ============================================================================

#[test]
fn synthesis_is_deterministic() {
    let backup = s3_backup();
    assert_eq!(pod_for_backup(&backup).unwrap(), pod_for_backup(&backup).unwrap());
}

#[test]
fn agent_pod_shape() {
    let pod = pod_for_backup(&s3_backup()).unwrap();

    let owner = &pod.metadata.owner_references.as_ref().unwrap()[0];
    assert_eq!(owner.kind, "EtcdBackup");
    assert_eq!(owner.name, "test-backup");
    assert_eq!(owner.controller, Some(true));

    let spec = pod.spec.as_ref().unwrap();
    assert_eq!(spec.restart_policy.as_deref(), Some("Never"));

    let container = &spec.containers[0];
    assert_eq!(container.name, "etcd-backup");
    assert_eq!(container.image.as_deref(), Some("oso/etcd-backup-agent:latest"));

    let env = container.env.as_ref().unwrap();
    assert_eq!(env[0].name, "ENDPOINT");
    assert_eq!(env[0].value.as_deref(), Some("http://minio:9000"));

    let secret_ref = container.env_from.as_ref().unwrap()[0]
        .secret_ref
        .as_ref()
        .unwrap();
    assert_eq!(secret_ref.name, "s3-creds");

    let resources = container.resources.as_ref().unwrap();
    let limits = resources.limits.as_ref().unwrap();
    assert_eq!(limits["cpu"].0, "100m");
    assert_eq!(limits["memory"].0, "50Mi");
    assert_eq!(resources.requests.as_ref(), Some(limits));
}

#[test]
fn oss_variant_builds_oss_bucket_url() {
    let mut backup = s3_backup();
    backup.spec.storage_type = BackupStorageType::Oss;
    backup.spec.s3 = None;
    backup.spec.oss = Some(OssBackupSource {
        path: "oss-bucket/backups".to_string(),
        secret: "oss-creds".to_string(),
        endpoint: None,
    });

    let pod = pod_for_backup(&backup).unwrap();
    let args = pod.spec.as_ref().unwrap().containers[0]
        .args
        .clone()
        .unwrap();
    assert!(args.contains(&"oss://oss-bucket/backups".to_string()));

    // Absent endpoint is injected as an empty value, not omitted.
    let env = &pod.spec.as_ref().unwrap().containers[0].env.as_ref().unwrap()[0];
    assert_eq!(env.value.as_deref(), Some(""));
}

#[test]
fn s3_kind_without_s3_config_fails_validation() {
    let mut backup = s3_backup();
    backup.spec.s3 = None;

    let err = pod_for_backup(&backup).unwrap_err();
    assert!(err.to_string().contains("s3"));
}

#[test]
fn oss_kind_without_oss_config_fails_validation() {
    let mut backup = s3_backup();
    backup.spec.storage_type = BackupStorageType::Oss;

    let err = pod_for_backup(&backup).unwrap_err();
    assert!(err.to_string().contains("oss"));
}
