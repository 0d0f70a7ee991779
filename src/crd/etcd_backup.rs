//! EtcdBackup Custom Resource Definition

use chrono::{DateTime, Utc};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// EtcdBackup resource specification
///
/// Declares a one-shot backup of an etcd cluster: the operator launches a
/// backup-agent pod that streams a snapshot to the configured object store.
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "etcd.oso.sh",
    version = "v1alpha1",
    kind = "EtcdBackup",
    plural = "etcdbackups",
    singular = "etcdbackup",
    shortname = "eb",
    namespaced,
    status = "EtcdBackupStatus",
    printcolumn = r#"{"name": "Phase", "type": "string", "jsonPath": ".status.phase"}"#,
    printcolumn = r#"{"name": "Started", "type": "string", "jsonPath": ".status.startTime"}"#,
    printcolumn = r#"{"name": "Completed", "type": "string", "jsonPath": ".status.completionTime"}"#,
    printcolumn = r#"{"name": "Age", "type": "date", "jsonPath": ".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct EtcdBackupSpec {
    /// Client URL of the etcd cluster to snapshot
    pub etcd_url: String,

    /// Backup agent image reference
    pub image: String,

    /// Storage backend for the snapshot (s3 or oss)
    pub storage_type: BackupStorageType,

    /// S3 destination configuration
    #[serde(skip_serializing_if = "Option::is_none")]
    pub s3: Option<S3BackupSource>,

    /// OSS destination configuration
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oss: Option<OssBackupSource>,
}

/// Storage backend kind
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum BackupStorageType {
    S3,
    Oss,
}

impl BackupStorageType {
    /// URL scheme used when composing the destination bucket URL
    pub fn scheme(&self) -> &'static str {
        match self {
            BackupStorageType::S3 => "s3",
            BackupStorageType::Oss => "oss",
        }
    }
}

/// S3 destination for backups
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct S3BackupSource {
    /// Path within the bucket, e.g. "my-bucket/backups"
    pub path: String,

    /// Name of the secret holding the access credentials
    pub secret: String,

    /// Custom endpoint (for MinIO, Ceph, etc.)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

/// OSS destination for backups
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct OssBackupSource {
    /// Path within the bucket
    pub path: String,

    /// Name of the secret holding the access credentials
    pub secret: String,

    /// Custom OSS endpoint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

/// Backup lifecycle phase
///
/// Transitions are one-directional: unset -> BackingUp -> Completed | Failed.
/// Completed and Failed are terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum EtcdBackupPhase {
    BackingUp,
    Completed,
    Failed,
}

impl EtcdBackupPhase {
    /// Whether this phase admits no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(self, EtcdBackupPhase::Completed | EtcdBackupPhase::Failed)
    }
}

/// EtcdBackup status
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EtcdBackupStatus {
    /// Current lifecycle phase
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<EtcdBackupPhase>,

    /// When the backup pod was first scheduled
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,

    /// When the backup reached a terminal phase
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completion_time: Option<DateTime<Utc>>,
}
