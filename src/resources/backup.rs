//! Desired-state synthesis for the backup agent pod
//!
//! An `EtcdBackup` is realised as a single one-shot pod running the backup
//! agent. Synthesis is a pure function of the spec, so the same resource
//! always yields an identical pod.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{
    Container, EnvFromSource, EnvVar, LocalObjectReference, Pod, PodSpec, ResourceRequirements,
    SecretEnvSource,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::{Resource, ResourceExt};

use crate::crd::{BackupStorageType, EtcdBackup};
use crate::error::{Error, Result};

/// Container name of the backup agent
const AGENT_CONTAINER_NAME: &str = "etcd-backup";

/// Object name the agent writes into the bucket
const SNAPSHOT_OBJECT_NAME: &str = "snapshot.db";

/// Fixed CPU request and limit for the agent container
const AGENT_CPU: &str = "100m";

/// Fixed memory request and limit for the agent container
const AGENT_MEMORY: &str = "50Mi";

/// Destination resolved from the spec's storage variant
struct BackupDestination {
    bucket_url: String,
    endpoint: String,
    secret: String,
}

/// Resolve the storage variant selected by `storageType`
///
/// Selecting a variant whose configuration block is absent is a spec error,
/// surfaced as a validation failure rather than a panic.
fn destination_for(backup: &EtcdBackup) -> Result<BackupDestination> {
    match backup.spec.storage_type {
        BackupStorageType::S3 => {
            let s3 = backup.spec.s3.as_ref().ok_or_else(|| {
                Error::validation("storageType is s3 but the s3 configuration is missing")
            })?;
            Ok(BackupDestination {
                bucket_url: format!("{}://{}", backup.spec.storage_type.scheme(), s3.path),
                endpoint: s3.endpoint.clone().unwrap_or_default(),
                secret: s3.secret.clone(),
            })
        }
        BackupStorageType::Oss => {
            let oss = backup.spec.oss.as_ref().ok_or_else(|| {
                Error::validation("storageType is oss but the oss configuration is missing")
            })?;
            Ok(BackupDestination {
                bucket_url: format!("{}://{}", backup.spec.storage_type.scheme(), oss.path),
                endpoint: oss.endpoint.clone().unwrap_or_default(),
                secret: oss.secret.clone(),
            })
        }
    }
}

/// Build the one-shot backup agent pod for an `EtcdBackup`
///
/// The pod carries a controller owner reference so that deleting the
/// `EtcdBackup` garbage-collects the pod. Restart policy is `Never`;
/// completion is observed through the pod phase, not through restarts.
pub fn pod_for_backup(backup: &EtcdBackup) -> Result<Pod> {
    let destination = destination_for(backup)?;

    let owner_ref = backup
        .controller_owner_ref(&())
        .ok_or(Error::MissingObjectKey("metadata.uid"))?;

    let resources: BTreeMap<String, Quantity> = [
        ("cpu".to_string(), Quantity(AGENT_CPU.to_string())),
        ("memory".to_string(), Quantity(AGENT_MEMORY.to_string())),
    ]
    .into();

    Ok(Pod {
        metadata: ObjectMeta {
            name: Some(backup.name_any()),
            namespace: backup.namespace(),
            owner_references: Some(vec![owner_ref]),
            ..Default::default()
        },
        spec: Some(PodSpec {
            containers: vec![Container {
                name: AGENT_CONTAINER_NAME.to_string(),
                image: Some(backup.spec.image.clone()),
                args: Some(vec![
                    "--etcd-url".to_string(),
                    backup.spec.etcd_url.clone(),
                    "--bucketname".to_string(),
                    destination.bucket_url,
                    "--objectname".to_string(),
                    SNAPSHOT_OBJECT_NAME.to_string(),
                ]),
                env: Some(vec![EnvVar {
                    name: "ENDPOINT".to_string(),
                    value: Some(destination.endpoint),
                    ..Default::default()
                }]),
                env_from: Some(vec![EnvFromSource {
                    secret_ref: Some(SecretEnvSource {
                        name: destination.secret,
                        ..Default::default()
                    }),
                    ..Default::default()
                }]),
                resources: Some(ResourceRequirements {
                    limits: Some(resources.clone()),
                    requests: Some(resources),
                    ..Default::default()
                }),
                ..Default::default()
            }],
            restart_policy: Some("Never".to_string()),
            ..Default::default()
        }),
        ..Default::default()
    })
}
