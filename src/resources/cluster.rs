//! Desired-state synthesis for the etcd cluster
//!
//! An `EtcdCluster` is realised as a headless discovery Service plus a
//! StatefulSet. Both are expressed as mutation functions so the cluster
//! reconciler can apply them through the create-or-update path; applying a
//! mutator twice with an unchanged spec yields an identical object.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{StatefulSet, StatefulSetSpec};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EnvVar, EnvVarSource, ExecAction, Lifecycle, LifecycleHandler,
    ObjectFieldSelector, PersistentVolumeClaim, PersistentVolumeClaimSpec, PodSpec,
    PodTemplateSpec, Service, ServicePort, ServiceSpec, VolumeMount,
    VolumeResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use kube::ResourceExt;

use crate::crd::EtcdCluster;

/// Label key selecting the members of one named cluster
pub const CLUSTER_LABEL_KEY: &str = "etcd.oso.sh/cluster";

/// Common app label applied to everything the operator creates
pub const APP_LABEL_KEY: &str = "app";

/// Common app label value
pub const APP_LABEL_VALUE: &str = "etcd";

/// Name of the per-member data volume
pub const DATA_DIR_NAME: &str = "datadir";

/// etcd peer port
pub const PEER_PORT: i32 = 2380;

/// etcd client port
pub const CLIENT_PORT: i32 = 2379;

/// Member startup script, run as the etcd container command.
///
/// Each member derives its ordinal from its hostname. Ordinals at or above
/// INITIAL_CLUSTER_SIZE join the already-running cluster (removing a stale
/// membership entry first if one exists); lower ordinals wait for all their
/// siblings to resolve and then bootstrap a fresh cluster together. This
/// contract is what makes scale-up and scale-down converge.
const BOOTSTRAP_SCRIPT: &str = r#"
HOSTNAME=$(hostname)
ETCDCTL_API=3
eps() {
    EPS=""
    for i in $(seq 0 $((${INITIAL_CLUSTER_SIZE} - 1))); do
        EPS="${EPS}${EPS:+,}http://${SET_NAME}-${i}.${SET_NAME}.${MY_NAMESPACE}.svc.cluster.local:2379"
    done
    echo ${EPS}
}
member_hash() {
    etcdctl member list | grep -w "$HOSTNAME" | awk '{ print $1}' | awk -F "," '{ print $1}'
}
initial_peers() {
    PEERS=""
    for i in $(seq 0 $((${INITIAL_CLUSTER_SIZE} - 1))); do
        PEERS="${PEERS}${PEERS:+,}${SET_NAME}-${i}=http://${SET_NAME}-${i}.${SET_NAME}.${MY_NAMESPACE}.svc.cluster.local:2380"
    done
    echo ${PEERS}
}
SET_ID=${HOSTNAME##*-}
echo "set id is ${SET_ID}"
# Ordinals beyond the initial size join the existing cluster.
if [ "${SET_ID}" -ge ${INITIAL_CLUSTER_SIZE} ]; then
    MEMBER_HASH=$(member_hash)
    if [ -n "${MEMBER_HASH}" ]; then
        # A stale entry without a datadir blocks rejoining; drop it first.
        echo "Remove member ${MEMBER_HASH}"
        etcdctl --endpoints=$(eps) member remove ${MEMBER_HASH}
    fi
    echo "Adding new member"
    etcdctl member --endpoints=$(eps) add ${HOSTNAME} --peer-urls=http://${HOSTNAME}.${SET_NAME}.${MY_NAMESPACE}.svc.cluster.local:2380 | grep "^ETCD_" > /var/run/etcd/new_member_envs
    if [ $? -ne 0 ]; then
        echo "member add ${HOSTNAME} error."
        rm -f /var/run/etcd/new_member_envs
        exit 1
    fi
    echo "==> Loading env vars of existing cluster..."
    sed -ie "s/^/export /" /var/run/etcd/new_member_envs
    cat /var/run/etcd/new_member_envs
    . /var/run/etcd/new_member_envs
    exec etcd --listen-peer-urls http://${POD_IP}:2380 \
        --listen-client-urls http://${POD_IP}:2379,http://127.0.0.1:2379 \
        --advertise-client-urls http://${HOSTNAME}.${SET_NAME}.${MY_NAMESPACE}.svc.cluster.local:2379 \
        --data-dir /var/run/etcd/default.etcd
fi
for i in $(seq 0 $((${INITIAL_CLUSTER_SIZE} - 1))); do
    while true; do
        echo "Waiting for ${SET_NAME}-${i}.${SET_NAME}.${MY_NAMESPACE}.svc.cluster.local to come up"
        ping -W 1 -c 1 ${SET_NAME}-${i}.${SET_NAME}.${MY_NAMESPACE}.svc.cluster.local > /dev/null && break
        sleep 1s
    done
done
echo "join member ${HOSTNAME}"
exec etcd --name ${HOSTNAME} \
    --initial-advertise-peer-urls http://${HOSTNAME}.${SET_NAME}.${MY_NAMESPACE}.svc.cluster.local:2380 \
    --listen-peer-urls http://${POD_IP}:2380 \
    --listen-client-urls http://${POD_IP}:2379,http://127.0.0.1:2379 \
    --advertise-client-urls http://${HOSTNAME}.${SET_NAME}.${MY_NAMESPACE}.svc.cluster.local:2379 \
    --initial-cluster-token etcd-cluster-1 \
    --data-dir /var/run/etcd/default.etcd \
    --initial-cluster $(initial_peers) \
    --initial-cluster-state new"#;

/// Pre-stop hook: deregister a departing member before its storage goes
/// away, so a stale membership entry cannot cost the cluster quorum.
const PRE_STOP_SCRIPT: &str = r#"
HOSTNAME=$(hostname)

member_hash() {
    etcdctl member list | grep -w "$HOSTNAME" | awk '{ print $1}' | awk -F "," '{ print $1}'
}

eps() {
    EPS=""
    for i in $(seq 0 $((${INITIAL_CLUSTER_SIZE} - 1))); do
        EPS="${EPS}${EPS:+,}http://${SET_NAME}-${i}.${SET_NAME}.${MY_NAMESPACE}.svc.cluster.local:2379"
    done
    echo ${EPS}
}

export ETCDCTL_ENDPOINTS=$(eps)
SET_ID=${HOSTNAME##*-}

if [ "${SET_ID}" -ge ${INITIAL_CLUSTER_SIZE} ]; then
    echo "Removing ${HOSTNAME} from etcd cluster"
    etcdctl member remove $(member_hash)
    if [ $? -eq 0 ]; then
        # Leftover state would block a later scale-up of the same ordinal.
        rm -rf /var/run/etcd/*
    fi
fi"#;

fn member_labels(cluster: &EtcdCluster) -> BTreeMap<String, String> {
    [
        (CLUSTER_LABEL_KEY.to_string(), cluster.name_any()),
        (APP_LABEL_KEY.to_string(), APP_LABEL_VALUE.to_string()),
    ]
    .into()
}

/// Bring a Service to the desired headless discovery shape
///
/// No cluster IP is assigned; the service exists so members can resolve
/// each other by stable DNS names.
pub fn mutate_headless_service(cluster: &EtcdCluster, service: &mut Service) {
    service.metadata.labels = Some(
        [(APP_LABEL_KEY.to_string(), APP_LABEL_VALUE.to_string())].into(),
    );
    service.spec = Some(ServiceSpec {
        cluster_ip: Some("None".to_string()),
        selector: Some([(CLUSTER_LABEL_KEY.to_string(), cluster.name_any())].into()),
        ports: Some(vec![
            ServicePort {
                name: Some("peer".to_string()),
                port: PEER_PORT,
                ..Default::default()
            },
            ServicePort {
                name: Some("client".to_string()),
                port: CLIENT_PORT,
                ..Default::default()
            },
        ]),
        ..Default::default()
    });
}

/// Bring a StatefulSet to the desired member-group shape
pub fn mutate_stateful_set(cluster: &EtcdCluster, set: &mut StatefulSet) {
    set.metadata.labels = Some(
        [(APP_LABEL_KEY.to_string(), APP_LABEL_VALUE.to_string())].into(),
    );
    set.spec = Some(StatefulSetSpec {
        replicas: Some(cluster.spec.size),
        service_name: cluster.name_any(),
        selector: LabelSelector {
            match_labels: Some([(CLUSTER_LABEL_KEY.to_string(), cluster.name_any())].into()),
            ..Default::default()
        },
        template: PodTemplateSpec {
            metadata: Some(ObjectMeta {
                labels: Some(member_labels(cluster)),
                ..Default::default()
            }),
            spec: Some(PodSpec {
                containers: vec![etcd_container(cluster)],
                ..Default::default()
            }),
        },
        volume_claim_templates: Some(vec![PersistentVolumeClaim {
            metadata: ObjectMeta {
                name: Some(DATA_DIR_NAME.to_string()),
                ..Default::default()
            },
            spec: Some(PersistentVolumeClaimSpec {
                access_modes: Some(vec!["ReadWriteOnce".to_string()]),
                resources: Some(VolumeResourceRequirements {
                    requests: Some(
                        [("storage".to_string(), Quantity("1Gi".to_string()))].into(),
                    ),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        }]),
        ..Default::default()
    });
}

fn etcd_container(cluster: &EtcdCluster) -> Container {
    Container {
        name: "etcd".to_string(),
        image: Some(cluster.spec.image.clone()),
        ports: Some(vec![
            ContainerPort {
                name: Some("peer".to_string()),
                container_port: PEER_PORT,
                ..Default::default()
            },
            ContainerPort {
                name: Some("client".to_string()),
                container_port: CLIENT_PORT,
                ..Default::default()
            },
        ]),
        env: Some(vec![
            EnvVar {
                name: "INITIAL_CLUSTER_SIZE".to_string(),
                value: Some(cluster.spec.size.to_string()),
                ..Default::default()
            },
            EnvVar {
                name: "SET_NAME".to_string(),
                value: Some(cluster.name_any()),
                ..Default::default()
            },
            EnvVar {
                name: "POD_IP".to_string(),
                value_from: Some(EnvVarSource {
                    field_ref: Some(ObjectFieldSelector {
                        field_path: "status.podIP".to_string(),
                        ..Default::default()
                    }),
                    ..Default::default()
                }),
                ..Default::default()
            },
            EnvVar {
                name: "MY_NAMESPACE".to_string(),
                value_from: Some(EnvVarSource {
                    field_ref: Some(ObjectFieldSelector {
                        field_path: "metadata.namespace".to_string(),
                        ..Default::default()
                    }),
                    ..Default::default()
                }),
                ..Default::default()
            },
        ]),
        volume_mounts: Some(vec![VolumeMount {
            name: DATA_DIR_NAME.to_string(),
            mount_path: "/var/run/etcd".to_string(),
            ..Default::default()
        }]),
        command: Some(vec![
            "/bin/sh".to_string(),
            "-ec".to_string(),
            BOOTSTRAP_SCRIPT.to_string(),
        ]),
        lifecycle: Some(Lifecycle {
            pre_stop: Some(LifecycleHandler {
                exec: Some(ExecAction {
                    command: Some(vec![
                        "/bin/sh".to_string(),
                        "-ec".to_string(),
                        PRE_STOP_SCRIPT.to_string(),
                    ]),
                }),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}
