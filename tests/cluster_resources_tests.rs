//! Tests for the cluster desired-state mutators
//!
//! The cluster reconciler re-applies these mutators on every pass, so
//! idempotence is load-bearing: a second application with an unchanged spec
//! must produce an identical object, and scaling must only touch the
//! stateful set.

use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use etcd_operator::crd::{EtcdCluster, EtcdClusterSpec};
use etcd_operator::resources::cluster::{
    mutate_headless_service, mutate_stateful_set, APP_LABEL_KEY, APP_LABEL_VALUE,
    CLIENT_PORT, CLUSTER_LABEL_KEY, DATA_DIR_NAME, PEER_PORT,
};

// ============================================================================
// Test Helpers
// ============================================================================

fn cluster(size: i32) -> EtcdCluster {
    EtcdCluster {
        metadata: ObjectMeta {
            name: Some("demo".to_string()),
            namespace: Some("default".to_string()),
            uid: Some("c1a7e0de-0000-4000-8000-000000000002".to_string()),
            ..Default::default()
        },
        spec: EtcdClusterSpec {
            size,
            image: "quay.io/coreos/etcd:v3.5.9".to_string(),
        },
    }
}

// ============================================================================
// Headless Service
// ============================================================================

#[test]
fn headless_service_shape() {
    let mut service = Service::default();
    mutate_headless_service(&cluster(3), &mut service);

    let spec = service.spec.as_ref().unwrap();
    assert_eq!(spec.cluster_ip.as_deref(), Some("None"));

    let selector = spec.selector.as_ref().unwrap();
    assert_eq!(selector[CLUSTER_LABEL_KEY], "demo");

    let ports = spec.ports.as_ref().unwrap();
    assert_eq!(ports.len(), 2);
    assert_eq!(ports[0].name.as_deref(), Some("peer"));
    assert_eq!(ports[0].port, PEER_PORT);
    assert_eq!(ports[1].name.as_deref(), Some("client"));
    assert_eq!(ports[1].port, CLIENT_PORT);
}

#[test]
fn service_mutator_is_idempotent() {
    let cluster = cluster(3);
    let mut service = Service::default();
    mutate_headless_service(&cluster, &mut service);
    let first = service.clone();

    mutate_headless_service(&cluster, &mut service);
    assert_eq!(first, service);
}

#[test]
fn service_shape_does_not_depend_on_size() {
    let mut at_three = Service::default();
    mutate_headless_service(&cluster(3), &mut at_three);

    let mut at_five = Service::default();
    mutate_headless_service(&cluster(5), &mut at_five);

    assert_eq!(at_three, at_five);
}

// ============================================================================
// StatefulSet
// ============================================================================

#[test]
fn stateful_set_shape() {
    let mut set = StatefulSet::default();
    mutate_stateful_set(&cluster(3), &mut set);

    assert_eq!(
        set.metadata.labels.as_ref().unwrap()[APP_LABEL_KEY],
        APP_LABEL_VALUE
    );

    let spec = set.spec.as_ref().unwrap();
    assert_eq!(spec.replicas, Some(3));
    assert_eq!(spec.service_name, "demo");
    assert_eq!(
        spec.selector.match_labels.as_ref().unwrap()[CLUSTER_LABEL_KEY],
        "demo"
    );

    let pod_labels = spec
        .template
        .metadata
        .as_ref()
        .unwrap()
        .labels
        .as_ref()
        .unwrap();
    assert_eq!(pod_labels[CLUSTER_LABEL_KEY], "demo");
    assert_eq!(pod_labels[APP_LABEL_KEY], APP_LABEL_VALUE);

    let claims = spec.volume_claim_templates.as_ref().unwrap();
    assert_eq!(claims[0].metadata.name.as_deref(), Some(DATA_DIR_NAME));
    let storage = &claims[0]
        .spec
        .as_ref()
        .unwrap()
        .resources
        .as_ref()
        .unwrap()
        .requests
        .as_ref()
        .unwrap()["storage"];
    assert_eq!(storage.0, "1Gi");
}

#[test]
fn member_container_contract() {
    let mut set = StatefulSet::default();
    mutate_stateful_set(&cluster(3), &mut set);

    let container = &set
        .spec
        .as_ref()
        .unwrap()
        .template
        .spec
        .as_ref()
        .unwrap()
        .containers[0];

    assert_eq!(container.name, "etcd");
    assert_eq!(container.image.as_deref(), Some("quay.io/coreos/etcd:v3.5.9"));

    let ports = container.ports.as_ref().unwrap();
    assert_eq!(ports[0].container_port, PEER_PORT);
    assert_eq!(ports[1].container_port, CLIENT_PORT);

    let env = container.env.as_ref().unwrap();
    let by_name = |name: &str| env.iter().find(|e| e.name == name).unwrap();
    assert_eq!(by_name("INITIAL_CLUSTER_SIZE").value.as_deref(), Some("3"));
    assert_eq!(by_name("SET_NAME").value.as_deref(), Some("demo"));
    assert_eq!(
        by_name("POD_IP")
            .value_from
            .as_ref()
            .unwrap()
            .field_ref
            .as_ref()
            .unwrap()
            .field_path,
        "status.podIP"
    );
    assert_eq!(
        by_name("MY_NAMESPACE")
            .value_from
            .as_ref()
            .unwrap()
            .field_ref
            .as_ref()
            .unwrap()
            .field_path,
        "metadata.namespace"
    );

    let mounts = container.volume_mounts.as_ref().unwrap();
    assert_eq!(mounts[0].name, DATA_DIR_NAME);
    assert_eq!(mounts[0].mount_path, "/var/run/etcd");

    // Startup script bootstraps or joins based on the member ordinal.
    let command = container.command.as_ref().unwrap();
    assert_eq!(command[0], "/bin/sh");
    assert!(command[2].contains("INITIAL_CLUSTER_SIZE"));
    assert!(command[2].contains("member add"));

    // Pre-stop hook deregisters a departing member before storage reclaim.
    let pre_stop = container
        .lifecycle
        .as_ref()
        .unwrap()
        .pre_stop
        .as_ref()
        .unwrap()
        .exec
        .as_ref()
        .unwrap()
        .command
        .as_ref()
        .unwrap();
    assert!(pre_stop[2].contains("member remove"));
}

#[test]
fn stateful_set_mutator_is_idempotent() {
    let cluster = cluster(3);
    let mut set = StatefulSet::default();
    mutate_stateful_set(&cluster, &mut set);
    let first = set.clone();

    mutate_stateful_set(&cluster, &mut set);
    assert_eq!(first, set);
}

#[test]
fn scaling_updates_replicas_and_initial_cluster_size() {
    let mut set = StatefulSet::default();
    mutate_stateful_set(&cluster(3), &mut set);
    assert_eq!(set.spec.as_ref().unwrap().replicas, Some(3));

    // Re-applying with a larger spec converges the same object.
    mutate_stateful_set(&cluster(5), &mut set);
    let spec = set.spec.as_ref().unwrap();
    assert_eq!(spec.replicas, Some(5));

    let env = spec.template.spec.as_ref().unwrap().containers[0]
        .env
        .as_ref()
        .unwrap();
    let size = env.iter().find(|e| e.name == "INITIAL_CLUSTER_SIZE").unwrap();
    assert_eq!(size.value.as_deref(), Some("5"));
}
