//! Custom Resource Definitions for the etcd operator

mod etcd_backup;
mod etcd_cluster;

pub use etcd_backup::*;
pub use etcd_cluster::*;

use kube::CustomResourceExt;

/// Generate all CRD YAML manifests
pub fn generate_crds() -> Vec<String> {
    vec![
        serde_yaml::to_string(&EtcdBackup::crd()).unwrap(),
        serde_yaml::to_string(&EtcdCluster::crd()).unwrap(),
    ]
}
