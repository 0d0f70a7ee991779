//! EtcdCluster reconciler
//!
//! The cluster resource carries no lifecycle phase, so reconciliation does
//! not go through a decision table: every pass unconditionally re-asserts
//! the desired shape of the headless service and the stateful set through
//! create-or-update.

use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::Service;
use kube::{Api, Client, Resource, ResourceExt};
use tracing::info;

use crate::crd::EtcdCluster;
use crate::error::{Error, Result};
use crate::metrics;
use crate::reconcilers::action::create_or_update;
use crate::resources::{mutate_headless_service, mutate_stateful_set};

/// Bring the cluster's dependent objects to their desired shape
pub async fn reconcile(cluster: &EtcdCluster, client: &Client, namespace: &str) -> Result<()> {
    let name = cluster.name_any();
    let owner_ref = cluster
        .controller_owner_ref(&())
        .ok_or(Error::MissingObjectKey("metadata.uid"))?;

    let services: Api<Service> = Api::namespaced(client.clone(), namespace);
    let outcome = create_or_update(&services, &name, |svc: &mut Service| {
        mutate_headless_service(cluster, svc);
        svc.meta_mut().owner_references = Some(vec![owner_ref.clone()]);
    })
    .await?;
    info!(name = %name, namespace = %namespace, outcome = %outcome, "Applied headless service");
    metrics::CLUSTER_APPLIES
        .with_label_values(&["Service", &outcome.to_string()])
        .inc();

    let stateful_sets: Api<StatefulSet> = Api::namespaced(client.clone(), namespace);
    let outcome = create_or_update(&stateful_sets, &name, |set: &mut StatefulSet| {
        mutate_stateful_set(cluster, set);
        set.meta_mut().owner_references = Some(vec![owner_ref.clone()]);
    })
    .await?;
    info!(name = %name, namespace = %namespace, outcome = %outcome, "Applied stateful set");
    metrics::CLUSTER_APPLIES
        .with_label_values(&["StatefulSet", &outcome.to_string()])
        .inc();

    Ok(())
}
