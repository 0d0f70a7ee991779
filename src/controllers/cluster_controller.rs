//! EtcdCluster controller
//!
//! Watches EtcdCluster resources and the Service/StatefulSet pair they own,
//! re-asserting desired shape on every event.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::Service;
use kube::{
    api::ListParams,
    runtime::{
        controller::{Action, Controller},
        watcher::Config as WatcherConfig,
    },
    Api, Client, ResourceExt,
};
use tokio::time::timeout;
use tracing::{error, info, instrument};

use crate::controllers::{Context, RECONCILE_TIMEOUT};
use crate::crd::EtcdCluster;
use crate::error::{Error, Result};
use crate::metrics;
use crate::reconcilers::cluster;

/// Run the EtcdCluster controller
pub async fn run(client: Client, context: Arc<Context>) {
    let api: Api<EtcdCluster> = Api::all(client.clone());

    // Verify CRD is installed
    if let Err(e) = api.list(&ListParams::default().limit(1)).await {
        error!("EtcdCluster CRD not installed: {}", e);
        return;
    }

    info!("Starting EtcdCluster controller");

    Controller::new(api, WatcherConfig::default())
        .owns(Api::<StatefulSet>::all(client.clone()), WatcherConfig::default())
        .owns(Api::<Service>::all(client.clone()), WatcherConfig::default())
        .shutdown_on_signal()
        .run(reconcile, error_policy, context)
        .for_each(|result| async move {
            match result {
                Ok((obj, _action)) => {
                    info!(
                        name = %obj.name,
                        namespace = obj.namespace.as_deref().unwrap_or("default"),
                        "Reconciled EtcdCluster"
                    );
                }
                Err(e) => {
                    error!(error = %e, "Reconciliation error");
                    metrics::RECONCILIATION_ERRORS
                        .with_label_values(&["EtcdCluster"])
                        .inc();
                }
            }
        })
        .await;
}

/// Main reconciliation function
#[instrument(skip(ctx), fields(name = %obj.name_any(), namespace = obj.namespace()))]
async fn reconcile(obj: Arc<EtcdCluster>, ctx: Arc<Context>) -> Result<Action> {
    let _timer = metrics::RECONCILE_DURATION
        .with_label_values(&["EtcdCluster"])
        .start_timer();
    metrics::RECONCILIATIONS
        .with_label_values(&["EtcdCluster"])
        .inc();

    // Dependents are garbage-collected through owner references; a resource
    // on its way out needs no work from us.
    if obj.metadata.deletion_timestamp.is_some() {
        info!(name = %obj.name_any(), "EtcdCluster has been deleted, ignoring");
        return Ok(Action::await_change());
    }

    let namespace = obj.namespace().unwrap_or_else(|| "default".to_string());
    timeout(RECONCILE_TIMEOUT, cluster::reconcile(&obj, &ctx.client, &namespace)).await??;

    Ok(Action::await_change())
}

/// Error policy for the controller
fn error_policy(obj: Arc<EtcdCluster>, error: &Error, _ctx: Arc<Context>) -> Action {
    let name = obj.name_any();
    error!(
        name = %name,
        error = %error,
        "Reconciliation failed, scheduling retry"
    );

    let requeue_duration = match error {
        Error::Kube(_) => Duration::from_secs(30),
        Error::Validation(_) => Duration::from_secs(300),
        _ => Duration::from_secs(30),
    };

    Action::requeue(requeue_duration)
}
