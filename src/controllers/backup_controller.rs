//! EtcdBackup controller
//!
//! Watches EtcdBackup resources and the agent pods they own, and drives
//! each event through the backup decision table.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use k8s_openapi::api::core::v1::Pod;
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
use crate::crd::EtcdBackup;
use crate::error::{Error, Result};
use crate::metrics;
use crate::reconcilers::backup;

/// Run the EtcdBackup controller
pub async fn run(client: Client, context: Arc<Context>) {
    let api: Api<EtcdBackup> = Api::all(client.clone());

    // Verify CRD is installed
    if let Err(e) = api.list(&ListParams::default().limit(1)).await {
        error!("EtcdBackup CRD not installed: {}", e);
        return;
    }

    info!("Starting EtcdBackup controller");

    Controller::new(api, WatcherConfig::default())
        .owns(Api::<Pod>::all(client.clone()), WatcherConfig::default())
        .shutdown_on_signal()
        .run(reconcile, error_policy, context)
        .for_each(|result| async move {
            match result {
                Ok((obj, _action)) => {
                    info!(
                        name = %obj.name,
                        namespace = obj.namespace.as_deref().unwrap_or("default"),
                        "Reconciled EtcdBackup"
                    );
                }
                Err(e) => {
                    error!(error = %e, "Reconciliation error");
                    metrics::RECONCILIATION_ERRORS
                        .with_label_values(&["EtcdBackup"])
                        .inc();
                }
            }
        })
        .await;
}

/// Main reconciliation function
#[instrument(skip(ctx), fields(name = %obj.name_any(), namespace = obj.namespace()))]
async fn reconcile(obj: Arc<EtcdBackup>, ctx: Arc<Context>) -> Result<Action> {
    let _timer = metrics::RECONCILE_DURATION
        .with_label_values(&["EtcdBackup"])
        .start_timer();
    metrics::RECONCILIATIONS
        .with_label_values(&["EtcdBackup"])
        .inc();

    let namespace = obj.namespace().unwrap_or_else(|| "default".to_string());
    let name = obj.name_any();

    timeout(RECONCILE_TIMEOUT, apply(&name, &namespace, &ctx)).await??;

    // Passes are stateless; whatever happens next is driven by the watch.
    Ok(Action::await_change())
}

/// One stateless pass: observe, decide, execute at most one action
async fn apply(name: &str, namespace: &str, ctx: &Context) -> Result<()> {
    let state = backup::observe(&ctx.client, namespace, name).await?;
    if let Some(action) = backup::next_action(&state) {
        action.execute(&ctx.client).await?;
    }
    Ok(())
}

/// Error policy for the controller
fn error_policy(obj: Arc<EtcdBackup>, error: &Error, _ctx: Arc<Context>) -> Action {
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
