//! One reconciliation pass over every host of an installation
//!
//! Hosts run in parallel up to `max_concurrent_hosts`. Each host's create or
//! update and its wait stay strictly sequential. The first error stops the
//! pass: in-flight waits are cancelled and hosts not yet started are skipped.

use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::workload::WorkloadReconciler;
use super::Context;
use crate::host::{HostHandle, HostTask, ResourceRef};
use crate::manifest::Manifest;
use crate::Error;

/// Outcome of a pass
#[derive(Debug, Default)]
pub struct PassSummary {
    /// Hosts whose reconcile returned Ok, including hosts remediated under
    /// `continueOnFailure`
    pub succeeded: Vec<HostHandle>,
    /// Hosts whose reconcile returned an error other than cancellation
    pub failed: Vec<HostHandle>,
    /// Hosts never started or interrupted by cancellation
    pub skipped: Vec<HostHandle>,
    /// The error that stopped the pass
    pub first_error: Option<Error>,
}

impl PassSummary {
    /// Whether every host was reconciled without error
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.skipped.is_empty() && self.first_error.is_none()
    }

    /// Message written to the installation status when the pass did not succeed
    pub fn error_message(&self) -> Option<String> {
        if let Some(e) = &self.first_error {
            return Some(e.to_string());
        }
        if !self.skipped.is_empty() {
            return Some(format!(
                "pass cancelled with {} host(s) not reconciled",
                self.skipped.len()
            ));
        }
        None
    }

    fn record(&mut self, host: HostHandle, result: Option<Result<(), Error>>) {
        match result {
            None | Some(Err(Error::Cancelled { .. })) => self.skipped.push(host),
            Some(Ok(())) => self.succeeded.push(host),
            Some(Err(e)) => {
                self.failed.push(host);
                if self.first_error.is_none() {
                    self.first_error = Some(e);
                }
            }
        }
    }
}

/// Reconcile every task, writing pass start and end to the installation status
pub async fn run_pass(
    reconciler: &WorkloadReconciler,
    tasks: Vec<HostTask>,
    max_concurrent_hosts: usize,
    cancel: &CancellationToken,
) -> PassSummary {
    let status = reconciler.status();
    let hosts_count = u32::try_from(tasks.len()).unwrap_or(u32::MAX);
    status.begin(hosts_count).await;
    info!(
        installation = %status.installation(),
        hosts = hosts_count,
        concurrency = max_concurrent_hosts,
        "starting reconciliation pass"
    );

    // Child token: a host failure stops this pass without cancelling the caller
    let halt = cancel.child_token();

    let results: Vec<(HostHandle, Option<Result<(), Error>>)> =
        stream::iter(tasks.into_iter().map(|task| {
            let halt = halt.clone();
            async move {
                if halt.is_cancelled() {
                    return (task.host, None);
                }
                let result = reconciler
                    .reconcile_stateful_set(task.desired, &task.host, &halt)
                    .await;
                if let Err(e) = &result {
                    if !matches!(e, Error::Cancelled { .. }) {
                        error!(
                            host = %task.host.name,
                            statefulset = e.resource().map(|r| r.name.as_str()).unwrap_or(""),
                            phase = %e.phase().map(|p| p.to_string()).unwrap_or_default(),
                            retryable = e.is_retryable(),
                            error = %e,
                            "host reconciliation failed, stopping pass"
                        );
                        halt.cancel();
                    }
                }
                (task.host, Some(result))
            }
        }))
        .buffer_unordered(max_concurrent_hosts.max(1))
        .collect()
        .await;

    let mut summary = PassSummary::default();
    for (host, result) in results {
        summary.record(host, result);
    }

    if !summary.skipped.is_empty() {
        warn!(skipped = summary.skipped.len(), "hosts skipped in this pass");
    }
    info!(
        succeeded = summary.succeeded.len(),
        failed = summary.failed.len(),
        skipped = summary.skipped.len(),
        "reconciliation pass finished"
    );
    status.finish(summary.error_message()).await;
    summary
}

/// Reconcile every object of `manifest` for `installation`
///
/// ConfigMaps and Services go first, since pods read them at start-up. A
/// failure there stops before any host is touched and is returned as is.
pub async fn apply_manifest(
    ctx: &Context,
    installation: &ResourceRef,
    manifest: &Manifest,
    cancel: &CancellationToken,
) -> Result<PassSummary, Error> {
    let tasks = manifest.host_tasks(installation)?;

    let auxiliary = ctx.auxiliary_reconciler();
    for cm in &manifest.config_maps {
        auxiliary.upsert_config_map(cm.clone()).await?;
    }
    for svc in &manifest.services {
        auxiliary.upsert_service(svc.clone()).await?;
    }

    let reconciler = ctx.workload_reconciler(installation.clone());
    Ok(run_pass(&reconciler, tasks, ctx.config.max_concurrent_hosts, cancel).await)
}
