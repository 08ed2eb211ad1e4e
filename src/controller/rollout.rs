//! Rollout state read from StatefulSet status fields
//!
//! A StatefulSet has rolled out a generation only when the controller has
//! observed that generation and every replica is ready, current and updated
//! on the same revision. Readiness alone is not enough: a previous rollout's
//! ready pods would satisfy it before the new template is even looked at.

use k8s_openapi::api::apps::v1::{StatefulSet, StatefulSetStatus};

/// Replica count Kubernetes applies when `spec.replicas` is unset
pub const DEFAULT_REPLICAS: i32 = 1;

/// Desired replica count of a StatefulSet
pub fn desired_replicas(sts: &StatefulSet) -> i32 {
    sts.spec
        .as_ref()
        .and_then(|s| s.replicas)
        .unwrap_or(DEFAULT_REPLICAS)
}

/// Generation assigned by the API server, if any
pub fn generation(sts: &StatefulSet) -> Option<i64> {
    sts.metadata.generation
}

/// Whether `sts` has fully rolled out `target_generation`
pub fn has_reached_generation(sts: &StatefulSet, target_generation: i64) -> bool {
    if generation(sts) != Some(target_generation) {
        return false;
    }
    match sts.status.as_ref() {
        Some(status) => status_converged(status, target_generation, desired_replicas(sts)),
        None => false,
    }
}

/// Convergence check over the raw status fields
///
/// Absent counters read as zero and absent revisions as empty, matching how
/// the API server omits zero values.
pub fn status_converged(status: &StatefulSetStatus, target_generation: i64, desired: i32) -> bool {
    let ready = status.ready_replicas.unwrap_or(0);
    let current = status.current_replicas.unwrap_or(0);
    let updated = status.updated_replicas.unwrap_or(0);
    let current_revision = status.current_revision.as_deref().unwrap_or("");
    let update_revision = status.update_revision.as_deref().unwrap_or("");

    status.observed_generation == Some(target_generation)
        && ready == desired
        && current == desired
        && updated == desired
        && current_revision == update_revision
}

/// One-line human readable summary of a StatefulSet status for logs
pub fn describe_status(status: Option<&StatefulSetStatus>) -> String {
    let Some(status) = status else {
        return "no status".to_string();
    };
    format!(
        "observedGeneration:{} replicas:{} ready:{} current:{} updated:{} currentRevision:{} updateRevision:{}",
        status.observed_generation.unwrap_or(0),
        status.replicas,
        status.ready_replicas.unwrap_or(0),
        status.current_replicas.unwrap_or(0),
        status.updated_replicas.unwrap_or(0),
        status.current_revision.as_deref().unwrap_or(""),
        status.update_revision.as_deref().unwrap_or(""),
    )
}
