//! Integration tests for chi-converge
//!
//! These tests require a Kubernetes cluster (kind) and tell the story of how
//! ClickHouse hosts are rolled out against a real API server and a real
//! StatefulSet controller.
//!
//! # Test Organization
//!
//! - `installation_status`: Stories about the ClickHouseInstallation CRD and
//!   the host counters written to its status subresource
//!
//! - `rollout`: Stories about creating and updating host StatefulSets,
//!   waiting for convergence, and the delete/rollback failure policies
//!
//! # Running These Tests
//!
//! ```bash
//! cargo test --test kind -- --ignored --nocapture
//! ```

mod helpers;
mod installation_status;
mod rollout;
