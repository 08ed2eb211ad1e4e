//! chi-converge - StatefulSet convergence engine for ClickHouse installations
//!
//! Drives one StatefulSet per ClickHouse host toward its desired spec: create
//! or update the workload, wait for the platform to roll the new generation
//! out, and apply a configurable recovery policy when it does not converge.
//! Progress is reported as host counters on the owning
//! `ClickHouseInstallation`.
//!
//! # Modules
//!
//! - [`controller`] - Convergence waiter, create/update paths, failure policy and pass driver
//! - [`client`] - Traits over the Kubernetes API with kube-rs implementations
//! - [`config`] - Failure policy and timing configuration
//! - [`crd`] - The ClickHouseInstallation resource and its status
//! - [`host`] - Identity types linking workloads to hosts and installations
//! - [`manifest`] - Desired objects read from a multi-document manifest
//! - [`error`] - Error types for the engine

#![deny(missing_docs)]

pub mod client;
pub mod config;
pub mod controller;
pub mod crd;
pub mod error;
pub mod host;
pub mod manifest;

pub use error::Error;

/// Field manager recorded on every write made by the engine
pub const FIELD_MANAGER: &str = "chi-converge";
