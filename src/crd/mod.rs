//! Custom Resource Definitions used by the convergence engine

mod installation;

pub use installation::{
    ClickHouseInstallation, ClickHouseInstallationSpec, ClickHouseInstallationStatus,
    ReconcilePhase,
};
