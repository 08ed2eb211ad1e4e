//! chi-converge - roll ClickHouse host StatefulSets out to convergence

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use futures::StreamExt;
use k8s_openapi::api::apps::v1::StatefulSet;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::runtime::{reflector, watcher, WatchStreamExt};
use kube::{Api, Client, Config, CustomResourceExt};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use chi_converge::config::{ConfigSource, FileConfigSource, ReconcileConfig};
use chi_converge::controller::{apply_manifest, Context};
use chi_converge::crd::ClickHouseInstallation;
use chi_converge::host::ResourceRef;
use chi_converge::manifest::Manifest;
use chi_converge::FIELD_MANAGER;

/// chi-converge - StatefulSet convergence engine for ClickHouse installations
#[derive(Parser, Debug)]
#[command(name = "chi-converge", version, about, long_about = None)]
struct Cli {
    /// Generate the ClickHouseInstallation CRD manifest and exit
    #[arg(long)]
    crd: bool,

    /// Path to the reconcile configuration (YAML); defaults apply when unset
    #[arg(long, env = "CHI_CONVERGE_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Path to a kubeconfig file; in-cluster or default config when unset
    #[arg(long, env = "KUBECONFIG", global = true)]
    kubeconfig: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate the reconcile configuration and print the effective values
    CheckConfig,

    /// Reconcile the objects of a manifest for one installation
    ///
    /// ConfigMaps and Services are upserted first, then each StatefulSet is
    /// created or updated and waited on until it converges. With
    /// `--interval` the manifest and configuration are re-read and the pass
    /// repeated until interrupted.
    Apply(ApplyArgs),
}

/// Apply mode arguments
#[derive(Parser, Debug)]
struct ApplyArgs {
    /// Multi-document YAML with the desired ConfigMaps, Services and StatefulSets
    #[arg(short = 'f', long = "filename")]
    manifest: PathBuf,

    /// Owning ClickHouseInstallation as <namespace>/<name>
    #[arg(long, env = "CHI_INSTALLATION")]
    installation: String,

    /// Seconds between passes; a single pass is run when unset
    #[arg(long)]
    interval: Option<u64>,

    /// Install or update the ClickHouseInstallation CRD before the first pass
    #[arg(long)]
    install_crd: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let registry = tracing_subscriber::registry().with(EnvFilter::from_default_env());
    if cli.log_json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }

    if cli.crd {
        let crd = serde_yaml::to_string(&ClickHouseInstallation::crd())
            .map_err(|e| anyhow::anyhow!("Failed to serialize CRD: {}", e))?;
        println!("{crd}");
        return Ok(());
    }

    let source = FileConfigSource::new(cli.config.clone());
    match cli.command {
        Some(Commands::CheckConfig) | None => check_config(&source),
        Some(Commands::Apply(args)) => run_apply(&source, cli.kubeconfig.as_deref(), args).await,
    }
}

/// Load the configuration and print it as YAML
fn check_config(source: &dyn ConfigSource) -> anyhow::Result<()> {
    let config = source.load()?;
    let yaml = serde_yaml::to_string(&config)
        .map_err(|e| anyhow::anyhow!("Failed to serialize configuration: {}", e))?;
    println!("{yaml}");
    Ok(())
}

async fn kube_client(kubeconfig: Option<&Path>) -> anyhow::Result<Client> {
    let client = match kubeconfig {
        Some(path) => {
            let kubeconfig = Kubeconfig::read_from(path)
                .map_err(|e| anyhow::anyhow!("Failed to read kubeconfig {:?}: {}", path, e))?;
            let config =
                Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default()).await?;
            Client::try_from(config)?
        }
        None => Client::try_default().await?,
    };
    Ok(client)
}

/// Install the ClickHouseInstallation CRD via server-side apply
async fn ensure_crd_installed(client: &Client) -> anyhow::Result<()> {
    use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
    use kube::api::{Patch, PatchParams};

    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    let params = PatchParams::apply(FIELD_MANAGER).force();

    tracing::info!("Installing ClickHouseInstallation CRD...");
    crds.patch(
        "clickhouseinstallations.clickhouse.altinity.com",
        &params,
        &Patch::Apply(&ClickHouseInstallation::crd()),
    )
    .await
    .map_err(|e| anyhow::anyhow!("Failed to install ClickHouseInstallation CRD: {}", e))?;
    Ok(())
}

/// Start a watch cache over the installation namespace's StatefulSets
///
/// The convergence waiter polls this store instead of the API server. The
/// watch task stops when `cancel` fires.
async fn start_watch_cache(
    client: &Client,
    namespace: &str,
    cancel: CancellationToken,
) -> anyhow::Result<reflector::Store<StatefulSet>> {
    let api: Api<StatefulSet> = Api::namespaced(client.clone(), namespace);
    let (reader, writer) = reflector::store();
    let stream = reflector(writer, watcher(api, watcher::Config::default()))
        .default_backoff()
        .applied_objects()
        .for_each(|result| async move {
            if let Err(e) = result {
                tracing::warn!(error = %e, "StatefulSet watch error");
            }
        });

    tokio::spawn(async move {
        tokio::select! {
            _ = cancel.cancelled() => {}
            _ = stream => {}
        }
    });

    reader
        .wait_until_ready()
        .await
        .map_err(|e| anyhow::anyhow!("StatefulSet watch cache never became ready: {}", e))?;
    Ok(reader)
}

/// Run one pass, or one pass per interval until Ctrl-C
async fn run_apply(
    source: &dyn ConfigSource,
    kubeconfig: Option<&Path>,
    args: ApplyArgs,
) -> anyhow::Result<()> {
    let installation: ResourceRef = args.installation.parse()?;
    let mut config = source.load()?;

    let client = kube_client(kubeconfig).await?;
    if args.install_crd {
        ensure_crd_installed(&client).await?;
    }

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Received Ctrl-C, cancelling reconciliation");
            shutdown.cancel();
        }
    });

    let cache = start_watch_cache(&client, &installation.namespace, cancel.clone()).await?;
    let ctx = Context::builder(client)
        .config(config.clone())
        .watch_cache(cache)
        .build();

    tracing::info!(%installation, manifest = ?args.manifest, "chi-converge starting");

    loop {
        // Configuration is re-read between passes; a broken file keeps the last good one
        match source.load() {
            Ok(reloaded) => config = reloaded,
            Err(e) => tracing::warn!(error = %e, "Failed to reload configuration, keeping previous"),
        }
        let ctx = ctx.with_config(config.clone());

        let result = run_once(&ctx, &installation, &args.manifest, &cancel).await;

        let Some(secs) = args.interval else {
            return result;
        };
        if let Err(e) = result {
            if !is_retryable(&e) {
                tracing::error!(error = %e, "Reconciliation pass failed, not retrying");
                return Err(e);
            }
            tracing::error!(error = %e, "Reconciliation pass failed, retrying next interval");
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(Duration::from_secs(secs)) => {}
        }
    }

    tracing::info!("chi-converge shutting down");
    Ok(())
}

async fn run_once(
    ctx: &Context,
    installation: &ResourceRef,
    manifest_path: &Path,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    let content = tokio::fs::read_to_string(manifest_path)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to read manifest {:?}: {}", manifest_path, e))?;
    let manifest = Manifest::from_yaml(&content, &installation.namespace)?;

    let summary = apply_manifest(ctx, installation, &manifest, cancel).await?;
    let Some(message) = summary.error_message() else {
        tracing::info!(hosts = summary.succeeded.len(), "All hosts converged");
        return Ok(());
    };
    let headline = format!(
        "{} host(s) failed, {} skipped",
        summary.failed.len(),
        summary.skipped.len()
    );
    Err(match summary.first_error {
        Some(e) => anyhow::Error::from(e).context(headline),
        None => anyhow::anyhow!("{}: {}", headline, message),
    })
}

/// Whether a failed pass is worth repeating on the next interval
///
/// Errors outside the engine (an unreadable manifest file, a dropped
/// connection) are retried. Engine errors decide for themselves: a bad
/// manifest or configuration fails the same way every pass.
fn is_retryable(err: &anyhow::Error) -> bool {
    err.downcast_ref::<chi_converge::Error>()
        .map_or(true, chi_converge::Error::is_retryable)
}
