//! mender - reconciliation scheduler CLI.
//!
//! Meant to be invoked periodically (cron, systemd timer). Each `mender run`
//! fills the gaps between the availability inventory and the artifact
//! inventory, then exits 0 (all good, or nothing to do) or 1 (a job failed or
//! setup failed).

mod report;
mod settings;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mender_core::app::{InventoryLoader, RunFilter, detect, group};
use mender_core::domain::{EntityRegistry, TaskType};
use mender_core::impls::JsonFileInventory;
use mender_core::{
    AcquireMode, DependencyPolicy, LockManager, RunRequest, SchedulerBuilder,
};
use mender_core::lock::LockError;

use report::OutputFormat;
use settings::Settings;

#[derive(Debug, Parser)]
#[command(name = "mender", version, about = "Fill the gaps between available data and produced artifacts")]
struct Cli {
    /// Settings file.
    #[arg(long, short, env = "MENDER_CONFIG", default_value = "mender.toml", global = true)]
    config: PathBuf,

    /// Output format for stdout.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text, global = true)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Detect gaps and execute them.
    Run(RunArgs),
    /// Print detected gaps without locking or executing.
    Gaps(FilterArgs),
    /// Inspect or reclaim the execution lock.
    Lock {
        #[command(subcommand)]
        action: LockAction,
    },
}

#[derive(Debug, Clone, Default, Args)]
struct FilterArgs {
    /// Only this entity (registry code).
    #[arg(long)]
    entity: Option<String>,

    /// Only this task type.
    #[arg(long)]
    task_type: Option<TaskType>,

    /// Only periods in or after this year.
    #[arg(long)]
    min_year: Option<u16>,
}

#[derive(Debug, Args)]
struct RunArgs {
    #[command(flatten)]
    filter: FilterArgs,

    /// Override `max_concurrent_groups`.
    #[arg(long)]
    concurrency: Option<usize>,

    /// What to do with a job whose prerequisite failed (attempt|skip).
    #[arg(long)]
    dependency_policy: Option<DependencyPolicy>,

    /// Report planned jobs without executing them.
    #[arg(long)]
    dry_run: bool,

    /// Skip the execution lock. Local testing only.
    #[arg(long, conflicts_with = "lock_timeout")]
    no_lock: bool,

    /// Give up waiting for the lock after this many seconds.
    #[arg(long, value_name = "SECS")]
    lock_timeout: Option<u64>,
}

impl RunArgs {
    fn lock_mode(&self) -> AcquireMode {
        match (self.no_lock, self.lock_timeout) {
            (true, _) => AcquireMode::Bypass,
            (false, Some(secs)) => AcquireMode::Bounded(Duration::from_secs(secs)),
            (false, None) => AcquireMode::Blocking,
        }
    }
}

#[derive(Debug, Subcommand)]
enum LockAction {
    /// Show the holder pid, age and liveness.
    Status,
    /// Remove the marker if its holder is no longer running.
    Reclaim,
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new("warn,mender_core=info,mender=info")
            }),
        )
        .init();

    let cli = Cli::parse();

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("error: cannot start runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(execute(cli)) {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "setup failed");
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn execute(cli: Cli) -> Result<ExitCode> {
    let settings = Settings::load(&cli.config)?;
    match cli.command {
        Commands::Run(args) => run(settings, args, cli.format).await,
        Commands::Gaps(filter) => gaps(settings, filter, cli.format).await,
        Commands::Lock { action } => lock(settings, action, cli.format),
    }
}

fn load_registry(settings: &Settings) -> Result<EntityRegistry> {
    let path = settings.registry_path()?;
    EntityRegistry::load(path).with_context(|| format!("loading entity registry {}", path.display()))
}

fn resolve_filter(registry: &EntityRegistry, args: &FilterArgs) -> Result<RunFilter> {
    let mut filter = RunFilter::all();
    if let Some(code) = &args.entity {
        let entity = registry
            .by_code(code)
            .with_context(|| format!("unknown entity code {code:?}"))?;
        filter = filter.with_entity(entity.id.clone());
    }
    if let Some(t) = args.task_type {
        filter = filter.with_task_type(t);
    }
    if let Some(year) = args.min_year {
        filter = filter.with_min_year(year);
    }
    Ok(filter)
}

async fn run(mut settings: Settings, args: RunArgs, format: OutputFormat) -> Result<ExitCode> {
    if let Some(n) = args.concurrency {
        settings.scheduler.max_concurrent_groups = n;
    }
    if let Some(policy) = args.dependency_policy {
        settings.scheduler.dependency_policy = policy;
    }
    if args.no_lock {
        tracing::warn!("--no-lock: running without the execution lock");
    }

    let registry = load_registry(&settings)?;
    let filter = resolve_filter(&registry, &args.filter)?;
    let inventory = JsonFileInventory::new(settings.inventory_dir()?);

    let mut builder = SchedulerBuilder::new()
        .config(settings.scheduler.clone())
        .registry(registry)
        .inventory(Arc::new(inventory))
        .router(settings.router()?);
    if args.dry_run {
        // dry runs never call the executor, so routes are optional
        builder = builder.expect_task_types(&[]);
    }
    let scheduler = builder.build().context("building scheduler")?;

    let request = RunRequest {
        filter,
        dry_run: args.dry_run,
        lock_mode: args.lock_mode(),
    };

    // Dropping the run future drops the lock handle, which removes the marker.
    let summary = tokio::select! {
        res = scheduler.run(request) => res?,
        () = shutdown_signal() => {
            tracing::warn!("interrupted; execution lock released");
            return Ok(ExitCode::FAILURE);
        }
    };

    print!("{}", report::summary(&summary, format)?);
    Ok(ExitCode::from(u8::try_from(summary.exit_code()).unwrap_or(1)))
}

async fn gaps(settings: Settings, args: FilterArgs, format: OutputFormat) -> Result<ExitCode> {
    let registry = Arc::new(load_registry(&settings)?);
    let filter = resolve_filter(&registry, &args)?;
    let inventory = Arc::new(JsonFileInventory::new(settings.inventory_dir()?));

    let loader = InventoryLoader::new(inventory, registry);
    let snapshot = loader.load(&filter).await.context("loading inventory")?;
    let groups = group(detect(&snapshot));

    print!("{}", report::groups(&groups, format)?);
    Ok(ExitCode::SUCCESS)
}

fn lock(settings: Settings, action: LockAction, format: OutputFormat) -> Result<ExitCode> {
    let manager = LockManager::new(
        settings.scheduler.lock_path.clone(),
        settings.scheduler.lock_poll_interval(),
    );
    match action {
        LockAction::Status => {
            let status = manager.inspect().map_err(|e| {
                let corrupt = matches!(e, LockError::Corrupt { .. });
                let err = anyhow::Error::new(e);
                if corrupt {
                    err.context("`mender lock reclaim` removes an unreadable marker")
                } else {
                    err
                }
            })?;
            print!("{}", report::lock_status(status.as_ref(), format)?);
        }
        LockAction::Reclaim => {
            let outcome = manager.reclaim_stale()?;
            print!("{}", report::reclaim(&outcome));
        }
    }
    Ok(ExitCode::SUCCESS)
}

/// Ctrl-C, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "cannot listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
