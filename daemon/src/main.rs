//! gitopsmini: keeps cluster resources in sync with manifests in git.
//!
//! # Usage
//!
//! ```text
//! gitopsmini run
//! gitopsmini sync <id> [--dry-run]
//! gitopsmini register --name <name> --repo-url <url> [--branch main] [--path ./] [--namespace default] [--auto-sync]
//! gitopsmini list
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};

use gitopsmini::config::load_engine_config;
use gitopsmini::logging::init_logging;
use gitopsmini::{
    ApplicationRegistry, AutoSyncScheduler, ClusterApi, Database, DryRunRegistry, EngineConfig,
    GitCredentials, GitManifestSource, InMemoryCluster, KubeCluster, NewApplication, SyncEngine,
    SyncStatus,
};

#[derive(Parser, Debug)]
#[command(
    name = "gitopsmini",
    version,
    about = "Synchronize cluster resources with manifests stored in git",
    long_about = None,
)]
struct Cli {
    /// Path to a JSON engine config file.
    #[arg(long, global = true, env = "GITOPSMINI_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the auto-sync scheduler until interrupted.
    Run,

    /// Sync one application now and print the run result as JSON.
    Sync {
        /// Application id.
        id: i64,

        /// Apply against an in-memory cluster instead of the live one and
        /// leave the stored sync state untouched.
        #[arg(long)]
        dry_run: bool,
    },

    /// Register an application.
    Register(RegisterArgs),

    /// List registered applications as JSON.
    List,
}

#[derive(Args, Debug)]
struct RegisterArgs {
    #[arg(long)]
    name: String,

    #[arg(long)]
    repo_url: String,

    #[arg(long, default_value = "main")]
    branch: String,

    /// Manifest directory inside the repository.
    #[arg(long, default_value = "./")]
    path: String,

    #[arg(long, default_value = "default")]
    namespace: String,

    #[arg(long)]
    description: Option<String>,

    #[arg(long)]
    auto_sync: bool,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        log::error!("Fatal error: {:#}", e);
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    let config = load_engine_config(cli.config.as_deref()).context("Failed to load config")?;
    init_logging(config.log_format).context("Failed to initialize logging")?;

    let db = Database::open(&config.database_path).with_context(|| {
        format!(
            "Failed to open database at {}",
            config.database_path.display()
        )
    })?;

    match cli.command {
        Commands::Run => run_scheduler(&config, db).await,
        Commands::Sync { id, dry_run } => sync_once(&config, db, id, dry_run).await,
        Commands::Register(args) => register(&db, args),
        Commands::List => {
            let apps = db.list_applications()?;
            println!("{}", serde_json::to_string_pretty(&apps)?);
            Ok(())
        }
    }
}

async fn build_engine(config: &EngineConfig, db: Database, dry_run: bool) -> Result<SyncEngine> {
    let cluster: Arc<dyn ClusterApi> = if dry_run {
        Arc::new(InMemoryCluster::new())
    } else {
        Arc::new(
            KubeCluster::try_default(config.cluster_timeout())
                .await
                .context("Failed to connect to the cluster")?,
        )
    };

    let source = GitManifestSource::new(
        &config.repos_dir,
        GitCredentials::from_env(&config.git_token_env_var),
        config.git_timeout(),
    );

    let registry: Arc<dyn ApplicationRegistry> = if dry_run {
        Arc::new(DryRunRegistry::new(Arc::new(db)))
    } else {
        Arc::new(db)
    };
    Ok(SyncEngine::new(registry, Arc::new(source), cluster).with_run_lease(config.run_lease()))
}

async fn run_scheduler(config: &EngineConfig, db: Database) -> Result<()> {
    let engine = Arc::new(build_engine(config, db, false).await?);
    let scheduler = AutoSyncScheduler::new(engine, config.auto_sync_interval());

    scheduler.start();
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;

    log::info!("Shutdown requested");
    if let Some(handle) = scheduler.stop() {
        if let Err(e) = handle.await {
            log::warn!("Scheduler task ended abnormally: {}", e);
        }
    }
    Ok(())
}

async fn sync_once(config: &EngineConfig, db: Database, id: i64, dry_run: bool) -> Result<()> {
    let engine = build_engine(config, db, dry_run).await?;
    let result = engine.trigger_sync(id).await?;

    println!("{}", serde_json::to_string_pretty(&result)?);
    if result.status == SyncStatus::Failed {
        bail!(
            "sync of application {} finished with {} failed manifest(s)",
            id,
            result.failed_count()
        );
    }
    Ok(())
}

fn register(db: &Database, args: RegisterArgs) -> Result<()> {
    let app = db.insert_application(&NewApplication {
        project_name: args.name,
        repo_url: args.repo_url,
        repo_path: args.path,
        branch_name: args.branch,
        namespace: args.namespace,
        description: args.description,
        auto_sync: args.auto_sync,
    })?;

    println!("{}", serde_json::to_string_pretty(&app)?);
    Ok(())
}
