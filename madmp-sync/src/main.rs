//! madmp-sync - maDMP to repository record synchronization
//!
//! Runs the HTTP service the DMP tool talks to, or performs one-off
//! maintenance tasks (imports, listings, deletions) from the command line.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio::signal;
use tracing::{error, info, warn};

use madmp_common::db::init_database;
use madmp_common::madmp::MadmpDocument;
use madmp_common::{EventBus, MadmpConfig, MadmpEvent};
use madmp_sync::api::dmps::{DatasetSummary, DmpSummary};
use madmp_sync::convert::ConverterRegistry;
use madmp_sync::notify::{DmpToolClient, NotifyPolicy, Observer};
use madmp_sync::repository::users;
use madmp_sync::store::{DataManagementPlan, Dataset};
use madmp_sync::{build_router, AppState, Reconciler, Store, SyncMode};

const EVENT_BUS_CAPACITY: usize = 256;

#[derive(Parser, Debug)]
#[command(name = "madmp-sync")]
#[command(about = "Synchronize machine-actionable DMPs with repository records")]
#[command(version)]
struct Cli {
    /// Configuration file (overrides MADMP_CONFIG)
    #[arg(short, long, global = true, env = "MADMP_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP service
    Serve {
        /// Listen address (default from configuration)
        #[arg(short, long)]
        bind: Option<String>,
    },
    /// Reconcile a maDMP JSON file
    Import {
        file: PathBuf,
        /// Roll back instead of committing
        #[arg(long)]
        dry_run: bool,
        /// Also refresh records that are already linked
        #[arg(long, conflicts_with = "soft_sync")]
        hard_sync: bool,
        /// Only maintain dataset links (default)
        #[arg(long)]
        soft_sync: bool,
    },
    /// List DMPs and their datasets
    List,
    /// Delete a DMP; its datasets are kept
    DeleteDmp { dmp_id: String },
    /// Delete a dataset; its record is kept
    DeleteDataset { dataset_id: String },
    /// List datasets whose record is gone
    Zombies,
    /// List datasets without a record
    Orphans,
    /// Create a local user account
    AddUser { email: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = MadmpConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level)),
        )
        .init();

    info!(
        "Starting madmp-sync v{} (database {})",
        env!("CARGO_PKG_VERSION"),
        config.database_path.display()
    );

    let config = Arc::new(config);
    let pool = init_database(&config.database_path)
        .await
        .context("Failed to open database")?;
    let store = Store::new(pool, EventBus::new(EVENT_BUS_CAPACITY));
    let converters = Arc::new(ConverterRegistry::from_config(&config)?);
    let reconciler = Reconciler::new(config.clone(), converters.clone(), store.clone());
    let client = DmpToolClient::new(&config.dmp_tool, NotifyPolicy::Suppress)?;
    let observer = Observer::new(store.clone(), converters, client);

    match cli.command {
        Command::Serve { bind } => {
            let bind = bind.unwrap_or_else(|| config.bind_address.clone());
            serve(&bind, AppState::new(store.clone(), config.clone(), reconciler), observer).await
        }
        Command::Import {
            file,
            dry_run,
            hard_sync,
            soft_sync: _,
        } => {
            let mode = if hard_sync { SyncMode::Hard } else { SyncMode::Soft };
            import(&reconciler, &observer, &file, mode, dry_run).await
        }
        Command::List => {
            let mut conn = store.acquire().await?;
            let mut summaries = Vec::new();
            for plan in DataManagementPlan::list_all(&mut conn).await? {
                summaries.push(DmpSummary::load(&mut conn, &plan).await?);
            }
            print_json(&summaries)
        }
        Command::DeleteDmp { dmp_id } => {
            let mut uow = store.begin().await?;
            let plan = DataManagementPlan::get_by_dmp_id(uow.conn(), &dmp_id)
                .await?
                .ok_or_else(|| anyhow!("no DMP with id '{}'", dmp_id))?;
            let unlinked = plan.delete(&mut uow).await?;
            let events = uow.commit().await?;
            println!("Deleted DMP {} ({} datasets unlinked)", dmp_id, unlinked.len());
            notify(&observer, &events).await;
            Ok(())
        }
        Command::DeleteDataset { dataset_id } => {
            let mut uow = store.begin().await?;
            let dataset = Dataset::get_by_dataset_id(uow.conn(), &dataset_id)
                .await?
                .ok_or_else(|| anyhow!("no dataset with id '{}'", dataset_id))?;
            dataset.delete(&mut uow).await?;
            let events = uow.commit().await?;
            println!("Deleted dataset {}", dataset_id);
            notify(&observer, &events).await;
            Ok(())
        }
        Command::Zombies => {
            let mut conn = store.acquire().await?;
            let mut summaries = Vec::new();
            for dataset in Dataset::get_zombies(&mut conn).await? {
                summaries.push(DatasetSummary::load(&mut conn, &dataset).await?);
            }
            print_json(&summaries)
        }
        Command::Orphans => {
            let mut conn = store.acquire().await?;
            let mut summaries = Vec::new();
            for dataset in Dataset::get_orphans(&mut conn).await? {
                summaries.push(DatasetSummary::load(&mut conn, &dataset).await?);
            }
            print_json(&summaries)
        }
        Command::AddUser { email } => {
            let mut conn = store.acquire().await?;
            let user = users::create_user(&mut conn, &email).await?;
            println!("Created user {} <{}>", user.id, user.email);
            Ok(())
        }
    }
}

async fn serve(bind: &str, state: AppState, observer: Observer) -> Result<()> {
    let rx = state.store.bus().subscribe();
    tokio::spawn(observer.run(rx));

    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind to {}", bind))?;
    info!("madmp-sync listening on http://{}", bind);
    info!("Health check: http://{}/health", bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

async fn import(
    reconciler: &Reconciler,
    observer: &Observer,
    file: &Path,
    mode: SyncMode,
    dry_run: bool,
) -> Result<()> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let document: MadmpDocument = serde_json::from_str(&content)
        .with_context(|| format!("{} is not a maDMP document", file.display()))?;

    let outcome = if dry_run {
        reconciler.dry_run(&document.dmp, mode, None).await
    } else {
        reconciler.reconcile(&document.dmp, mode, None).await
    };

    let outcome = match outcome {
        Ok(outcome) => outcome,
        Err(e) => {
            error!(kind = ?e.kind(), "Import failed: {}", e);
            return Err(e.into());
        }
    };

    print_json(&outcome)?;

    if outcome.committed {
        notify(observer, &outcome.events).await;
    } else {
        info!("Dry run, nothing committed and nobody notified");
    }
    Ok(())
}

async fn notify(observer: &Observer, events: &[MadmpEvent]) {
    let delivered = observer.drain(events).await;
    info!(events = events.len(), delivered, "Processed lifecycle events");
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
