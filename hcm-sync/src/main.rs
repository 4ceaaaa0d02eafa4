use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use hcm_sync::store::CreateSubnetRequest;
use hcm_sync::{
    AlwaysLeader, CancelSignal, CloudSnapshot, DataStore, FixtureCloud, MemoryStore, Reconciler,
    SqliteStore, SyncConfig, SyncController,
};

#[derive(Parser)]
#[command(name = "hcm-sync")]
#[command(about = "Reconciles the local cloud inventory with vendor APIs")]
struct Args {
    /// SQLite inventory database
    #[arg(long, default_value = "/var/lib/hcm-sync/inventory.db")]
    db: PathBuf,

    /// Keep the inventory in memory instead of SQLite
    #[arg(long)]
    dev: bool,

    /// Cloud snapshot (JSON) served as the vendor APIs
    #[arg(long)]
    fixture: PathBuf,

    /// Sync targets and engine settings (JSON)
    #[arg(long)]
    targets: PathBuf,

    /// Seconds between sync ticks
    #[arg(long, default_value_t = 300, value_parser = clap::value_parser!(u64).range(1..))]
    interval_secs: u64,

    /// Run every target once and exit
    #[arg(long)]
    once: bool,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::from_default_env().add_directive("hcm_sync=info".parse()?);
    if args.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    info!("Starting hcm-sync");

    let config = SyncConfig::load(&args.targets).await?;
    let snapshot = CloudSnapshot::load(&args.fixture)
        .await
        .with_context(|| format!("failed to load fixture {}", args.fixture.display()))?;
    let cloud = Arc::new(FixtureCloud::new(snapshot));

    let store: Arc<dyn DataStore> = if args.dev {
        info!("Using in-memory inventory (dev mode)");
        Arc::new(MemoryStore::new())
    } else {
        if let Some(parent) = args.db.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        info!(db = %args.db.display(), "Opening inventory database");
        Arc::new(SqliteStore::open(&args.db).await?)
    };

    let seeded = seed_subnets(store.as_ref(), cloud.subnet_requests().await).await?;
    if seeded > 0 {
        info!(count = seeded, "Seeded subnets from fixture");
    }

    let reconciler = Arc::new(Reconciler::new(store, cloud, config.engine.clone()));
    let controller = SyncController::new(
        reconciler,
        Arc::new(AlwaysLeader),
        config.targets,
        Duration::from_secs(args.interval_secs),
    );

    if args.once {
        let outcomes = controller.run_once(&CancelSignal::never()).await;
        let failed = outcomes.iter().filter(|o| o.result.is_err()).count();
        for outcome in &outcomes {
            if let Ok(result) = &outcome.result {
                info!(
                    task_id = %result.task_id,
                    stats = %result.stats,
                    vendor = %outcome.request.vendor,
                    account_id = %outcome.request.account_id,
                    "Target synced"
                );
            }
        }
        if failed > 0 {
            anyhow::bail!("{} of {} sync targets failed", failed, outcomes.len());
        }
        return Ok(());
    }

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let controller_handle = tokio::spawn(async move { controller.run(shutdown_rx).await });

    // Wait for shutdown signal
    let ctrl_c = signal::ctrl_c();
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
        .context("failed to install SIGTERM handler")?;

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = sigterm.recv() => info!("Received SIGTERM"),
    }

    let _ = shutdown_tx.send(true);
    if let Err(e) = controller_handle.await {
        warn!(error = %e, "Sync controller task failed");
    }

    info!("hcm-sync stopped");
    Ok(())
}

/// Insert fixture subnets the inventory does not know yet.
async fn seed_subnets(store: &dyn DataStore, reqs: Vec<CreateSubnetRequest>) -> Result<usize> {
    let chunk = store.max_batch_size().max(1);
    let mut missing = Vec::new();

    for batch in reqs.chunks(chunk) {
        let mut known = HashSet::new();
        for req in batch {
            let found = store
                .list_subnets_by_cloud_ids(req.vendor, std::slice::from_ref(&req.cloud_id))
                .await?;
            if !found.is_empty() {
                known.insert((req.vendor, req.cloud_id.clone()));
            }
        }
        missing.extend(
            batch
                .iter()
                .filter(|r| !known.contains(&(r.vendor, r.cloud_id.clone())))
                .cloned(),
        );
    }

    let mut seeded = 0;
    for batch in missing.chunks(chunk) {
        seeded += store.batch_create_subnets(batch.to_vec()).await?.len();
    }
    Ok(seeded)
}
