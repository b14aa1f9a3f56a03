use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use pulsewatch::{
    actors::{
        aggregator::AggregatorHandle,
        direct_monitor::{DEFAULT_SWEEP_INTERVAL, DirectMonitorHandle},
        retention::{CLEANUP_INTERVAL, RetentionHandle},
    },
    alerts::AlertGenerator,
    api::{ApiConfig, ApiState, spawn_api_server},
    config::{HubConfig, StorageConfig, read_config_file},
    probe::TargetResolver,
    registrar::HeartbeatRegistrar,
    seed::apply_seed,
    storage::{MemoryBackend, StorageBackend},
    util::get_bind_addr,
};
use tracing::{info, level_filters::LevelFilter, trace, warn};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file
    #[arg(short)]
    file: String,
}

fn init() {
    let filter = filter::Targets::new().with_targets(vec![
        ("pulsewatch", LevelFilter::DEBUG),
        ("pulse_hub", LevelFilter::TRACE),
        ("tower_http", LevelFilter::INFO),
    ]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

async fn open_store(config: &HubConfig) -> anyhow::Result<Arc<dyn StorageBackend>> {
    match &config.storage {
        None | Some(StorageConfig::None) => {
            info!("using in-memory storage, nothing survives a restart");
            Ok(Arc::new(MemoryBackend::new()))
        }
        #[cfg(feature = "storage-sqlite")]
        Some(StorageConfig::Sqlite { path, .. }) => {
            let backend = pulsewatch::storage::sqlite::SqliteBackend::new(path)
                .await
                .with_context(|| format!("failed to open database {}", path.display()))?;
            Ok(Arc::new(backend))
        }
        #[cfg(not(feature = "storage-sqlite"))]
        Some(StorageConfig::Sqlite { .. }) => {
            anyhow::bail!("sqlite storage requested but built without the storage-sqlite feature")
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init();
    let args = Args::parse();
    trace!("started with args: {args:?}");

    let mut config: HubConfig = read_config_file(&args.file)?;
    if let Some(addr) = get_bind_addr() {
        config.bind_addr = addr;
    }

    let store = open_store(&config).await?;

    let seeded = apply_seed(store.as_ref(), &config).await?;
    for (name, key) in &seeded.generated_keys {
        // Only time a generated key is ever shown
        info!("generated api key for agent '{name}': {key}");
    }

    let alerts = AlertGenerator::new(store.clone());
    let registrar = HeartbeatRegistrar::new(store.clone(), config.liveness_multiplier);
    let aggregator = AggregatorHandle::spawn(store.clone(), alerts.clone());
    let resolver = TargetResolver::new(config.probe)?;

    let monitor = DirectMonitorHandle::spawn(
        store.clone(),
        resolver,
        registrar.clone(),
        aggregator.clone(),
        DEFAULT_SWEEP_INTERVAL,
    );

    let retention_days = config
        .storage
        .as_ref()
        .unwrap_or(&StorageConfig::None)
        .retention_days();
    let retention = RetentionHandle::spawn(store.clone(), retention_days, CLEANUP_INTERVAL);

    let state = ApiState::new(store.clone(), registrar, aggregator.clone(), alerts);
    let addr = spawn_api_server(ApiConfig::from(&config), state).await?;
    info!("hub ready on {addr}");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    info!("shutting down");

    monitor.shutdown().await;
    retention.shutdown().await;
    aggregator.shutdown().await;

    if let Err(e) = store.close().await {
        warn!("failed to close storage: {e}");
    }

    Ok(())
}
