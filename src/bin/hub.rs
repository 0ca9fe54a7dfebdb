use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use sitewatch::{
    actors::{CheckRunner, RetentionHandle, SchedulerHandle},
    api::{ApiState, spawn_api_server},
    broadcast::BroadcastHub,
    clock::{Clock, SystemClock},
    config::{Config, StorageConfig, apply_env_overrides, read_config_file},
    extract::Extractor,
    fetcher::HttpFetcher,
    identity::StaticTokenResolver,
    service::{MonitorService, NotificationService},
    storage::{MemoryStore, MonitorStore},
};
use tracing::{debug, info, level_filters::LevelFilter, trace, warn};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

/// How often every connected client gets a fresh system status
const STATUS_BROADCAST_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file
    #[arg(short)]
    file: Option<String>,

    /// Log at trace level instead of debug
    #[arg(short, long)]
    verbose: bool,
}

fn init(verbose: bool) {
    let level = if verbose {
        LevelFilter::TRACE
    } else {
        LevelFilter::DEBUG
    };
    let filter = filter::Targets::new()
        .with_targets(vec![("sitewatch", level), ("hub", level)])
        .with_target("tower_http", LevelFilter::INFO);

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

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();
    init(args.verbose);
    trace!("started with args: {args:?}");

    let config = match &args.file {
        Some(path) => read_config_file(path)?,
        None => Config::default(),
    };
    let config = apply_env_overrides(config);

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let storage = config.storage.clone().unwrap_or_default();
    let store = open_store(&storage).await?;

    let hub = BroadcastHub::new(config.broadcast.connection_buffer);
    let runner = Arc::new(CheckRunner::new(
        store.clone(),
        Arc::new(HttpFetcher::new(config.fetcher.clone())?),
        Extractor::new(config.extractor.clone()),
        hub.clone(),
        clock.clone(),
    ));

    let scheduler = SchedulerHandle::spawn(config.scheduler.clone(), runner);
    scheduler.load_from_store(store.as_ref()).await?;

    let retention = RetentionHandle::spawn(store.clone(), clock.clone(), storage.retention_days());

    let monitors = MonitorService::new(
        store.clone(),
        scheduler.clone(),
        hub.clone(),
        clock.clone(),
        config.scheduler.clone(),
    );
    let notifications = NotificationService::new(store.clone(), clock.clone());

    match &config.api {
        Some(settings) => {
            let resolver = Arc::new(StaticTokenResolver::new(settings.tokens.clone()));
            let state = ApiState::new(monitors.clone(), notifications, hub.clone(), resolver);
            let addr = spawn_api_server(settings.clone(), state).await?;
            info!("API available at http://{addr}/api/v1");
        }
        None => warn!("no api section configured, running without HTTP surface"),
    }

    let status = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(STATUS_BROADCAST_INTERVAL);
        loop {
            ticker.tick().await;
            let delivered = monitors.broadcast_system_status().await;
            trace!(delivered, "system status broadcast");
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("shutting down");

    status.abort();
    scheduler.shutdown().await;
    retention.shutdown().await;
    store.close().await?;

    debug!("hub stopped");
    Ok(())
}

async fn open_store(config: &StorageConfig) -> anyhow::Result<Arc<dyn MonitorStore>> {
    match config {
        StorageConfig::None => {
            info!("using in-memory storage, nothing survives a restart");
            Ok(Arc::new(MemoryStore::new()))
        }
        StorageConfig::Sqlite { path, .. } => {
            info!("using sqlite storage at {}", path.display());
            let store = sitewatch::storage::sqlite::SqliteStore::new(path).await?;
            Ok(Arc::new(store))
        }
    }
}
