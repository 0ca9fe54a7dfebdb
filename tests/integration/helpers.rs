//! Helper functions for integration tests

use std::sync::Arc;
use std::time::Duration;

use sitewatch::{
    actors::{CheckRunner, SchedulerHandle},
    broadcast::BroadcastHub,
    clock::{Clock, ManualClock, SystemClock},
    config::{FetcherConfig, SchedulerConfig},
    extract::Extractor,
    fetcher::HttpFetcher,
    monitor::{NewMonitor, Strategy},
    service::{MonitorService, NotificationService},
    storage::{MemoryStore, MonitorStore},
};

/// Everything a test needs, wired the way the hub wires it
pub struct Engine {
    pub store: Arc<dyn MonitorStore>,
    pub hub: BroadcastHub,
    pub clock: ManualClock,
    pub scheduler: SchedulerHandle,
    pub monitors: MonitorService,
    pub notifications: NotificationService,
}

/// Short timeouts and backoff so failure tests stay fast
pub fn fast_fetcher_config() -> FetcherConfig {
    FetcherConfig {
        timeout_secs: 1,
        max_retries: 2,
        retry_backoff_ms: 10,
        ..Default::default()
    }
}

/// Background ticker effectively disabled; tests tick explicitly
pub fn manual_tick_config() -> SchedulerConfig {
    SchedulerConfig {
        tick_interval_secs: 3600,
        ..Default::default()
    }
}

pub fn engine() -> Engine {
    engine_with(Arc::new(MemoryStore::new()), manual_tick_config())
}

pub fn engine_with(store: Arc<dyn MonitorStore>, config: SchedulerConfig) -> Engine {
    // millisecond precision, matching what storage keeps
    let clock = ManualClock::new(SystemClock.now());
    let hub = BroadcastHub::new(16);

    let runner = Arc::new(CheckRunner::new(
        store.clone(),
        Arc::new(HttpFetcher::new(fast_fetcher_config()).unwrap()),
        Extractor::default(),
        hub.clone(),
        Arc::new(clock.clone()),
    ));
    let scheduler = SchedulerHandle::spawn(config.clone(), runner);

    Engine {
        monitors: MonitorService::new(
            store.clone(),
            scheduler.clone(),
            hub.clone(),
            Arc::new(clock.clone()),
            config,
        ),
        notifications: NotificationService::new(store.clone(), Arc::new(clock.clone())),
        store,
        hub,
        clock,
        scheduler,
    }
}

pub fn price_monitor(url: String) -> NewMonitor {
    let mut request = NewMonitor::new("Laptop", url, Strategy::Price);
    request.selector = Some(".price".to_string());
    request
}

pub fn html(body: &str) -> String {
    format!("<html><head><title>t</title></head><body>{body}</body></html>")
}

/// Wait until the scheduler has no check in flight
pub async fn wait_idle(scheduler: &SchedulerHandle) {
    for _ in 0..1000 {
        if scheduler.status().await.unwrap().in_flight_checks == 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("checks did not finish in time");
}
