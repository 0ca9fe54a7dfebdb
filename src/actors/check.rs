//! CheckRunner - one unit of scheduler work
//!
//! ## Message Flow
//!
//! ```text
//! fetch → extract → detect → commit state (+ notification) → publish
//!   │        │
//!   └────────┴── failure → commit last_checked / failure bookkeeping → publish
//! ```
//!
//! A failure never touches `current_value` or `last_changed`, and never
//! escapes as a panic; it is returned inside the [`CheckReport`].

use std::sync::Arc;

use tracing::{debug, error, info, instrument, warn};

use crate::broadcast::{BroadcastHub, ClientEvent, MonitorUpdate};
use crate::clock::Clock;
use crate::detect::{ChangeDetector, Detection};
use crate::dispatch::{Dispatch, NotificationDispatcher};
use crate::error::CheckError;
use crate::extract::{ExtractRequest, Extractor};
use crate::fetcher::PageFetcher;
use crate::monitor::{Monitor, MonitorId, MonitorState};
use crate::storage::{MonitorStore, StorageResult};

use super::messages::{CheckOutcome, CheckReport};

pub struct CheckRunner {
    store: Arc<dyn MonitorStore>,
    fetcher: Arc<dyn PageFetcher>,
    extractor: Extractor,
    detector: ChangeDetector,
    dispatcher: NotificationDispatcher,
    hub: BroadcastHub,
    clock: Arc<dyn Clock>,
}

impl CheckRunner {
    pub fn new(
        store: Arc<dyn MonitorStore>,
        fetcher: Arc<dyn PageFetcher>,
        extractor: Extractor,
        hub: BroadcastHub,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            dispatcher: NotificationDispatcher::new(store.clone(), hub.clone(), clock.clone()),
            store,
            fetcher,
            extractor,
            detector: ChangeDetector,
            hub,
            clock,
        }
    }

    /// Current persisted version of a monitor
    pub async fn load(&self, id: MonitorId) -> StorageResult<Option<Monitor>> {
        self.store.load_monitor(id).await
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Run the full pipeline for `monitor`
    #[instrument(skip_all, fields(monitor_id = %monitor.id, url = %monitor.url))]
    pub async fn run(&self, monitor: Monitor) -> CheckReport {
        let checked_at = self.clock.now();

        let result = match self.observe(&monitor).await {
            Ok(value) => self.record_observation(&monitor, value, checked_at).await,
            Err(e) => {
                warn!("check failed: {e}");
                self.record_failure(&monitor, &e, checked_at).await;
                Err(e)
            }
        };

        CheckReport {
            monitor_id: monitor.id,
            checked_at,
            result,
        }
    }

    async fn observe(&self, monitor: &Monitor) -> Result<String, CheckError> {
        let page = self.fetcher.fetch(&monitor.url).await?;
        if page.truncated {
            debug!("page body was truncated before extraction");
        }

        let value = self
            .extractor
            .extract(&page.body, &ExtractRequest::from(monitor))?;
        Ok(value)
    }

    async fn record_observation(
        &self,
        monitor: &Monitor,
        value: String,
        checked_at: chrono::DateTime<chrono::Utc>,
    ) -> Result<CheckOutcome, CheckError> {
        let detection = self.detector.detect(monitor, &value);

        let mut state = MonitorState {
            last_checked: Some(checked_at),
            last_success: Some(checked_at),
            consecutive_failures: 0,
            last_error: None,
            ..monitor.state.clone()
        };

        match &detection {
            Detection::Baseline(value) => state.current_value = Some(value.clone()),
            Detection::Unchanged => {}
            Detection::Changed(change) => {
                state.previous_value = Some(change.old.clone());
                state.current_value = Some(change.new.clone());
                state.last_changed = Some(checked_at);
            }
        }

        let dispatch = self.dispatcher.dispatch(monitor, &detection, &state).await?;

        let notification_id = match dispatch {
            Dispatch::MonitorGone => {
                debug!("monitor deleted during check");
                return Ok(CheckOutcome::Discarded);
            }
            Dispatch::Committed(notification) => notification.map(|n| n.id),
        };

        self.publish_update(monitor, state, detection.is_changed(), None);

        Ok(match detection {
            Detection::Baseline(value) => {
                info!("baseline recorded");
                CheckOutcome::Baseline { value }
            }
            Detection::Unchanged => CheckOutcome::Unchanged { value },
            Detection::Changed(change) => {
                info!("change detected: {}", change.summary);
                CheckOutcome::Changed {
                    previous: change.old,
                    current: change.new,
                    summary: change.summary,
                    notification_id,
                }
            }
        })
    }

    async fn record_failure(
        &self,
        monitor: &Monitor,
        failure: &CheckError,
        checked_at: chrono::DateTime<chrono::Utc>,
    ) {
        let state = MonitorState {
            last_checked: Some(checked_at),
            consecutive_failures: monitor.state.consecutive_failures.saturating_add(1),
            last_error: Some(failure.to_string()),
            ..monitor.state.clone()
        };

        match self.store.commit_check(monitor.id, &state, None).await {
            Ok(true) => self.publish_update(monitor, state, false, Some(failure.user_hint())),
            Ok(false) => debug!("monitor deleted during check"),
            Err(e) => error!("failed to record check failure: {e}"),
        }
    }

    fn publish_update(
        &self,
        monitor: &Monitor,
        state: MonitorState,
        has_changed: bool,
        error: Option<String>,
    ) {
        let updated = Monitor {
            state,
            ..monitor.clone()
        };

        self.hub.publish(
            &monitor.owner,
            ClientEvent::MonitorUpdate(MonitorUpdate::new(&updated, has_changed, error)),
        );
    }
}
