//! Monitor entity: what to watch, how to extract it, and what was last seen

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::SchedulerConfig;
use crate::identity::OwnerId;

pub type MonitorId = Uuid;

/// Extraction strategy for a monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Content,
    Price,
    Selector,
    ItemSearch,
}

impl Strategy {
    pub const ALL: [Strategy; 4] = [
        Strategy::Content,
        Strategy::Price,
        Strategy::Selector,
        Strategy::ItemSearch,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Content => "content",
            Strategy::Price => "price",
            Strategy::Selector => "selector",
            Strategy::ItemSearch => "item_search",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "content" => Ok(Strategy::Content),
            "price" => Ok(Strategy::Price),
            "selector" => Ok(Strategy::Selector),
            "item_search" => Ok(Strategy::ItemSearch),
            other => Err(format!("unknown strategy '{other}'")),
        }
    }
}

/// Hint about what kind of item is being tracked
///
/// Only used to discard implausible price candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemType {
    Crypto,
    Stock,
    Product,
    News,
    Auto,
}

impl ItemType {
    pub const ALL: [ItemType; 5] = [
        ItemType::Crypto,
        ItemType::Stock,
        ItemType::Product,
        ItemType::News,
        ItemType::Auto,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ItemType::Crypto => "crypto",
            ItemType::Stock => "stock",
            ItemType::Product => "product",
            ItemType::News => "news",
            ItemType::Auto => "auto",
        }
    }
}

impl FromStr for ItemType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "crypto" => Ok(ItemType::Crypto),
            "stock" => Ok(ItemType::Stock),
            "product" => Ok(ItemType::Product),
            "news" => Ok(ItemType::News),
            "auto" => Ok(ItemType::Auto),
            other => Err(format!("unknown item type '{other}'")),
        }
    }
}

/// Observed state of a monitor, written by every check
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MonitorState {
    pub current_value: Option<String>,
    pub previous_value: Option<String>,
    pub last_checked: Option<DateTime<Utc>>,
    /// Only moves when a check produced a genuine change
    pub last_changed: Option<DateTime<Utc>>,
    pub last_success: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
    pub last_error: Option<String>,
}

/// A user's request to watch a URL
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Monitor {
    pub id: MonitorId,
    pub owner: OwnerId,
    pub name: String,
    pub url: String,
    pub strategy: Strategy,
    pub selector: Option<String>,
    pub item_name: Option<String>,
    pub item_type: Option<ItemType>,
    pub check_interval_secs: u64,
    pub notification_enabled: bool,
    pub is_active: bool,
    /// Free-form JSON object supplied by the owner, never interpreted
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
    #[serde(flatten)]
    pub state: MonitorState,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Monitor {
    /// Build a fresh, never-checked monitor from a validated request
    pub fn from_request(
        owner: OwnerId,
        request: NewMonitor,
        config: &SchedulerConfig,
        now: DateTime<Utc>,
    ) -> Result<Self, String> {
        request.validate(config)?;

        Ok(Self {
            id: Uuid::new_v4(),
            owner,
            name: request.name.trim().to_string(),
            url: request.url.trim().to_string(),
            strategy: request.strategy,
            selector: non_empty(request.selector),
            item_name: non_empty(request.item_name),
            item_type: request.item_type,
            check_interval_secs: request
                .check_interval_secs
                .unwrap_or(config.default_check_interval_secs),
            notification_enabled: request.notification_enabled,
            is_active: true,
            metadata: request.metadata,
            state: MonitorState::default(),
            created_at: now,
            updated_at: None,
        })
    }

    pub fn interval(&self) -> Duration {
        Duration::seconds(self.check_interval_secs as i64)
    }

    /// Due when never checked, or when a full interval elapsed since the last check
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.is_active && is_due(self.state.last_checked, self.check_interval_secs, now)
    }

    /// Health signal: no successful check within `intervals` check intervals
    pub fn is_stale(&self, now: DateTime<Utc>, intervals: u32) -> bool {
        if !self.is_active {
            return false;
        }

        let since = self.state.last_success.unwrap_or(self.created_at);
        now - since > self.interval() * intervals as i32
    }

    /// Apply a patch, re-validating the resulting configuration
    ///
    /// Returns `true` when the patch changed what gets extracted. The
    /// observed values are cleared in that case, so the next check records
    /// a fresh baseline instead of comparing against a value read with the
    /// old settings.
    pub fn apply_patch(
        &mut self,
        patch: MonitorPatch,
        config: &SchedulerConfig,
        now: DateTime<Utc>,
    ) -> Result<bool, String> {
        let mut updated = self.clone();

        if let Some(name) = patch.name {
            updated.name = name.trim().to_string();
        }
        if let Some(is_active) = patch.is_active {
            updated.is_active = is_active;
        }
        if let Some(interval) = patch.check_interval_secs {
            updated.check_interval_secs = interval;
        }
        if let Some(enabled) = patch.notification_enabled {
            updated.notification_enabled = enabled;
        }
        if let Some(selector) = patch.selector {
            updated.selector = non_empty(Some(selector));
        }
        if let Some(item_name) = patch.item_name {
            updated.item_name = non_empty(Some(item_name));
        }
        if let Some(item_type) = patch.item_type {
            updated.item_type = Some(item_type);
        }
        if let Some(metadata) = patch.metadata {
            updated.metadata = Some(metadata);
        }

        updated.as_request().validate(config)?;

        let extraction_changed = updated.selector != self.selector
            || updated.item_name != self.item_name
            || updated.item_type != self.item_type;
        if extraction_changed {
            updated.state.current_value = None;
            updated.state.previous_value = None;
        }

        updated.updated_at = Some(now);
        *self = updated;
        Ok(extraction_changed)
    }

    fn as_request(&self) -> NewMonitor {
        NewMonitor {
            name: self.name.clone(),
            url: self.url.clone(),
            strategy: self.strategy,
            selector: self.selector.clone(),
            item_name: self.item_name.clone(),
            item_type: self.item_type,
            check_interval_secs: Some(self.check_interval_secs),
            notification_enabled: self.notification_enabled,
            metadata: self.metadata.clone(),
        }
    }
}

pub(crate) fn is_due(last_checked: Option<DateTime<Utc>>, interval_secs: u64, now: DateTime<Utc>) -> bool {
    match last_checked {
        None => true,
        Some(last) => now - last >= Duration::seconds(interval_secs as i64),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn default_notification_enabled() -> bool {
    true
}

/// Request to create a monitor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMonitor {
    pub name: String,
    pub url: String,
    #[serde(default = "default_strategy")]
    pub strategy: Strategy,
    #[serde(default)]
    pub selector: Option<String>,
    #[serde(default)]
    pub item_name: Option<String>,
    #[serde(default)]
    pub item_type: Option<ItemType>,
    #[serde(default)]
    pub check_interval_secs: Option<u64>,
    #[serde(default = "default_notification_enabled")]
    pub notification_enabled: bool,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

fn default_strategy() -> Strategy {
    Strategy::Content
}

impl NewMonitor {
    /// Minimal request for `url` with the given strategy
    pub fn new(name: impl Into<String>, url: impl Into<String>, strategy: Strategy) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            strategy,
            selector: None,
            item_name: None,
            item_type: None,
            check_interval_secs: None,
            notification_enabled: true,
            metadata: None,
        }
    }

    pub fn validate(&self, config: &SchedulerConfig) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("monitor name must not be empty".to_string());
        }

        let url = reqwest::Url::parse(self.url.trim())
            .map_err(|e| format!("invalid url '{}': {e}", self.url))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(format!("unsupported url scheme '{}'", url.scheme()));
        }

        let has = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
        match self.strategy {
            Strategy::Selector if !has(&self.selector) => {
                return Err("selector strategy requires a selector".to_string());
            }
            Strategy::ItemSearch if !has(&self.item_name) => {
                return Err("item_search strategy requires an item name".to_string());
            }
            _ => {}
        }

        // an omitted interval resolves to the configured default, which is checked too
        let interval = self
            .check_interval_secs
            .unwrap_or(config.default_check_interval_secs);
        let (min, max) = (config.min_check_interval_secs, config.max_check_interval_secs);
        if interval < min || interval > max {
            return Err(format!(
                "check interval {interval}s outside allowed range {min}s..={max}s"
            ));
        }

        if self.metadata.as_ref().is_some_and(|m| !m.is_object()) {
            return Err("metadata must be a JSON object".to_string());
        }

        Ok(())
    }
}

/// Partial update of a monitor's configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MonitorPatch {
    pub name: Option<String>,
    pub is_active: Option<bool>,
    pub check_interval_secs: Option<u64>,
    pub notification_enabled: Option<bool>,
    pub selector: Option<String>,
    pub item_name: Option<String>,
    pub item_type: Option<ItemType>,
    /// Replaces the stored metadata; `null` leaves it unchanged
    pub metadata: Option<serde_json::Value>,
}
