//! Website change monitoring engine
//!
//! Periodically fetches user-configured pages, extracts a value with one of
//! four [`monitor::Strategy`] variants, compares it with the previous
//! observation and records owner-scoped notifications when it changed.
//! Notifications are pushed to the owner's live connections through the
//! [`broadcast::BroadcastHub`].

pub mod actors;
#[cfg(feature = "api")]
pub mod api;
pub mod broadcast;
pub mod clock;
pub mod config;
pub mod detect;
pub mod dispatch;
pub mod error;
pub mod extract;
pub mod fetcher;
pub mod identity;
pub mod monitor;
pub mod notification;
pub mod service;
pub mod storage;

pub use error::{CheckError, MonitorError, MonitorResult};
pub use monitor::{Monitor, MonitorId, Strategy};
pub use notification::{Notification, NotificationId};
