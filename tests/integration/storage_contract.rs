//! The same behavioural contract run against every MonitorStore backend

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use pretty_assertions::assert_eq;
use sitewatch::{
    clock::{Clock, SystemClock},
    config::SchedulerConfig,
    detect::{Change, ChangeKind},
    dispatch::build_notification,
    identity::OwnerId,
    monitor::{Monitor, MonitorState, NewMonitor, Strategy},
    notification::{Notification, NotificationKind, NotificationQuery},
    storage::{MemoryStore, MonitorStore},
};
use uuid::Uuid;

fn monitor(owner: &str, name: &str, created_at: DateTime<Utc>) -> Monitor {
    let mut request = NewMonitor::new(name, "https://example.com/item", Strategy::Selector);
    request.selector = Some("#price".to_string());
    Monitor::from_request(OwnerId::new(owner), request, &SchedulerConfig::default(), created_at)
        .unwrap()
}

fn notification(monitor: &Monitor, created_at: DateTime<Utc>) -> Notification {
    let change = Change {
        old: "1".to_string(),
        new: "2".to_string(),
        kind: ChangeKind::ValueChange,
        summary: "1 → 2".to_string(),
    };
    build_notification(monitor, &change, created_at)
}

async fn monitor_contract(store: Arc<dyn MonitorStore>) {
    let now = SystemClock.now();
    let first = monitor("alice", "first", now - Duration::minutes(2));
    let second = monitor("alice", "second", now - Duration::minutes(1));
    let foreign = monitor("bob", "bob's", now);

    for m in [&second, &first, &foreign] {
        store.insert_monitor(m).await.unwrap();
    }

    // owner scoped, oldest first
    let listed = store.list_monitors(&OwnerId::new("alice")).await.unwrap();
    assert_eq!(listed, vec![first.clone(), second.clone()]);
    assert_eq!(store.count_monitors(&OwnerId::new("alice")).await.unwrap(), 2);
    assert_eq!(store.list_active_monitors().await.unwrap().len(), 3);

    // config updates never clobber observed state
    let state = MonitorState {
        current_value: Some("$5".to_string()),
        last_checked: Some(now),
        last_success: Some(now),
        ..Default::default()
    };
    assert!(store.commit_check(first.id, &state, None).await.unwrap());

    let mut renamed = first.clone();
    renamed.name = "renamed".to_string();
    renamed.is_active = false;
    renamed.metadata = Some(serde_json::json!({ "labels": ["home"] }));
    renamed.updated_at = Some(now);
    assert!(store.update_monitor(&renamed).await.unwrap());

    let loaded = store.load_monitor(first.id).await.unwrap().unwrap();
    assert_eq!(loaded.name, "renamed");
    assert!(!loaded.is_active);
    assert_eq!(loaded.metadata, renamed.metadata);
    assert_eq!(loaded.state, state);
    assert_eq!(store.list_active_monitors().await.unwrap().len(), 2);

    // a baseline reset clears the values and nothing else
    assert!(store.reset_baseline(first.id).await.unwrap());
    let reset = store.load_monitor(first.id).await.unwrap().unwrap();
    assert_eq!(
        reset.state,
        MonitorState {
            current_value: None,
            previous_value: None,
            ..state.clone()
        }
    );

    // missing monitors
    let ghost = monitor("alice", "ghost", now);
    assert!(!store.update_monitor(&ghost).await.unwrap());
    assert!(!store.reset_baseline(ghost.id).await.unwrap());
    assert!(!store.commit_check(ghost.id, &state, None).await.unwrap());
    assert!(store.load_monitor(ghost.id).await.unwrap().is_none());

    assert!(store.delete_monitor(second.id).await.unwrap());
    assert!(!store.delete_monitor(second.id).await.unwrap());
}

async fn notification_contract(store: Arc<dyn MonitorStore>) {
    let now = SystemClock.now();
    let m = monitor("alice", "m", now);
    store.insert_monitor(&m).await.unwrap();

    let old = notification(&m, now - Duration::days(40));
    let older_unread = notification(&m, now - Duration::minutes(5));
    let newest = notification(&m, now);
    for n in [&old, &older_unread, &newest] {
        assert!(store.commit_check(m.id, &m.state, Some(n)).await.unwrap());
    }

    // committing against a deleted monitor writes nothing
    let ghost = monitor("alice", "ghost", now);
    let orphan = notification(&ghost, now);
    assert!(!store.commit_check(ghost.id, &ghost.state, Some(&orphan)).await.unwrap());
    assert!(store.load_notification(orphan.id).await.unwrap().is_none());

    let alice = OwnerId::new("alice");
    let all = store
        .list_notifications(&alice, &NotificationQuery::default())
        .await
        .unwrap();
    assert_eq!(
        all.iter().map(|n| n.id).collect::<Vec<_>>(),
        vec![newest.id, older_unread.id, old.id]
    );
    assert_eq!(all[0], newest);
    assert!(
        store
            .list_notifications(&OwnerId::new("bob"), &NotificationQuery::default())
            .await
            .unwrap()
            .is_empty()
    );

    let limited = NotificationQuery {
        limit: Some(1),
        kind: Some(NotificationKind::Info),
        ..Default::default()
    };
    assert_eq!(store.list_notifications(&alice, &limited).await.unwrap(), vec![newest.clone()]);

    // only unread records are touched, read_at is set once
    assert_eq!(store.mark_read(&[newest.id], now).await.unwrap(), 1);
    assert_eq!(
        store
            .mark_read(&[newest.id, Uuid::new_v4()], now + Duration::minutes(1))
            .await
            .unwrap(),
        0
    );
    let read = store.load_notification(newest.id).await.unwrap().unwrap();
    assert!(read.is_read);
    assert_eq!(read.read_at, Some(now));

    let unread = NotificationQuery {
        unread_only: true,
        ..Default::default()
    };
    assert_eq!(store.list_notifications(&alice, &unread).await.unwrap().len(), 2);
    assert_eq!(store.mark_all_read(&alice, now).await.unwrap(), 2);
    assert!(store.list_notifications(&alice, &unread).await.unwrap().is_empty());

    // notifications outlive their monitor
    assert!(store.delete_monitor(m.id).await.unwrap());
    assert!(store.load_notification(older_unread.id).await.unwrap().is_some());

    assert_eq!(
        store
            .cleanup_old_notifications(now - Duration::days(30))
            .await
            .unwrap(),
        1
    );
    assert!(store.load_notification(old.id).await.unwrap().is_none());

    assert!(store.delete_notification(newest.id).await.unwrap());
    assert!(!store.delete_notification(newest.id).await.unwrap());

    // bulk delete is owner scoped and can spare unread records
    let m2 = monitor("alice", "m2", now);
    let bobs = monitor("bob", "bob's", now);
    let fresh = notification(&m2, now);
    let foreign = notification(&bobs, now);
    for (owner_monitor, n) in [(&m2, &fresh), (&bobs, &foreign)] {
        store.insert_monitor(owner_monitor).await.unwrap();
        assert!(store.commit_check(owner_monitor.id, &owner_monitor.state, Some(n)).await.unwrap());
    }
    assert_eq!(store.delete_all_notifications(&alice, true).await.unwrap(), 1);
    assert!(store.load_notification(older_unread.id).await.unwrap().is_none());
    assert!(store.load_notification(fresh.id).await.unwrap().is_some());
    assert_eq!(store.delete_all_notifications(&alice, false).await.unwrap(), 1);
    assert!(store.list_notifications(&alice, &NotificationQuery::default()).await.unwrap().is_empty());
    assert_eq!(store.load_notification(foreign.id).await.unwrap(), Some(foreign));

    assert!(store.health_check().await.unwrap().healthy);
}

#[tokio::test]
async fn test_memory_store_contract() {
    monitor_contract(Arc::new(MemoryStore::new())).await;
    notification_contract(Arc::new(MemoryStore::new())).await;
}

#[cfg(feature = "storage-sqlite")]
mod sqlite {
    use super::*;
    use pretty_assertions::assert_eq;
    use sitewatch::storage::sqlite::SqliteStore;
    use tempfile::TempDir;

    async fn open(dir: &TempDir) -> SqliteStore {
        SqliteStore::new(dir.path().join("sitewatch.db")).await.unwrap()
    }

    #[tokio::test]
    async fn test_sqlite_store_contract() {
        let dir = TempDir::new().unwrap();
        monitor_contract(Arc::new(open(&dir).await)).await;

        let dir = TempDir::new().unwrap();
        notification_contract(Arc::new(open(&dir).await)).await;
    }

    #[tokio::test]
    async fn test_state_survives_restart() {
        let dir = TempDir::new().unwrap();
        let now = SystemClock.now();

        let mut m = monitor("alice", "persisted", now);
        m.item_type = Some(sitewatch::monitor::ItemType::Product);
        let state = MonitorState {
            current_value: Some("$1,200.00".to_string()),
            previous_value: Some("$1,300.00".to_string()),
            last_checked: Some(now),
            last_changed: Some(now),
            last_success: Some(now),
            consecutive_failures: 0,
            last_error: None,
        };
        let n = notification(&m, now);

        {
            let store = open(&dir).await;
            store.insert_monitor(&m).await.unwrap();
            store.commit_check(m.id, &state, Some(&n)).await.unwrap();
            store.close().await.unwrap();
        }

        let store = open(&dir).await;
        let loaded = store.load_monitor(m.id).await.unwrap().unwrap();
        assert_eq!(loaded, Monitor { state, ..m });
        assert_eq!(store.load_notification(n.id).await.unwrap(), Some(n));
    }
}
