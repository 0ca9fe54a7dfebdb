//! End-to-end checks: scheduler tick → fetch → extract → detect → store → push

use assert_matches::assert_matches;
use pretty_assertions::assert_eq;
use sitewatch::{
    broadcast::ClientEvent,
    identity::Caller,
    monitor::{NewMonitor, Strategy},
    notification::{NotificationKind, NotificationQuery},
};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::helpers::{engine, html, price_monitor, wait_idle};

async fn serve(mock_server: &MockServer, body: String) {
    mock_server.reset().await;
    Mock::given(method("GET"))
        .and(path("/item"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(mock_server)
        .await;
}

#[tokio::test]
async fn test_price_monitor_lifecycle() {
    let mock_server = MockServer::start().await;
    let e = engine();
    let alice = Caller::new("alice");
    let mut tab = e.hub.register(&alice.owner);

    let monitor = e
        .monitors
        .create_monitor(&alice, price_monitor(format!("{}/item", mock_server.uri())))
        .await
        .unwrap();

    // first observation is a silent baseline
    serve(&mock_server, html(r#"<span class="price">$1,200.00</span>"#)).await;
    assert_eq!(e.scheduler.tick().await.unwrap(), 1);
    wait_idle(&e.scheduler).await;

    let stored = e.monitors.get_monitor(&alice, monitor.id).await.unwrap();
    assert_eq!(stored.state.current_value.as_deref(), Some("$1,200.00"));
    assert_eq!(stored.state.last_changed, None);
    assert!(
        e.notifications
            .list(&alice, &NotificationQuery::default())
            .await
            .unwrap()
            .is_empty()
    );

    // same number, different formatting
    serve(&mock_server, html(r#"<span class="price">1200</span>"#)).await;
    e.clock.advance(stored.interval());
    assert_eq!(e.scheduler.tick().await.unwrap(), 1);
    wait_idle(&e.scheduler).await;
    assert!(
        e.notifications
            .list(&alice, &NotificationQuery::default())
            .await
            .unwrap()
            .is_empty()
    );

    // real change
    serve(&mock_server, html(r#"<span class="price">$1,300.00</span>"#)).await;
    e.clock.advance(stored.interval());
    assert_eq!(e.scheduler.tick().await.unwrap(), 1);
    wait_idle(&e.scheduler).await;

    let notifications = e
        .notifications
        .list(&alice, &NotificationQuery::default())
        .await
        .unwrap();
    assert_eq!(notifications.len(), 1);
    let n = &notifications[0];
    assert_eq!(n.owner, alice.owner);
    assert_eq!(n.kind, NotificationKind::Success);
    assert_eq!(n.title, "Change detected: Laptop");
    assert!(n.message.contains("$1,200.00") && n.message.contains("$1,300.00"));
    assert!(n.message.contains("+8.33%"));

    let stored = e.monitors.get_monitor(&alice, monitor.id).await.unwrap();
    assert_eq!(stored.state.previous_value.as_deref(), Some("$1,200.00"));
    assert_eq!(stored.state.current_value.as_deref(), Some("$1,300.00"));
    assert!(stored.state.last_changed <= stored.state.last_checked);

    // the live connection saw every check, with the notification ahead of its update
    let mut seen = Vec::new();
    while let Some(event) = tab.try_recv() {
        seen.push(event);
    }
    assert_eq!(seen.len(), 4);
    assert_matches!(&*seen[2], ClientEvent::Notification(pushed) if pushed.id == n.id);
    assert_matches!(&*seen[3], ClientEvent::MonitorUpdate(update) => {
        assert!(update.has_changed);
        assert_eq!(update.current_value.as_deref(), Some("$1,300.00"));
        assert!(update.last_changed.is_some());
    });
}

#[tokio::test]
async fn test_selector_miss_keeps_last_value() {
    let mock_server = MockServer::start().await;
    let e = engine();
    let alice = Caller::new("alice");

    let mut request = NewMonitor::new(
        "Stock",
        format!("{}/item", mock_server.uri()),
        Strategy::Selector,
    );
    request.selector = Some("#availability".to_string());
    let monitor = e.monitors.create_monitor(&alice, request).await.unwrap();

    serve(&mock_server, html(r#"<p id="availability">In stock</p>"#)).await;
    e.monitors.run_now(&alice, monitor.id).await.unwrap();
    let before = e.monitors.get_monitor(&alice, monitor.id).await.unwrap();

    serve(&mock_server, html("<p>page redesigned</p>")).await;
    e.clock.advance(before.interval());
    let err = e.monitors.run_now(&alice, monitor.id).await.unwrap_err();
    assert!(err.to_string().contains("#availability"));

    let after = e.monitors.get_monitor(&alice, monitor.id).await.unwrap();
    assert_eq!(after.state.current_value.as_deref(), Some("In stock"));
    assert!(after.state.last_checked > before.state.last_checked);
    assert_eq!(after.state.last_success, before.state.last_success);
    assert_eq!(after.state.consecutive_failures, 1);
}

#[tokio::test]
async fn test_item_search_and_content_strategies() {
    let mock_server = MockServer::start().await;
    let e = engine();
    let alice = Caller::new("alice");

    serve(
        &mock_server,
        html(
            "<nav>Home | Markets</nav>\
             <main><h1>Crypto prices</h1><ul><li>Bitcoin $64,250.10</li><li>Ether $3,100.00</li></ul></main>",
        ),
    )
    .await;

    let mut item = NewMonitor::new("BTC", format!("{}/item", mock_server.uri()), Strategy::ItemSearch);
    item.item_name = Some("bitcoin".to_string());
    let item = e.monitors.create_monitor(&alice, item).await.unwrap();

    let content = NewMonitor::new("Page", format!("{}/item", mock_server.uri()), Strategy::Content);
    let content = e.monitors.create_monitor(&alice, content).await.unwrap();

    assert_eq!(e.scheduler.tick().await.unwrap(), 2);
    wait_idle(&e.scheduler).await;

    let item = e.monitors.get_monitor(&alice, item.id).await.unwrap();
    assert_eq!(item.state.current_value.as_deref(), Some("bitcoin: $64,250.10"));

    let content = e.monitors.get_monitor(&alice, content.id).await.unwrap();
    let value = content.state.current_value.unwrap();
    assert!(value.starts_with("Crypto prices"));
    assert!(!value.contains("Markets"));
}

#[tokio::test]
async fn test_disabled_notifications_still_track_changes() {
    let mock_server = MockServer::start().await;
    let e = engine();
    let alice = Caller::new("alice");

    let mut request = price_monitor(format!("{}/item", mock_server.uri()));
    request.notification_enabled = false;
    let monitor = e.monitors.create_monitor(&alice, request).await.unwrap();

    serve(&mock_server, html(r#"<span class="price">$10.00</span>"#)).await;
    e.monitors.run_now(&alice, monitor.id).await.unwrap();
    serve(&mock_server, html(r#"<span class="price">$9.00</span>"#)).await;
    e.monitors.run_now(&alice, monitor.id).await.unwrap();

    let stored = e.monitors.get_monitor(&alice, monitor.id).await.unwrap();
    assert_eq!(stored.state.current_value.as_deref(), Some("$9.00"));
    assert!(stored.state.last_changed.is_some());
    assert!(
        e.notifications
            .list(&alice, &NotificationQuery::default())
            .await
            .unwrap()
            .is_empty()
    );
}
