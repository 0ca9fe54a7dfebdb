//! Scheduler behaviour against real HTTP: serialization, isolation, failures

use std::time::Duration;

use assert_matches::assert_matches;
use sitewatch::{
    actors::CheckOutcome,
    error::{CheckError, MonitorError},
    fetcher::FetchError,
    identity::Caller,
    monitor::{MonitorPatch, NewMonitor, Strategy},
};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::helpers::{engine, html, price_monitor, wait_idle};

#[tokio::test]
async fn test_slow_check_never_overlaps() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(html("<main>slow page</main>"))
                .set_delay(Duration::from_millis(400)),
        )
        .mount(&mock_server)
        .await;

    let e = engine();
    let alice = Caller::new("alice");
    let monitor = e
        .monitors
        .create_monitor(
            &alice,
            NewMonitor::new("slow", mock_server.uri(), Strategy::Content),
        )
        .await
        .unwrap();

    assert_eq!(e.scheduler.tick().await.unwrap(), 1);

    // the interval elapses while the first check is still running
    e.clock.advance(chrono::Duration::hours(1));
    assert_eq!(e.scheduler.tick().await.unwrap(), 0);
    assert_matches!(
        e.monitors.run_now(&alice, monitor.id).await,
        Err(MonitorError::AlreadyInProgress(_))
    );

    wait_idle(&e.scheduler).await;
    assert_eq!(mock_server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_inactive_and_deleted_monitors_are_not_checked() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(html("<main>x</main>")))
        .mount(&mock_server)
        .await;

    let e = engine();
    let alice = Caller::new("alice");
    let paused = e
        .monitors
        .create_monitor(&alice, NewMonitor::new("a", mock_server.uri(), Strategy::Content))
        .await
        .unwrap();
    let deleted = e
        .monitors
        .create_monitor(&alice, NewMonitor::new("b", mock_server.uri(), Strategy::Content))
        .await
        .unwrap();

    e.monitors
        .update_monitor(
            &alice,
            paused.id,
            MonitorPatch {
                is_active: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    e.monitors.delete_monitor(&alice, deleted.id).await.unwrap();

    assert_eq!(e.scheduler.tick().await.unwrap(), 0);
    assert!(mock_server.received_requests().await.unwrap().is_empty());

    // an explicit check still works on a paused monitor
    assert_matches!(
        e.monitors.run_now(&alice, paused.id).await,
        Ok(CheckOutcome::Baseline { .. })
    );
    assert_eq!(e.scheduler.status().await.unwrap().scheduled_monitors, 0);
}

#[tokio::test]
async fn test_one_failing_site_does_not_affect_others() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/down"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/up"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(html(r#"<span class="price">$5.00</span>"#)),
        )
        .mount(&mock_server)
        .await;

    let e = engine();
    let alice = Caller::new("alice");
    let down = e
        .monitors
        .create_monitor(&alice, price_monitor(format!("{}/down", mock_server.uri())))
        .await
        .unwrap();
    let up = e
        .monitors
        .create_monitor(&alice, price_monitor(format!("{}/up", mock_server.uri())))
        .await
        .unwrap();

    assert_eq!(e.scheduler.tick().await.unwrap(), 2);
    wait_idle(&e.scheduler).await;

    let up = e.monitors.get_monitor(&alice, up.id).await.unwrap();
    assert_eq!(up.state.current_value.as_deref(), Some("$5.00"));

    let down = e.monitors.get_monitor(&alice, down.id).await.unwrap();
    assert_eq!(down.state.current_value, None);
    assert!(down.state.last_checked.is_some());
    assert_eq!(down.state.consecutive_failures, 1);
    assert_eq!(down.state.last_error.as_deref(), Some("HTTP error 500"));

    // checked, so not due again until its interval passes
    assert_eq!(e.scheduler.tick().await.unwrap(), 0);
}

#[tokio::test]
async fn test_run_now_surfaces_actionable_failure() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&mock_server)
        .await;

    let e = engine();
    let alice = Caller::new("alice");
    let monitor = e
        .monitors
        .create_monitor(&alice, price_monitor(mock_server.uri()))
        .await
        .unwrap();

    let err = e.monitors.run_now(&alice, monitor.id).await.unwrap_err();

    assert_matches!(
        &err,
        MonitorError::Check(CheckError::Fetch(FetchError::Blocked { status: 403 }))
    );
    let MonitorError::Check(check) = err else {
        unreachable!()
    };
    assert!(check.user_hint().contains("try an alternate source"));
}

#[tokio::test]
async fn test_concurrency_cap_across_monitors() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(html("<main>ok</main>"))
                .set_delay(Duration::from_millis(200)),
        )
        .mount(&mock_server)
        .await;

    let config = sitewatch::config::SchedulerConfig {
        max_concurrent_checks: 3,
        ..crate::helpers::manual_tick_config()
    };
    let e = crate::helpers::engine_with(
        std::sync::Arc::new(sitewatch::storage::MemoryStore::new()),
        config,
    );
    let alice = Caller::new("alice");
    for i in 0..7 {
        e.monitors
            .create_monitor(
                &alice,
                NewMonitor::new(format!("m{i}"), format!("{}/{i}", mock_server.uri()), Strategy::Content),
            )
            .await
            .unwrap();
    }

    assert_eq!(e.scheduler.tick().await.unwrap(), 3);
    let due = e.monitors.list_due(&alice).await.unwrap();
    assert_eq!(due.len(), 7);
    assert_eq!(due.iter().filter(|d| d.running).count(), 3);

    wait_idle(&e.scheduler).await;
    assert_eq!(e.scheduler.tick().await.unwrap(), 3);
    wait_idle(&e.scheduler).await;
    assert_eq!(e.scheduler.tick().await.unwrap(), 1);
    wait_idle(&e.scheduler).await;

    assert!(e.monitors.list_due(&alice).await.unwrap().is_empty());
}
