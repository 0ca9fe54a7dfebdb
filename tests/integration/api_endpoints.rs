//! REST and WebSocket surface over a real listener

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use pretty_assertions::assert_eq;
use reqwest::StatusCode;
use serde_json::{Value, json};
use sitewatch::{
    api::{ApiState, spawn_api_server},
    config::ApiSettings,
    identity::StaticTokenResolver,
};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::helpers::{Engine, engine, html};

struct Api {
    base: String,
    addr: std::net::SocketAddr,
    client: reqwest::Client,
    engine: Engine,
}

async fn start() -> Api {
    let engine = engine();
    let tokens = HashMap::from([
        ("alice-token".to_string(), "alice".to_string()),
        ("bob-token".to_string(), "bob".to_string()),
    ]);
    let settings = ApiSettings {
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        enable_cors: false,
        tokens: tokens.clone(),
    };
    let state = ApiState::new(
        engine.monitors.clone(),
        engine.notifications.clone(),
        engine.hub.clone(),
        Arc::new(StaticTokenResolver::new(tokens)),
    );

    let addr = spawn_api_server(settings, state).await.unwrap();

    Api {
        base: format!("http://{addr}/api/v1"),
        addr,
        client: reqwest::Client::new(),
        engine,
    }
}

impl Api {
    fn get(&self, path: &str, token: &str) -> reqwest::RequestBuilder {
        self.client
            .get(format!("{}{path}", self.base))
            .bearer_auth(token)
    }

    fn post(&self, path: &str, token: &str) -> reqwest::RequestBuilder {
        self.client
            .post(format!("{}{path}", self.base))
            .bearer_auth(token)
    }
}

async fn page_server(body: &str) -> MockServer {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(html(body)))
        .mount(&mock_server)
        .await;
    mock_server
}

#[tokio::test]
async fn test_health_needs_no_token() {
    let api = start().await;

    let response = reqwest::get(format!("{}/health", api.base)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_missing_or_unknown_token_is_rejected() {
    let api = start().await;

    let response = api
        .client
        .get(format!("{}/monitors", api.base))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = api.get("/monitors", "nope").send().await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_monitor_crud_and_ownership() {
    let api = start().await;
    let site = page_server("<main>hello</main>").await;

    let response = api
        .post("/monitors", "alice-token")
        .json(&json!({ "name": "Docs", "url": site.uri(), "strategy": "content" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let created: Value = response.json().await.unwrap();
    let id = created["id"].as_str().unwrap().to_string();
    assert_eq!(created["is_active"], true);
    assert_eq!(created["check_interval_secs"], 300);

    // invalid config
    let response = api
        .post("/monitors", "alice-token")
        .json(&json!({ "name": "Bad", "url": "ftp://example.com", "strategy": "content" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // another owner
    let response = api.get(&format!("/monitors/{id}"), "bob-token").send().await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let listed: Vec<Value> = api
        .get("/monitors", "bob-token")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(listed.is_empty());

    let response = api
        .post(&format!("/monitors/{id}/check"), "alice-token")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let outcome: Value = response.json().await.unwrap();
    assert_eq!(outcome, json!({ "status": "baseline", "value": "hello" }));

    let toggled: Value = api
        .post(&format!("/monitors/{id}/toggle"), "alice-token")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(toggled["is_active"], false);

    let stats: Value = api
        .get("/monitors/stats", "alice-token")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stats["total"], 1);
    assert_eq!(stats["inactive"], 1);

    let response = api
        .client
        .delete(format!("{}/monitors/{id}", api.base))
        .bearer_auth("alice-token")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = api.get(&format!("/monitors/{id}"), "alice-token").send().await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_failed_check_returns_hint() {
    let api = start().await;
    let site = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&site)
        .await;

    let created: Value = api
        .post("/monitors", "alice-token")
        .json(&json!({ "name": "Shop", "url": site.uri(), "strategy": "price" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let response = api
        .post(&format!("/monitors/{}/check", created["id"].as_str().unwrap()), "alice-token")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body: Value = response.json().await.unwrap();
    assert!(body["hint"].as_str().unwrap().contains("alternate source"));
}

#[tokio::test]
async fn test_notifications_are_owner_scoped() {
    let api = start().await;
    let site = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(html("<main>v1</main>")))
        .up_to_n_times(1)
        .mount(&site)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(html("<main>v2</main>")))
        .mount(&site)
        .await;

    let created: Value = api
        .post("/monitors", "alice-token")
        .json(&json!({ "name": "Page", "url": site.uri() }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let check = format!("/monitors/{}/check", created["id"].as_str().unwrap());
    api.post(&check, "alice-token").send().await.unwrap();
    let outcome: Value = api.post(&check, "alice-token").send().await.unwrap().json().await.unwrap();
    assert_eq!(outcome["status"], "changed");

    let listed: Vec<Value> = api
        .get("/notifications?unread_only=true", "alice-token")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0]["notification_type"], "info");
    let id = listed[0]["id"].as_str().unwrap().to_string();

    // bob can neither mark nor delete it
    let response = api
        .post("/notifications/read", "bob-token")
        .json(&json!({ "ids": [id] }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let response = api
        .client
        .delete(format!("{}/notifications/{id}", api.base))
        .bearer_auth("bob-token")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let updated: Value = api
        .post("/notifications/read", "alice-token")
        .json(&json!({ "ids": [id] }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(updated, json!({ "updated": 1 }));

    let stats: Value = api
        .get("/notifications/stats", "alice-token")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stats["total"], 1);
    assert_eq!(stats["unread"], 0);

    let updated: Value = api
        .post("/notifications/read-all", "alice-token")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(updated, json!({ "updated": 0 }));
}

async fn next_json<S>(stream: &mut S) -> Value
where
    S: futures::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        let message = tokio::time::timeout(Duration::from_secs(5), stream.next())
            .await
            .expect("no message within 5s")
            .expect("stream ended")
            .unwrap();
        if let Message::Text(text) = message {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

#[tokio::test]
async fn test_stream_pushes_owner_events() {
    let api = start().await;
    let site = page_server("<main>live</main>").await;

    let (mut alice_ws, _) = connect_async(format!("ws://{}/api/v1/stream?token=alice-token", api.addr))
        .await
        .unwrap();
    let (mut bob_ws, _) = connect_async(format!("ws://{}/api/v1/stream?token=bob-token", api.addr))
        .await
        .unwrap();

    let welcome = next_json(&mut alice_ws).await;
    assert_eq!(welcome["type"], "system_status");
    assert_eq!(welcome["data"]["scheduler_running"], true);
    next_json(&mut bob_ws).await;
    assert_eq!(api.engine.hub.connection_count(), 2);

    let created: Value = api
        .post("/monitors", "alice-token")
        .json(&json!({ "name": "Live", "url": site.uri() }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    api.post(&format!("/monitors/{}/check", created["id"].as_str().unwrap()), "alice-token")
        .send()
        .await
        .unwrap();

    let update = next_json(&mut alice_ws).await;
    assert_eq!(update["type"], "monitor_update");
    assert_eq!(update["data"]["monitor_id"], created["id"]);
    assert_eq!(update["data"]["current_value"], "live");
    assert_eq!(update["data"]["has_changed"], false);
    assert!(update["data"].get("last_changed").is_none());

    // bob's connection stays quiet
    let quiet = tokio::time::timeout(Duration::from_millis(200), bob_ws.next()).await;
    assert!(quiet.is_err());

    drop(alice_ws);
    for _ in 0..100 {
        if api.engine.hub.connection_count() == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(api.engine.hub.connection_count(), 1);
}

#[tokio::test]
async fn test_notification_lookup_count_and_bulk_delete() {
    let api = start().await;
    let site = MockServer::start().await;
    for body in ["<main>v1</main>", "<main>v2</main>"] {
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(html(body)))
            .up_to_n_times(1)
            .mount(&site)
            .await;
    }
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(html("<main>v3</main>")))
        .mount(&site)
        .await;

    let created: Value = api
        .post("/monitors", "alice-token")
        .json(&json!({
            "name": "Page",
            "url": site.uri(),
            "metadata": { "team": "pricing", "priority": 2 }
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(created["metadata"], json!({ "team": "pricing", "priority": 2 }));
    let monitor_id = created["id"].as_str().unwrap().to_string();

    let patched: Value = api
        .client
        .patch(format!("{}/monitors/{monitor_id}", api.base))
        .bearer_auth("alice-token")
        .json(&json!({ "metadata": { "team": "growth" } }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(patched["metadata"], json!({ "team": "growth" }));

    let check = format!("/monitors/{monitor_id}/check");
    for _ in 0..3 {
        api.post(&check, "alice-token").send().await.unwrap();
    }

    let count: Value = api
        .get("/notifications/unread/count", "alice-token")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(count, json!({ "unread_count": 2 }));

    let listed: Vec<Value> = api
        .get("/notifications", "alice-token")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let newest = listed[0]["id"].as_str().unwrap().to_string();

    let fetched: Value = api
        .get(&format!("/notifications/{newest}"), "alice-token")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(fetched["id"], listed[0]["id"]);
    let response = api
        .get(&format!("/notifications/{newest}"), "bob-token")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // bob's bulk delete never reaches alice's records
    let deleted: Value = api
        .client
        .delete(format!("{}/notifications", api.base))
        .bearer_auth("bob-token")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(deleted, json!({ "deleted": 0 }));

    api.post("/notifications/read", "alice-token")
        .json(&json!({ "ids": [newest] }))
        .send()
        .await
        .unwrap();
    let deleted: Value = api
        .client
        .delete(format!("{}/notifications?read_only=true", api.base))
        .bearer_auth("alice-token")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(deleted, json!({ "deleted": 1 }));

    let deleted: Value = api
        .client
        .delete(format!("{}/notifications", api.base))
        .bearer_auth("alice-token")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(deleted, json!({ "deleted": 1 }));

    let count: Value = api
        .get("/notifications/unread/count", "alice-token")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(count["unread_count"], 0);
}
