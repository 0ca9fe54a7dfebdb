//! REST API and WebSocket server
//!
//! A thin wrapper over [`MonitorService`](crate::service::MonitorService) and
//! [`NotificationService`](crate::service::NotificationService). Every route
//! except health resolves a [`Caller`](crate::identity::Caller) from the
//! bearer token first.
//!
//! ## Endpoints
//!
//! - `GET /api/v1/health` - Health check (no auth)
//! - `GET|POST /api/v1/monitors` - List / create monitors
//! - `GET /api/v1/monitors/stats` - Monitor statistics and stale count
//! - `GET|PATCH|DELETE /api/v1/monitors/:id` - Read / update / delete
//! - `POST /api/v1/monitors/:id/toggle` - Flip the active flag
//! - `POST /api/v1/monitors/:id/check` - Run a check now
//! - `GET /api/v1/scheduler/due` - Monitors due right now
//! - `GET|DELETE /api/v1/notifications` - List / delete all (`?read_only=true`)
//! - `GET /api/v1/notifications/stats` - Notification statistics
//! - `GET /api/v1/notifications/unread/count` - Unread notification count
//! - `POST /api/v1/notifications/read` - Mark notifications read
//! - `POST /api/v1/notifications/read-all` - Mark everything read
//! - `GET|DELETE /api/v1/notifications/:id` - Read / delete a notification
//! - `WS /api/v1/stream` - Real-time event stream (`?token=` accepted)

pub mod error;
pub mod middleware;
pub mod routes;
pub mod state;
pub mod types;
pub mod websocket;

pub use error::{ApiError, ApiResult};
pub use state::ApiState;

use std::net::SocketAddr;

use axum::{
    Router,
    routing::{get, post},
};
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::ApiSettings;

/// Build the router with all routes
pub fn router(state: ApiState, enable_cors: bool) -> Router {
    use routes::{health, monitors, notifications};

    let protected = Router::new()
        .route(
            "/api/v1/monitors",
            get(monitors::list_monitors).post(monitors::create_monitor),
        )
        .route("/api/v1/monitors/stats", get(monitors::monitor_stats))
        .route(
            "/api/v1/monitors/:id",
            get(monitors::get_monitor)
                .patch(monitors::update_monitor)
                .delete(monitors::delete_monitor),
        )
        .route("/api/v1/monitors/:id/toggle", post(monitors::toggle_monitor))
        .route("/api/v1/monitors/:id/check", post(monitors::check_monitor))
        .route("/api/v1/scheduler/due", get(monitors::list_due))
        .route(
            "/api/v1/notifications",
            get(notifications::list_notifications).delete(notifications::delete_all_notifications),
        )
        .route(
            "/api/v1/notifications/stats",
            get(notifications::notification_stats),
        )
        .route(
            "/api/v1/notifications/unread/count",
            get(notifications::unread_count),
        )
        .route("/api/v1/notifications/read", post(notifications::mark_read))
        .route(
            "/api/v1/notifications/read-all",
            post(notifications::mark_all_read),
        )
        .route(
            "/api/v1/notifications/:id",
            get(notifications::get_notification).delete(notifications::delete_notification),
        )
        .route("/api/v1/stream", get(websocket::websocket_handler))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::auth_middleware,
        ));

    let app = Router::new()
        .route("/api/v1/health", get(health::health_check))
        .merge(protected)
        .with_state(state)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()));

    if !enable_cors {
        return app;
    }

    app.layer(
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
    )
}

/// Spawn the API server
///
/// This starts an Axum HTTP server in a background task.
/// Returns the server's local address.
pub async fn spawn_api_server(settings: ApiSettings, state: ApiState) -> anyhow::Result<SocketAddr> {
    info!("starting API server on {}", settings.bind_addr);

    let app = router(state, settings.enable_cors);

    // Bind and serve
    let listener = tokio::net::TcpListener::bind(settings.bind_addr).await?;
    let addr = listener.local_addr()?;

    info!("API server listening on {}", addr);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("API server error: {}", e);
        }
    });

    Ok(addr)
}
