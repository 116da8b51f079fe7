//! ==============================================================================
//! server.rs - json api for the dashboard views
//! ==============================================================================
//!
//! purpose:
//!     exposes the read-model and the two imperative triggers to whatever
//!     renders the screens (home, analytics, settings, camera).
//!
//! routes:
//!     GET  /api                          full snapshot
//!     GET  /api/status                   controller + camera liveness
//!     POST /api/refresh                  fetch now (pull-to-refresh)
//!     POST /api/thresholds?temp=&moist=  write limits to the controller
//!     GET  /api/alerts                   current alert toggles
//!     POST /api/alerts?temperature=&moisture=  change toggles (omitted = unchanged)
//!
//! ==============================================================================

use anyhow::{Context, Result};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use tower_http::cors::CorsLayer;

use crate::controller::{CameraFeed, ControllerApi};
use crate::coordinator::DashboardHandle;
use crate::domain::Snapshot;
use crate::evaluator::AlertPreferences;

pub fn router<C: ControllerApi, K: CameraFeed>(dashboard: DashboardHandle<C, K>) -> Router {
    Router::new()
        .route("/api", get(snapshot_handler::<C, K>))
        .route("/api/status", get(status_handler::<C, K>))
        .route("/api/refresh", post(refresh_handler::<C, K>))
        .route("/api/thresholds", post(thresholds_handler::<C, K>))
        .route(
            "/api/alerts",
            get(alerts_handler::<C, K>).post(set_alerts_handler::<C, K>),
        )
        .layer(CorsLayer::permissive())
        .with_state(dashboard)
}

pub async fn run_server<C: ControllerApi, K: CameraFeed>(
    bind: &str,
    dashboard: DashboardHandle<C, K>,
) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind {}", bind))?;
    tracing::info!(target: "server", "view api live at http://{}", bind);
    axum::serve(listener, router(dashboard)).await?;
    Ok(())
}

async fn snapshot_handler<C: ControllerApi, K: CameraFeed>(
    State(dashboard): State<DashboardHandle<C, K>>,
) -> Json<Snapshot> {
    Json(dashboard.snapshot().await)
}

async fn status_handler<C: ControllerApi, K: CameraFeed>(
    State(dashboard): State<DashboardHandle<C, K>>,
) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "esp32": dashboard.esp32_status(),
        "camera": dashboard.cam_status(),
    }))
}

async fn refresh_handler<C: ControllerApi, K: CameraFeed>(
    State(dashboard): State<DashboardHandle<C, K>>,
) -> Json<serde_json::Value> {
    let outcome = dashboard.fetch_data().await;
    Json(serde_json::json!({ "status": "ok", "outcome": outcome }))
}

/// threshold params
#[derive(Deserialize)]
struct ThresholdParams {
    temp: f64,
    moist: f64,
}

async fn thresholds_handler<C: ControllerApi, K: CameraFeed>(
    State(dashboard): State<DashboardHandle<C, K>>,
    Query(params): Query<ThresholdParams>,
) -> (StatusCode, Json<serde_json::Value>) {
    match dashboard.update_thresholds(params.temp, params.moist).await {
        Ok(()) => (StatusCode::OK, Json(serde_json::json!({ "status": "ok" }))),
        Err(e) => {
            tracing::warn!(target: "server", "threshold update failed: {:#}", e);
            (
                StatusCode::BAD_GATEWAY,
                Json(serde_json::json!({ "status": "error", "message": format!("{:#}", e) })),
            )
        }
    }
}

async fn alerts_handler<C: ControllerApi, K: CameraFeed>(
    State(dashboard): State<DashboardHandle<C, K>>,
) -> Json<AlertPreferences> {
    Json(dashboard.alert_preferences().await)
}

#[derive(Deserialize)]
struct AlertParams {
    temperature: Option<bool>,
    moisture: Option<bool>,
}

async fn set_alerts_handler<C: ControllerApi, K: CameraFeed>(
    State(dashboard): State<DashboardHandle<C, K>>,
    Query(params): Query<AlertParams>,
) -> Json<AlertPreferences> {
    let current = dashboard.alert_preferences().await;
    let next = AlertPreferences {
        temperature: params.temperature.unwrap_or(current.temperature),
        moisture: params.moisture.unwrap_or(current.moisture),
    };
    dashboard.set_alert_preferences(next).await;
    Json(next)
}
