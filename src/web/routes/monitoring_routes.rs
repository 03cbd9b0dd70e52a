use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
};

use crate::monitoring::scheduler::MonitorStatus;
use crate::web::models::{ActiveMonitorsResponse, StartMonitoringRequest};
use crate::web::{AppError, AppState};

pub fn create_monitoring_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_active_monitors))
        .route("/{target_id}/start", post(start_monitoring))
        .route("/{target_id}/stop", post(stop_monitoring))
        .route("/{target_id}/status", get(monitor_status))
}

async fn list_active_monitors(
    State(app_state): State<Arc<AppState>>,
) -> Json<ActiveMonitorsResponse> {
    let monitors = app_state
        .scheduler
        .get_active_targets()
        .iter()
        .filter_map(|id| app_state.scheduler.monitor_status(id))
        .collect();
    Json(ActiveMonitorsResponse { monitors })
}

async fn start_monitoring(
    State(app_state): State<Arc<AppState>>,
    Path(target_id): Path<String>,
    Json(payload): Json<StartMonitoringRequest>,
) -> Result<Json<MonitorStatus>, AppError> {
    // Reject unknown targets up front instead of letting the first tick
    // discover the missing row.
    app_state
        .targets
        .find_by_id(&target_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Target not found".to_string()))?;

    let interval_ms = payload
        .interval_ms
        .unwrap_or(app_state.config.default_interval_ms);
    app_state.scheduler.start_monitoring(&target_id, interval_ms)?;

    let status = app_state
        .scheduler
        .monitor_status(&target_id)
        .ok_or_else(|| AppError::InternalServerError("monitor vanished after start".to_string()))?;
    Ok(Json(status))
}

async fn stop_monitoring(
    State(app_state): State<Arc<AppState>>,
    Path(target_id): Path<String>,
) -> StatusCode {
    app_state.scheduler.stop_monitoring(&target_id);
    StatusCode::NO_CONTENT
}

async fn monitor_status(
    State(app_state): State<Arc<AppState>>,
    Path(target_id): Path<String>,
) -> Result<Json<MonitorStatus>, AppError> {
    let status = app_state
        .scheduler
        .monitor_status(&target_id)
        .ok_or_else(|| AppError::NotFound("Target is not being monitored".to_string()))?;
    Ok(Json(status))
}
