use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
};

use crate::db::models::{CreateTarget, MonitoringTarget, SpeedTestResult, UpdateTarget};
use crate::monitoring::speed_test::extract_host;
use crate::web::models::{CreateTargetRequest, ResultsQuery, UpdateTargetRequest};
use crate::web::{AppError, AppState, DEFAULT_USER_ID};

const DEFAULT_RESULTS_LIMIT: i64 = 100;
const MAX_RESULTS_LIMIT: i64 = 1000;

pub fn create_target_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_targets).post(create_target))
        .route(
            "/{id}",
            get(get_target).put(update_target).delete(delete_target),
        )
        .route("/{id}/results", get(get_target_results))
}

async fn list_targets(
    State(app_state): State<Arc<AppState>>,
) -> Result<Json<Vec<MonitoringTarget>>, AppError> {
    let targets = app_state.targets.find_by_owner(DEFAULT_USER_ID).await?;
    Ok(Json(targets))
}

async fn create_target(
    State(app_state): State<Arc<AppState>>,
    Json(payload): Json<CreateTargetRequest>,
) -> Result<(StatusCode, Json<MonitoringTarget>), AppError> {
    if payload.name.trim().is_empty() {
        return Err(AppError::InvalidInput("target name is required".to_string()));
    }
    extract_host(&payload.address)?;

    let target = app_state
        .targets
        .create(CreateTarget {
            name: payload.name,
            address: payload.address,
            owner_id: DEFAULT_USER_ID.to_string(),
        })
        .await?;
    Ok((StatusCode::CREATED, Json(target)))
}

async fn get_target(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<MonitoringTarget>, AppError> {
    let target = app_state
        .targets
        .find_by_id(&id)
        .await?
        .ok_or_else(|| AppError::NotFound("Target not found".to_string()))?;
    Ok(Json(target))
}

async fn update_target(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(payload): Json<UpdateTargetRequest>,
) -> Result<Json<MonitoringTarget>, AppError> {
    if let Some(name) = &payload.name {
        if name.trim().is_empty() {
            return Err(AppError::InvalidInput("target name is required".to_string()));
        }
    }
    if let Some(address) = &payload.address {
        extract_host(address)?;
    }

    let target = app_state
        .targets
        .update(
            &id,
            UpdateTarget {
                name: payload.name,
                address: payload.address,
            },
        )
        .await?;
    Ok(Json(target))
}

async fn delete_target(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    // Stop the timer first so no tick races the delete.
    app_state.scheduler.stop_monitoring(&id);
    app_state.targets.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn get_target_results(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<ResultsQuery>,
) -> Result<Json<Vec<SpeedTestResult>>, AppError> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_RESULTS_LIMIT)
        .clamp(1, MAX_RESULTS_LIMIT);
    let results = app_state.results.find_by_target(&id, limit).await?;
    Ok(Json(results))
}
