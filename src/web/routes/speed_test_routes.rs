use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};

use crate::db::models::{SpeedTestResult, UserSpeedTestPreference};
use crate::monitoring::config_service::SpeedTestUrl;
use crate::web::models::UpdatePreferenceRequest;
use crate::web::{AppError, AppState, DEFAULT_USER_ID};

pub fn create_speed_test_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/urls", get(list_urls))
        .route("/preference", get(get_preference).put(update_preference))
        .route("/{target_id}/run", post(run_speed_test))
}

async fn list_urls(State(app_state): State<Arc<AppState>>) -> Json<Vec<SpeedTestUrl>> {
    let urls = app_state
        .config_service
        .enabled_urls()
        .into_iter()
        .cloned()
        .collect();
    Json(urls)
}

async fn get_preference(
    State(app_state): State<Arc<AppState>>,
) -> Result<Json<Option<UserSpeedTestPreference>>, AppError> {
    let preference = app_state.preferences.get_by_user_id(DEFAULT_USER_ID).await?;
    Ok(Json(preference))
}

async fn update_preference(
    State(app_state): State<Arc<AppState>>,
    Json(payload): Json<UpdatePreferenceRequest>,
) -> Result<Json<UserSpeedTestPreference>, AppError> {
    let known = app_state
        .config_service
        .enabled_urls()
        .iter()
        .any(|u| u.id == payload.speed_test_url_id);
    if !known {
        return Err(AppError::InvalidInput(format!(
            "unknown speed test url id: {}",
            payload.speed_test_url_id
        )));
    }

    let preference = app_state
        .preferences
        .upsert(DEFAULT_USER_ID, &payload.speed_test_url_id)
        .await?;
    Ok(Json(preference))
}

/// Runs one immediate speed test outside any schedule.
async fn run_speed_test(
    State(app_state): State<Arc<AppState>>,
    Path(target_id): Path<String>,
) -> Result<Json<SpeedTestResult>, AppError> {
    let result = app_state.scheduler.run_speed_test(&target_id).await?;
    Ok(Json(result))
}
